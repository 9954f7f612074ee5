use axum::{
    Router,
    routing::{get, post, put},
    extract::{Extension, Json},
    http::{StatusCode, HeaderMap},
    response::Json as RespJson,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::MarketError;
use crate::model::account::{AccountResponse, RegisterRequest, SettingsPatch};
use crate::routes::{bearer_token, current_actor, success, ApiResult};
use crate::service::Marketplace;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct ContactUpdate {
    pub name: Option<String>,
    pub phone: Option<String>,
}

pub fn auth_router() -> Router {
    Router::new()
        .route("/api/register", post(register))
        .route("/api/login", post(login))
        .route("/api/logout", post(logout))
        .route("/api/me", get(me).put(update_contact))
        .route("/api/me/settings", put(update_settings))
}

// Register a customer or provider account
async fn register(
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<RegisterRequest>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let account = market.accounts.register(payload).await?;
    Ok((StatusCode::CREATED, success(AccountResponse::from(&account))))
}

// Login, returns the bearer token for later requests
async fn login(
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult {
    let (session, account) = market.accounts.login(&payload.email, &payload.password).await?;
    Ok(success(json!({
        "token": session.token,
        "expires_at": session.expires_at,
        "account": AccountResponse::from(&account),
    })))
}

async fn logout(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let token = bearer_token(&headers).ok_or(MarketError::Unauthenticated)?;
    let revoked = market.accounts.logout(token).await;
    Ok(success(json!({ "logged_out": revoked })))
}

async fn me(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let account = market.accounts.get(&actor, &actor.account_id).await?;
    Ok(success(AccountResponse::from(&account)))
}

async fn update_contact(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<ContactUpdate>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let account = market
        .accounts
        .update_contact(&actor, payload.name, payload.phone)
        .await?;
    Ok(success(AccountResponse::from(&account)))
}

// Settings page: each section sent replaces the stored one
async fn update_settings(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<SettingsPatch>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let account = market.accounts.update_settings(&actor, payload).await?;
    Ok(success(account.settings))
}
