use axum::{http::HeaderMap, response::Json as RespJson};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::MarketError;
use crate::model::account::Actor;
use crate::service::Marketplace;

pub mod admin;
pub mod auth;
pub mod bookings;
pub mod jobs;
pub mod providers;
pub mod requests;

pub type ApiResult = Result<RespJson<Value>, MarketError>;

// Token from the `Authorization: Bearer <token>` header
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// Resolve the caller from the bearer token
pub async fn current_actor(headers: &HeaderMap, market: &Marketplace) -> Result<Actor, MarketError> {
    let token = bearer_token(headers).ok_or(MarketError::Unauthenticated)?;
    market.accounts.authenticate(token).await
}

pub fn success<T: Serialize>(data: T) -> RespJson<Value> {
    RespJson(json!({
        "success": true,
        "data": data,
    }))
}
