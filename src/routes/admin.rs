use axum::{
    Router,
    routing::{get, put},
    extract::{Extension, Json, Path, Query},
    http::HeaderMap,
};
use serde::Deserialize;

use crate::model::account::{AccountResponse, AccountStatus};
use crate::model::ids::AccountId;
use crate::model::provider::{DocumentKind, Verdict};
use crate::routes::{current_actor, success, ApiResult};
use crate::service::accounts::AccountFilter;
use crate::service::Marketplace;

#[derive(Deserialize)]
pub struct StatusChange {
    pub status: AccountStatus,
}

#[derive(Deserialize)]
pub struct DocumentVerdict {
    pub verdict: Verdict,
}

pub fn admin_router() -> Router {
    Router::new()
        .route("/api/admin/accounts", get(list_accounts))
        .route("/api/admin/accounts/:id/status", put(set_status))
        .route("/api/admin/providers/:id/documents/:kind", put(review_document))
        .route("/api/admin/stats", get(admin_stats))
}

// ?role=provider&status=pending&search=rosa
async fn list_accounts(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Query(filter): Query<AccountFilter>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let accounts: Vec<AccountResponse> = market
        .accounts
        .list(&actor, &filter)
        .await?
        .iter()
        .map(AccountResponse::from)
        .collect();
    Ok(success(accounts))
}

async fn set_status(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
    Json(payload): Json<StatusChange>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let account = market
        .accounts
        .set_status(&actor, &AccountId::from(id), payload.status)
        .await?;
    Ok(success(AccountResponse::from(&account)))
}

async fn review_document(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path((id, kind)): Path<(String, DocumentKind)>,
    Json(payload): Json<DocumentVerdict>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let profile = market
        .onboarding
        .review_document(&actor, &AccountId::from(id), kind, payload.verdict)
        .await?;
    Ok(success(profile))
}

async fn admin_stats(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.accounts.admin_stats(&actor).await?))
}
