use axum::{
    Router,
    routing::{get, post, put},
    extract::{Extension, Json, Path},
    http::{StatusCode, HeaderMap},
    response::Json as RespJson,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::MarketError;
use crate::model::ids::AccountId;
use crate::model::provider::{Attachment, BusinessInfo, DocumentKind, ServiceDetails};
use crate::routes::{current_actor, success, ApiResult};
use crate::service::Marketplace;

/// A verification document as sent by the onboarding form. `content` is the
/// file as read by the browser (usually a data URL).
#[derive(Deserialize)]
pub struct DocumentUpload {
    pub kind: DocumentKind,
    pub file_name: String,
    #[serde(default)]
    pub content_type: String,
    pub content: String,
}

impl DocumentUpload {
    fn into_parts(self) -> (DocumentKind, Attachment) {
        let attachment = Attachment {
            file_name: self.file_name,
            content_type: self.content_type,
            content: self.content.into_bytes(),
        };
        (self.kind, attachment)
    }
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    #[serde(default)]
    pub terms_accepted: bool,
}

pub fn providers_router() -> Router {
    Router::new()
        .route("/api/onboarding", post(start_onboarding).get(my_onboarding))
        .route("/api/onboarding/business", put(save_business_info))
        .route("/api/onboarding/service", put(save_service_details))
        .route("/api/onboarding/back", post(go_back))
        .route("/api/onboarding/documents", post(attach_document))
        .route("/api/onboarding/documents/resubmit", post(resubmit_document))
        .route("/api/onboarding/submit", post(submit_application))
        .route("/api/providers/:id", get(provider_profile))
        .route("/api/providers/:id/stats", get(provider_stats))
}

// "Become a provider"
async fn start_onboarding(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let actor = current_actor(&headers, &market).await?;
    let profile = market.onboarding.start(&actor).await?;
    Ok((StatusCode::CREATED, success(profile)))
}

async fn my_onboarding(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.onboarding.profile(&actor.account_id).await?))
}

// Step 1
async fn save_business_info(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<BusinessInfo>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.onboarding.save_business_info(&actor, payload).await?))
}

// Step 2
async fn save_service_details(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<ServiceDetails>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.onboarding.save_service_details(&actor, payload).await?))
}

async fn go_back(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.onboarding.go_back(&actor).await?))
}

// Step 3
async fn attach_document(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<DocumentUpload>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let (kind, attachment) = payload.into_parts();
    Ok(success(
        market.onboarding.attach_document(&actor, kind, &attachment).await?,
    ))
}

async fn resubmit_document(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<DocumentUpload>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let (kind, attachment) = payload.into_parts();
    Ok(success(
        market.onboarding.resubmit_document(&actor, kind, &attachment).await?,
    ))
}

async fn submit_application(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<SubmitRequest>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(
        market.onboarding.submit(&actor, payload.terms_accepted).await?,
    ))
}

async fn provider_profile(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    current_actor(&headers, &market).await?;
    Ok(success(market.onboarding.profile(&AccountId::from(id)).await?))
}

// Dashboard numbers, for the provider themselves or an admin
async fn provider_stats(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let account_id = AccountId::from(id);
    if actor.account_id != account_id && !actor.is_admin() {
        return Err(MarketError::Unauthorized(
            "stats are only visible to the provider".into(),
        ));
    }
    Ok(success(market.onboarding.provider_stats(&account_id).await?))
}
