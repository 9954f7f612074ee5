use axum::{
    Router,
    routing::{get, post},
    extract::{Extension, Json, Path},
    http::{StatusCode, HeaderMap},
    response::Json as RespJson,
};
use serde_json::Value;

use crate::error::MarketError;
use crate::model::ids::RequestId;
use crate::model::request::ServiceRequestDraft;
use crate::routes::{current_actor, success, ApiResult};
use crate::service::Marketplace;

pub fn requests_router() -> Router {
    Router::new()
        .route("/api/requests", post(submit_request).get(my_requests))
        .route("/api/requests/:id", get(get_request))
        .route("/api/requests/:id/amend", post(amend_request))
        .route("/api/requests/:id/job", post(create_job))
}

// Service request form
async fn submit_request(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Json(payload): Json<ServiceRequestDraft>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let actor = current_actor(&headers, &market).await?;
    let request = market.intake.submit(&actor, payload).await?;
    Ok((StatusCode::CREATED, success(request)))
}

async fn my_requests(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.intake.requests_for(&actor).await?))
}

async fn get_request(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.intake.get(&actor, &RequestId::from(id)).await?))
}

async fn amend_request(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
    Json(payload): Json<ServiceRequestDraft>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let actor = current_actor(&headers, &market).await?;
    let request = market.intake.amend(&actor, &RequestId::from(id), payload).await?;
    Ok((StatusCode::CREATED, success(request)))
}

// Post the request on the job board
async fn create_job(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let actor = current_actor(&headers, &market).await?;
    let job = market.jobs.create_job(&actor, &RequestId::from(id)).await?;
    Ok((StatusCode::CREATED, success(job)))
}
