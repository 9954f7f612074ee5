use axum::{
    Router,
    routing::{get, post},
    extract::{Extension, Json, Path, Query},
    http::{StatusCode, HeaderMap},
    response::Json as RespJson,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;

use crate::error::MarketError;
use crate::model::ids::{BidId, JobId};
use crate::model::job::BoardQuery;
use crate::routes::{current_actor, success, ApiResult};
use crate::service::Marketplace;

#[derive(Deserialize)]
pub struct BidRequest {
    pub amount: Decimal,
    pub estimated_completion: DateTime<Utc>,
    pub message: Option<String>,
}

pub fn jobs_router() -> Router {
    Router::new()
        .route("/api/jobs", get(job_board))
        .route("/api/jobs/:id", get(get_job))
        .route("/api/jobs/:id/bids", post(submit_bid))
        .route("/api/jobs/:id/bids/:bid_id/select", post(select_bid))
        .route("/api/jobs/:id/accept", post(accept_job))
        .route("/api/jobs/:id/cancel", post(cancel_job))
        .route("/api/jobs/:id/complete", post(confirm_completion))
        .route("/api/customer/jobs", get(my_jobs))
        .route("/api/provider/bids", get(my_bids))
}

// Job board: ?type=auction&search=brooklyn&sort=value_high
async fn job_board(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Query(query): Query<BoardQuery>,
) -> ApiResult {
    current_actor(&headers, &market).await?;
    Ok(success(market.jobs.list_board(&query).await?))
}

async fn get_job(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    current_actor(&headers, &market).await?;
    Ok(success(market.jobs.get_job(&JobId::from(id)).await?))
}

async fn submit_bid(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
    Json(payload): Json<BidRequest>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let actor = current_actor(&headers, &market).await?;
    let bid = market
        .jobs
        .submit_bid(
            &actor,
            &JobId::from(id),
            payload.amount,
            payload.estimated_completion,
            payload.message,
        )
        .await?;
    Ok((StatusCode::CREATED, success(bid)))
}

// Customer picks a bid, the response is the new booking
async fn select_bid(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path((id, bid_id)): Path<(String, String)>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let actor = current_actor(&headers, &market).await?;
    let booking = market
        .jobs
        .select_bid(&actor, &JobId::from(id), &BidId::from(bid_id))
        .await?;
    Ok((StatusCode::CREATED, success(booking)))
}

// Accept an instant job or apply to a journey
async fn accept_job(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let actor = current_actor(&headers, &market).await?;
    let booking = market.jobs.accept(&actor, &JobId::from(id)).await?;
    Ok((StatusCode::CREATED, success(booking)))
}

async fn cancel_job(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.jobs.cancel_job(&actor, &JobId::from(id)).await?))
}

async fn confirm_completion(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.jobs.confirm_completion(&actor, &JobId::from(id)).await?))
}

async fn my_jobs(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.jobs.jobs_for_customer(&actor).await?))
}

async fn my_bids(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.jobs.bids_by_provider(&actor).await?))
}
