use axum::{
    Router,
    routing::{get, post},
    extract::{Extension, Json, Path},
    http::{StatusCode, HeaderMap},
    response::Json as RespJson,
};
use serde::Deserialize;
use serde_json::Value;

use crate::error::MarketError;
use crate::model::booking::{BookingResponse, BookingStatus};
use crate::model::ids::BookingId;
use crate::routes::{current_actor, success, ApiResult};
use crate::service::Marketplace;

#[derive(Deserialize)]
pub struct StatusUpdate {
    pub status: BookingStatus,
    #[serde(default)]
    pub description: String,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub stars: u8,
    pub comment: Option<String>,
}

pub fn bookings_router() -> Router {
    Router::new()
        .route("/api/bookings", get(my_bookings))
        .route("/api/bookings/:id", get(get_booking))
        .route("/api/bookings/:id/tracking", get(tracking_history))
        .route("/api/bookings/:id/status", post(advance_status))
        .route("/api/bookings/:id/cancel", post(cancel_booking))
        .route("/api/bookings/:id/review", post(review_booking))
}

async fn my_bookings(headers: HeaderMap, Extension(market): Extension<Marketplace>) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.bookings.bookings_for(&actor).await?))
}

async fn get_booking(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(market.bookings.get(&actor, &BookingId::from(id)).await?))
}

// Tracking page timeline, oldest first
async fn tracking_history(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    Ok(success(
        market.bookings.tracking_history(&actor, &BookingId::from(id)).await?,
    ))
}

async fn advance_status(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
    Json(payload): Json<StatusUpdate>,
) -> Result<(StatusCode, RespJson<Value>), MarketError> {
    let actor = current_actor(&headers, &market).await?;
    let update = market
        .bookings
        .advance_status(&actor, &BookingId::from(id), payload.status, &payload.description)
        .await?;
    Ok((StatusCode::CREATED, success(update)))
}

async fn cancel_booking(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let booking = market.bookings.cancel_booking(&actor, &BookingId::from(id)).await?;
    Ok(success(BookingResponse::from(booking)))
}

async fn review_booking(
    headers: HeaderMap,
    Extension(market): Extension<Marketplace>,
    Path(id): Path<String>,
    Json(payload): Json<ReviewRequest>,
) -> ApiResult {
    let actor = current_actor(&headers, &market).await?;
    let booking = market
        .bookings
        .review(&actor, &BookingId::from(id), payload.stars, payload.comment)
        .await?;
    Ok(success(BookingResponse::from(booking)))
}
