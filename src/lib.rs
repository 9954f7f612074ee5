//! Moving marketplace backend: customers post moving jobs, providers bid or
//! accept them, and bookings are tracked through delivery.

use axum::{routing::get, Extension, Router};
use serde_json::json;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub mod config;
pub mod error;
pub mod locks;
pub mod model;
pub mod routes;
pub mod service;
pub mod session;
pub mod store;

use routes::admin::admin_router;
use routes::auth::auth_router;
use routes::bookings::bookings_router;
use routes::jobs::jobs_router;
use routes::providers::providers_router;
use routes::requests::requests_router;
use service::Marketplace;

/// The full HTTP API over one marketplace.
pub fn app(market: Marketplace) -> Router {
    Router::new()
        .merge(auth_router())
        .merge(requests_router())
        .merge(jobs_router())
        .merge(bookings_router())
        .merge(providers_router())
        .merge(admin_router())
        .route(
            "/api/health",
            get(|| async { axum::Json(json!({ "success": true, "data": "ok" })) }),
        )
        .layer(Extension(market))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
}
