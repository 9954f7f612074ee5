//! Error taxonomy shared by every marketplace operation.
//!
//! Each variant belongs to one [`ErrorKind`]. Callers match on the kind to
//! decide whether to fix their input, re-fetch and retry, or give up. The HTTP
//! layer maps kinds onto status codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::{error, warn};

use crate::model::booking::BookingStatus;
use crate::model::job::JobStatus;
use crate::store::StoreError;

pub type MarketResult<T> = Result<T, MarketError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    StateConflict,
    NotFound,
    Authorization,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    // validation
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("{field}: {message}")]
    Validation { field: String, message: String },

    #[error("submission incomplete, missing: {}", .missing.join(", "))]
    IncompleteSubmission { missing: Vec<String> },

    // state conflicts
    #[error("job {job_id} does not accept bids")]
    JobNotBiddable { job_id: String },

    #[error("provider {provider_id} already has a bid on job {job_id}")]
    DuplicateBid { job_id: String, provider_id: String },

    #[error("job {job_id} is not in a selectable state")]
    JobNotInSelectableState { job_id: String },

    #[error("job {job_id} has already been taken")]
    JobAlreadyAssigned { job_id: String },

    #[error("cannot move {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },

    #[error("{entity} {id} is already {status}")]
    AlreadyTerminal {
        entity: &'static str,
        id: String,
        status: String,
    },

    #[error("onboarding is at {current}, expected {expected}")]
    InvalidOnboardingStep { current: String, expected: String },

    #[error("{entity} {id} was modified concurrently, re-fetch and retry")]
    ConcurrentModification { entity: String, id: String },

    #[error("email {0} is already registered")]
    EmailTaken(String),

    #[error("booking {0} has already been reviewed")]
    AlreadyReviewed(String),

    // not found
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("bid {bid_id} not found on job {job_id}")]
    BidNotFound { job_id: String, bid_id: String },

    // authorization
    #[error("authentication required")]
    Unauthenticated,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("not allowed: {0}")]
    Unauthorized(String),

    #[error(transparent)]
    Storage(StoreError),
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        MarketError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        MarketError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn job_transition(from: JobStatus, to: JobStatus) -> Self {
        MarketError::InvalidTransition {
            entity: "job",
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn booking_transition(from: BookingStatus, to: BookingStatus) -> Self {
        MarketError::InvalidTransition {
            entity: "booking",
            from: from.to_string(),
            to: to.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            MarketError::InvalidRequest(_)
            | MarketError::Validation { .. }
            | MarketError::IncompleteSubmission { .. } => ErrorKind::Validation,

            MarketError::JobNotBiddable { .. }
            | MarketError::DuplicateBid { .. }
            | MarketError::JobNotInSelectableState { .. }
            | MarketError::JobAlreadyAssigned { .. }
            | MarketError::InvalidTransition { .. }
            | MarketError::AlreadyTerminal { .. }
            | MarketError::InvalidOnboardingStep { .. }
            | MarketError::ConcurrentModification { .. }
            | MarketError::EmailTaken(_)
            | MarketError::AlreadyReviewed(_) => ErrorKind::StateConflict,

            MarketError::NotFound { .. } | MarketError::BidNotFound { .. } => ErrorKind::NotFound,

            MarketError::Unauthenticated
            | MarketError::InvalidCredentials
            | MarketError::Unauthorized(_) => ErrorKind::Authorization,

            MarketError::Storage(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine readable code.
    pub fn code(&self) -> &'static str {
        match self {
            MarketError::InvalidRequest(_) => "invalid_request",
            MarketError::Validation { .. } => "validation_failed",
            MarketError::IncompleteSubmission { .. } => "incomplete_submission",
            MarketError::JobNotBiddable { .. } => "job_not_biddable",
            MarketError::DuplicateBid { .. } => "duplicate_bid",
            MarketError::JobNotInSelectableState { .. } => "job_not_in_selectable_state",
            MarketError::JobAlreadyAssigned { .. } => "job_already_assigned",
            MarketError::InvalidTransition { .. } => "invalid_transition",
            MarketError::AlreadyTerminal { .. } => "already_terminal",
            MarketError::InvalidOnboardingStep { .. } => "invalid_onboarding_step",
            MarketError::ConcurrentModification { .. } => "concurrent_modification",
            MarketError::EmailTaken(_) => "email_taken",
            MarketError::AlreadyReviewed(_) => "already_reviewed",
            MarketError::NotFound { .. } => "not_found",
            MarketError::BidNotFound { .. } => "bid_not_found",
            MarketError::Unauthenticated => "unauthenticated",
            MarketError::InvalidCredentials => "invalid_credentials",
            MarketError::Unauthorized(_) => "unauthorized",
            MarketError::Storage(_) => "storage_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Authorization => match self {
                MarketError::Unauthorized(_) => StatusCode::FORBIDDEN,
                _ => StatusCode::UNAUTHORIZED,
            },
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for MarketError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict { kind, id, .. } => {
                MarketError::ConcurrentModification { entity: kind, id }
            }
            other => MarketError::Storage(other),
        }
    }
}

impl IntoResponse for MarketError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let code = self.code();
        if kind == ErrorKind::Internal {
            error!(error_code = code, error = %self, "request failed");
        } else {
            warn!(error_code = code, error = %self, "request rejected");
        }

        let message = match kind {
            ErrorKind::Internal => "internal error".to_string(),
            _ => self.to_string(),
        };
        let body = serde_json::json!({
            "success": false,
            "error": {
                "kind": kind,
                "code": code,
                "message": message,
            }
        });
        (self.status_code(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_conflicts_surface_as_state_conflicts() {
        let err: MarketError = StoreError::Conflict {
            kind: "job".into(),
            id: "JOB-1".into(),
            expected_version: 3,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::StateConflict);
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn authorization_errors_split_401_and_403() {
        assert_eq!(MarketError::Unauthenticated.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            MarketError::Unauthorized("not your job".into()).status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn incomplete_submission_lists_missing_items() {
        let err = MarketError::IncompleteSubmission {
            missing: vec!["insurance".into(), "terms".into()],
        };
        assert_eq!(err.to_string(), "submission incomplete, missing: insurance, terms");
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
