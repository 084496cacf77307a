//! Error taxonomy: storage failures surface as [`ServiceError`] inside the
//! service layer and are flattened to [`AppError`] at the HTTP boundary.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{AbortError, ApplyError, PlanError},
};

/// Failures raised by quiz, session, and scheduler operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The storage backend rejected or lost the operation.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// No storage backend is installed; the service is degraded.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// A request payload failed validation.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The event lifecycle forbids this operation right now.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// No quiz, event, or participant matches the given identifier.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for ServiceError {
    fn from(err: ValidationErrors) -> Self {
        ServiceError::InvalidInput(format!("validation failed: {err}"))
    }
}

/// HTTP-facing error. Everything a route handler can fail with collapses
/// into one of these and renders as a JSON body with a matching status.
#[derive(Debug, Error)]
pub enum AppError {
    /// 400.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// 404.
    #[error("not found: {0}")]
    NotFound(String),
    /// 409, the event is in the wrong lifecycle phase.
    #[error("conflict: {0}")]
    Conflict(String),
    /// 503, storage is unreachable or the service is degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::InvalidInput(reason) => AppError::BadRequest(reason),
            ServiceError::InvalidState(reason) => AppError::Conflict(reason),
            ServiceError::NotFound(reason) => AppError::NotFound(reason),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorBody {
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

// State machine errors all mean "the lifecycle disagrees with you" from the
// caller's point of view, so they map to InvalidState uniformly.

impl From<PlanError> for ServiceError {
    fn from(err: PlanError) -> Self {
        let reason = match err {
            PlanError::AlreadyPending => "another transition is already pending".to_string(),
            PlanError::InvalidTransition(invalid) => invalid.to_string(),
        };
        ServiceError::InvalidState(reason)
    }
}

impl From<ApplyError> for ServiceError {
    fn from(err: ApplyError) -> Self {
        let reason = match err {
            ApplyError::NoPending => "no transition is pending".to_string(),
            ApplyError::IdMismatch { .. } => "pending transition does not match".to_string(),
            ApplyError::PhaseMismatch { expected, actual } => {
                format!("event phase changed mid-transition (expected {expected:?}, got {actual:?})")
            }
            ApplyError::VersionMismatch { expected, actual } => {
                format!("event state version moved (expected {expected}, got {actual})")
            }
        };
        ServiceError::InvalidState(reason)
    }
}

impl From<AbortError> for ServiceError {
    fn from(err: AbortError) -> Self {
        let reason = match err {
            AbortError::NoPending => "no transition to abort".to_string(),
            AbortError::IdMismatch { .. } => "abort does not match the pending plan".to_string(),
        };
        ServiceError::InvalidState(reason)
    }
}
