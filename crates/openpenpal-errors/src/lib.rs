//! Stable error taxonomy. Every concern-specific error enum
//! in the other crates converts into `DomainError`, which carries a stable
//! numeric code, an HTTP status, and a message safe to show a caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use openpenpal_types::ApiResponse;
use serde::Serialize;
use thiserror::Error;

/// The umbrella error type returned by HTTP handlers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    // --- validation ---
    #[error("OP Code is malformed: {0}")]
    BadOpCode(String),
    #[error("barcode is malformed or unknown: {0}")]
    BadBarcode(String),
    #[error("missing required field: {0}")]
    MissingField(String),

    // --- authorization ---
    #[error("authentication required")]
    Unauthenticated,
    #[error("CSRF token missing or mismatched")]
    CsrfMismatch,
    #[error("caller has no hierarchy authority over the target")]
    UnauthorizedHierarchy,
    #[error("target OP Code is outside the caller's managed scope")]
    OpCodeOutOfScope,

    // --- state ---
    #[error("illegal status transition")]
    IllegalTransition,
    #[error("task is not in a reassignable state")]
    TaskNotReassignable,
    #[error("resource was concurrently modified")]
    ConcurrentModification,

    // --- assignment ---
    #[error("no eligible courier was found for this task")]
    NoEligibleCourier,

    // --- scheduler ---
    #[error("distributed lock could not be acquired")]
    LockNotAcquired,
    #[error("event has already been processed")]
    ReplayedEvent,
    #[error("event timestamp is outside the acceptable skew window")]
    StaleEvent,
    #[error("scheduled task exceeded its timeout")]
    TaskTimeout,

    // --- gateway ---
    #[error("no healthy backend instance is available")]
    ServiceUnavailable,
    #[error("upstream call timed out")]
    UpstreamTimeout,
    #[error("retries exhausted without a successful response")]
    RetriesExhausted,
    #[error("rate limit exceeded")]
    RateLimited,

    // --- not found / generic ---
    #[error("resource not found")]
    NotFound,
    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    /// A stable, documented integer. Never renumber an existing variant.
    pub fn code(&self) -> i32 {
        match self {
            Self::BadOpCode(_) => 1001,
            Self::BadBarcode(_) => 1002,
            Self::MissingField(_) => 1003,
            Self::Unauthenticated => 2001,
            Self::CsrfMismatch => 2002,
            Self::UnauthorizedHierarchy => 2003,
            Self::OpCodeOutOfScope => 2004,
            Self::IllegalTransition => 3001,
            Self::TaskNotReassignable => 3002,
            Self::ConcurrentModification => 3003,
            Self::NoEligibleCourier => 4001,
            Self::LockNotAcquired => 5001,
            Self::ReplayedEvent => 5002,
            Self::StaleEvent => 5003,
            Self::TaskTimeout => 5004,
            Self::ServiceUnavailable => 6001,
            Self::UpstreamTimeout => 6002,
            Self::RetriesExhausted => 6003,
            Self::RateLimited => 6004,
            Self::NotFound => 404,
            Self::Internal(_) => 500,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::BadOpCode(_) | Self::BadBarcode(_) | Self::MissingField(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::CsrfMismatch | Self::UnauthorizedHierarchy | Self::OpCodeOutOfScope => {
                StatusCode::FORBIDDEN
            }
            Self::IllegalTransition | Self::TaskNotReassignable | Self::ConcurrentModification => {
                StatusCode::CONFLICT
            }
            Self::NoEligibleCourier => StatusCode::CONFLICT,
            Self::LockNotAcquired
            | Self::ReplayedEvent
            | Self::StaleEvent
            | Self::TaskTimeout => StatusCode::CONFLICT,
            Self::ServiceUnavailable => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::RetriesExhausted => StatusCode::BAD_GATEWAY,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this class of error is ever surfaced directly to end users.
    /// Scheduler errors are logged and retried per policy; admin-facing
    /// surfaces are the exception, handled by the caller explicitly.
    pub fn user_visible_message(&self) -> String {
        match self {
            Self::Internal(_) => "an internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for DomainError {
    fn into_response(self) -> Response {
        let status = self.http_status();
        let body: ApiResponse<()> = ApiResponse::error(self.code(), self.user_visible_message());
        (status, Json(body)).into_response()
    }
}

/// Per-element outcome for batch operations.
#[derive(Debug, Clone, Serialize)]
pub struct BatchOutcome<T> {
    pub id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> BatchOutcome<T> {
    pub fn success(id: impl Into<String>, result: T) -> Self {
        Self {
            id: id.into(),
            success: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: impl Into<String>, error: &DomainError) -> Self {
        Self {
            id: id.into(),
            success: false,
            result: None,
            error: Some(error.user_visible_message()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable_by_category() {
        assert_eq!(DomainError::BadOpCode("x".into()).code(), 1001);
        assert_eq!(DomainError::UnauthorizedHierarchy.code(), 2003);
        assert_eq!(DomainError::TaskNotReassignable.code(), 3002);
        assert_eq!(DomainError::NoEligibleCourier.code(), 4001);
        assert_eq!(DomainError::ReplayedEvent.code(), 5002);
        assert_eq!(DomainError::ServiceUnavailable.code(), 6001);
    }

    #[test]
    fn internal_errors_never_leak_detail() {
        let err = DomainError::Internal("connection string: secret".to_string());
        assert_eq!(err.user_visible_message(), "an internal error occurred");
    }
}
