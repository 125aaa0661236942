//! Ledger error taxonomy with HTTP status code mapping.
//!
//! [`LedgerError`] is the single error type returned by every core
//! operation. Each variant carries a stable numeric code and a
//! `snake_case` kind so that clients can branch on the failure without
//! parsing the message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::{GuideProfileId, SessionId};

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 4001,
///     "kind": "insufficient_points",
///     "message": "insufficient points: 300 required, 100 available"
///   }
/// }
/// ```
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code, taxonomy kind and message.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Numeric error code (see the code ranges on [`LedgerError`]).
    pub code: u32,
    /// Taxonomy kind, e.g. `"out_of_stock"`.
    pub kind: String,
    /// Human-readable error message.
    pub message: String,
}

/// Failure taxonomy of the ledger core.
///
/// # Error Code Ranges
///
/// | Range     | Category            | HTTP Status                  |
/// |-----------|---------------------|------------------------------|
/// | 1000–1999 | Validation          | 400 Bad Request              |
/// | 2000–2999 | State / Not Found   | 404 / 403 / 409 / 429        |
/// | 3000–3999 | Server              | 500 Internal Server Error    |
/// | 4000–4999 | Ledger constraints  | 400 Bad Request / 409        |
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// Referenced entity is missing or inactive.
    #[error("{0} not found")]
    NotFound(String),

    /// Caller-supplied fields are malformed or do not match.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// A time range whose end is not after its start.
    #[error("invalid range: end must be after start")]
    InvalidRange,

    /// The account balance cannot cover the debit.
    #[error("insufficient points: {required} required, {available} available")]
    InsufficientPoints {
        /// Points the operation needs.
        required: i64,
        /// Points the account holds (as last observed).
        available: i64,
    },

    /// Product stock cannot cover the requested quantity.
    #[error("out of stock: {requested} requested, {available} available")]
    OutOfStock {
        /// Units the operation needs.
        requested: i64,
        /// Units in stock (as last observed).
        available: i64,
    },

    /// No QR session exists with this token.
    #[error("session {0} not found")]
    SessionNotFound(SessionId),

    /// The QR session already reached a terminal state.
    #[error("session {0} is no longer pending")]
    SessionNotPending(SessionId),

    /// The QR session expired before it was confirmed.
    #[error("session {0} has expired")]
    SessionExpired(SessionId),

    /// Pricing changed between QR creation and confirmation.
    #[error("session {0} is stale: the product cost changed, generate a new QR code")]
    StaleSession(SessionId),

    /// The requested slot overlaps an active reservation of the guide.
    #[error("reservation overlaps an existing booking of guide {0}")]
    OverlapConflict(GuideProfileId),

    /// The caller does not own the resource it tries to act on.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// The entity is not in a state that allows the requested transition.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// Too many failed attempts; the key is locked out.
    #[error("too many attempts; retry after {retry_after_secs} s")]
    RateLimited {
        /// Seconds until the lockout ends.
        retry_after_secs: u64,
    },

    /// Unexpected database or driver fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl LedgerError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::ValidationFailed(_) => 1001,
            Self::InvalidRange => 1002,
            Self::NotFound(_) => 2001,
            Self::SessionNotFound(_) => 2002,
            Self::SessionNotPending(_) => 2003,
            Self::SessionExpired(_) => 2004,
            Self::Forbidden(_) => 2005,
            Self::InvalidTransition(_) => 2006,
            Self::RateLimited { .. } => 2007,
            Self::Internal(_) => 3000,
            Self::InsufficientPoints { .. } => 4001,
            Self::OutOfStock { .. } => 4002,
            Self::StaleSession(_) => 4003,
            Self::OverlapConflict(_) => 4004,
        }
    }

    /// Returns the taxonomy kind for this variant.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::InvalidRange => "invalid_range",
            Self::InsufficientPoints { .. } => "insufficient_points",
            Self::OutOfStock { .. } => "out_of_stock",
            Self::SessionNotFound(_) => "session_not_found",
            Self::SessionNotPending(_) => "session_not_pending",
            Self::SessionExpired(_) => "session_expired",
            Self::StaleSession(_) => "stale_session",
            Self::OverlapConflict(_) => "overlap_conflict",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidTransition(_) => "invalid_transition",
            Self::RateLimited { .. } => "rate_limited",
            Self::Internal(_) => "internal",
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationFailed(_)
            | Self::InvalidRange
            | Self::InsufficientPoints { .. }
            | Self::OutOfStock { .. }
            | Self::SessionNotPending(_)
            | Self::SessionExpired(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) | Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::StaleSession(_) | Self::OverlapConflict(_) | Self::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Shorthand for a [`LedgerError::NotFound`] naming the entity.
    #[must_use]
    pub fn not_found(entity: &str, id: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{entity} {id}"))
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for LedgerError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for LedgerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(%detail, "internal ledger failure");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                kind: self.kind().to_string(),
                message,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_constraint_failures_map_to_bad_request() {
        let err = LedgerError::InsufficientPoints {
            required: 150,
            available: 100,
        };
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.kind(), "insufficient_points");
        assert_eq!(err.error_code(), 4001);
    }

    #[test]
    fn stale_session_is_a_conflict_distinct_from_validation() {
        let id = SessionId::new();
        let stale = LedgerError::StaleSession(id);
        let invalid = LedgerError::ValidationFailed("quantity does not match".to_string());
        assert_eq!(stale.status_code(), StatusCode::CONFLICT);
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
        assert_ne!(stale.kind(), invalid.kind());
    }

    #[test]
    fn internal_error_response_hides_detail() {
        let err = LedgerError::Internal("relation \"users\" does not exist".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_helper_names_entity() {
        let err = LedgerError::not_found("product", 9);
        assert_eq!(err.to_string(), "product 9 not found");
    }
}
