//! API error handling.
//!
//! Provides consistent error responses for the API.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::error::Error;

/// Result alias for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// API error response body.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ApiErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    /// Create a new API error.
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            details: None,
        }
    }

    /// Create a 400 Bad Request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Create a 401 Unauthorized error.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// Create a 404 Not Found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Create a 409 Conflict error.
    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, code, message)
    }

    /// Create a 422 Unprocessable Entity error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR", message)
    }

    /// Create a 500 Internal Server Error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorResponse {
            code: self.code,
            message: self.message,
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InsufficientCredit {
                required,
                available,
            } => ApiError::new(
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_CREDIT",
                format!(
                    "Insufficient credit balance: required {required}, available {available}. \
                     Please purchase more credits to continue."
                ),
            ),
            Error::ConcurrencyLimitExceeded { limit } => ApiError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "CONCURRENCY_LIMIT_EXCEEDED",
                format!("At most {limit} tasks may be queued or running at once"),
            ),
            Error::InvalidCode => ApiError::bad_request("Invalid redeem code"),
            Error::AlreadyRedeemed => {
                ApiError::conflict("ALREADY_REDEEMED", "Redeem code already used")
            }
            Error::AlreadyTerminal { status } => ApiError::conflict(
                "ALREADY_TERMINAL",
                format!("Task already finished with status {status}"),
            ),
            Error::NotFound { entity_type, id } => {
                ApiError::not_found(format!("{} with id '{}' not found", entity_type, id))
            }
            Error::Validation(msg) => ApiError::validation(msg),
            Error::Configuration(msg) => ApiError::bad_request(msg),
            Error::PipelineFailure(msg) => {
                tracing::error!("Pipeline error surfaced to API: {}", msg);
                ApiError::internal("Processing pipeline error")
            }
            Error::DatabaseSqlx(e) => {
                tracing::error!("Database error: {}", e);
                ApiError::internal("Database error occurred")
            }
            Error::Database(msg) => {
                tracing::error!("Database error: {}", msg);
                ApiError::internal("Database error occurred")
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                ApiError::internal("Serialization error occurred")
            }
            Error::Io(e) => {
                tracing::error!("IO error: {}", e);
                ApiError::internal("IO error occurred")
            }
            Error::Other(msg) => {
                tracing::error!("Unexpected error: {}", msg);
                ApiError::internal("Internal error occurred")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_errors_map_to_client_codes() {
        let err: ApiError = Error::InsufficientCredit {
            required: 30,
            available: 10,
        }
        .into();
        assert_eq!(err.status, StatusCode::PAYMENT_REQUIRED);

        let err: ApiError = Error::ConcurrencyLimitExceeded { limit: 1 }.into();
        assert_eq!(err.status, StatusCode::TOO_MANY_REQUESTS);

        let err: ApiError = Error::AlreadyRedeemed.into();
        assert_eq!(err.status, StatusCode::CONFLICT);
    }
}
