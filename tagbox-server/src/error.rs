//! API error type for tagbox-server
//!
//! Wraps the common error taxonomy and maps it onto HTTP responses. Every
//! error body carries the stable `error_type` tag and the retryable flag so
//! client retry logic (reusing the same `client_op_id`) stays safe.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tagbox_common::Error;
use thiserror::Error as ThisError;

/// API error type
#[derive(Debug, ThisError)]
pub enum ApiError {
    /// Component error carrying the common taxonomy
    #[error(transparent)]
    Core(#[from] Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Core(Error::Database(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, retryable, message) = match &self {
            ApiError::Core(err) => {
                let status = match err.error_type() {
                    "validation" => StatusCode::BAD_REQUEST,
                    "not_found" => StatusCode::NOT_FOUND,
                    "conflict" | "invalid_state" => StatusCode::CONFLICT,
                    "timeout" => StatusCode::REQUEST_TIMEOUT,
                    "transient_infra" => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, err.error_type(), err.retryable(), err.to_string())
            }
            ApiError::Other(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal",
                false,
                err.to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_type,
                "message": message,
                "retryable": retryable,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn status_of(err: ApiError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(Error::Validation("bad".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(Error::NotFound("gone".into()).into()),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(Error::Conflict("dup".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(Error::InvalidState("late".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(Error::Timeout("slow".into()).into()),
            StatusCode::REQUEST_TIMEOUT
        );
        let io = Error::from(std::io::Error::new(std::io::ErrorKind::Other, "disk"));
        assert_eq!(status_of(io.into()), StatusCode::SERVICE_UNAVAILABLE);
    }
}
