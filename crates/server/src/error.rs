//! API error types.

use crate::envelope::{Envelope, ErrorBody};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hangar_engine::{EngineError, Retry};
use hangar_metadata::MetadataError;
use hangar_storage::StorageError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("core error: {0}")]
    Core(#[from] hangar_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "insufficient_permission",
            Self::BadRequest(_) => "malformed_request",
            Self::NotFound(_) => "content_not_found",
            Self::Internal(_) => "internal_error",
            Self::Engine(e) => e.code(),
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => "content_not_found",
                StorageError::InvalidSignature(_) | StorageError::Expired(_) => {
                    "insufficient_permission"
                }
                StorageError::InvalidKey(_) => "malformed_request",
                e if e.is_unavailable() => "storage_unavailable",
                _ => "internal_error",
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => "content_not_found",
                MetadataError::AlreadyExists(_) => "conflict",
                MetadataError::Constraint(_) => "malformed_request",
                MetadataError::Database(_) => "storage_unavailable",
                _ => "internal_error",
            },
            Self::Core(_) => "malformed_request",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self.code() {
            "unauthorized" => StatusCode::UNAUTHORIZED,
            "insufficient_permission" => StatusCode::FORBIDDEN,
            "malformed_request" | "content_mismatch" => StatusCode::BAD_REQUEST,
            "content_not_found" => StatusCode::NOT_FOUND,
            "conflict" => StatusCode::CONFLICT,
            "storage_unavailable" => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Retry guidance sent with the error.
    pub fn retry(&self) -> Retry {
        match self {
            Self::Engine(e) => e.retry(),
            _ => match self.status_code() {
                StatusCode::BAD_REQUEST | StatusCode::CONFLICT | StatusCode::UNAUTHORIZED => {
                    Retry::FixInput
                }
                StatusCode::SERVICE_UNAVAILABLE => Retry::Later,
                _ => Retry::Never,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = Envelope::<()>::Error {
            error: ErrorBody {
                code: self.code().to_string(),
                message: self.to_string(),
                retry: self.retry(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_map_to_status() {
        let cases = [
            (
                EngineError::InsufficientPermission("x".into()),
                StatusCode::FORBIDDEN,
                Retry::Never,
            ),
            (
                EngineError::ContentMismatch {
                    expected: "a".into(),
                    actual: "b".into(),
                },
                StatusCode::BAD_REQUEST,
                Retry::FixInput,
            ),
            (
                EngineError::StorageUnavailable("x".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                Retry::Later,
            ),
            (
                EngineError::ContentNotFound("x".into()),
                StatusCode::NOT_FOUND,
                Retry::Never,
            ),
            (
                EngineError::Conflict("x".into()),
                StatusCode::CONFLICT,
                Retry::FixInput,
            ),
        ];
        for (err, status, retry) in cases {
            let err = ApiError::from(err);
            assert_eq!(err.status_code(), status, "{err}");
            assert_eq!(err.retry(), retry, "{err}");
        }
    }

    #[test]
    fn test_expired_url_is_forbidden() {
        let err = ApiError::from(StorageError::Expired("blocks/aa".into()));
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.retry(), Retry::Never);
    }
}
