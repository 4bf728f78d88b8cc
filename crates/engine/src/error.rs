//! Engine error taxonomy.

use hangar_metadata::MetadataError;
use hangar_storage::StorageError;
use serde::Serialize;
use thiserror::Error;

/// How a caller should react to a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Retry {
    /// The request itself is wrong; retrying unchanged will fail again.
    FixInput,
    /// A transient condition; the same request may succeed later.
    Later,
    /// Retrying will not help.
    Never,
}

/// Errors returned by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("insufficient permission: {0}")]
    InsufficientPermission(String),

    #[error("malformed request: {0}")]
    MalformedRequest(String),

    #[error("not found: {0}")]
    ContentNotFound(String),

    #[error("content mismatch: declared {expected}, received {actual}")]
    ContentMismatch { expected: String, actual: String },

    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InsufficientPermission(_) => "insufficient_permission",
            Self::MalformedRequest(_) => "malformed_request",
            Self::ContentNotFound(_) => "content_not_found",
            Self::ContentMismatch { .. } => "content_mismatch",
            Self::StorageUnavailable(_) => "storage_unavailable",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal_error",
        }
    }

    pub fn retry(&self) -> Retry {
        match self {
            Self::MalformedRequest(_) | Self::ContentMismatch { .. } | Self::Conflict(_) => {
                Retry::FixInput
            }
            Self::StorageUnavailable(_) => Retry::Later,
            Self::InsufficientPermission(_) | Self::ContentNotFound(_) | Self::Internal(_) => {
                Retry::Never
            }
        }
    }
}

impl From<MetadataError> for EngineError {
    fn from(err: MetadataError) -> Self {
        match err {
            MetadataError::NotFound(what) => Self::ContentNotFound(what),
            MetadataError::AlreadyExists(what) => Self::Conflict(format!("{what} already exists")),
            MetadataError::Constraint(msg) => Self::MalformedRequest(msg),
            MetadataError::Database(e) => Self::StorageUnavailable(format!("database: {e}")),
            MetadataError::Config(msg) | MetadataError::Internal(msg) => Self::Internal(msg),
        }
    }
}

impl From<StorageError> for EngineError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => Self::ContentNotFound(key),
            StorageError::InvalidKey(key) => Self::MalformedRequest(format!("invalid key: {key}")),
            e @ (StorageError::Io(_) | StorageError::S3(_)) => {
                Self::StorageUnavailable(format!("object store: {e}"))
            }
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<hangar_core::Error> for EngineError {
    fn from(err: hangar_core::Error) -> Self {
        match err {
            hangar_core::Error::HashMismatch { expected, actual } => {
                Self::ContentMismatch { expected, actual }
            }
            e => Self::MalformedRequest(e.to_string()),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_errors_map_to_taxonomy() {
        let conflict: EngineError = MetadataError::AlreadyExists("project 'x'".into()).into();
        assert_eq!(conflict.code(), "conflict");
        assert_eq!(conflict.retry(), Retry::FixInput);

        let constraint: EngineError = MetadataError::Constraint("chunk count".into()).into();
        assert_eq!(constraint.code(), "malformed_request");

        let missing: EngineError = MetadataError::NotFound("commit 9".into()).into();
        assert_eq!(missing.code(), "content_not_found");
    }

    #[test]
    fn test_storage_errors_map_to_taxonomy() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "down");
        let err: EngineError = StorageError::Io(io).into();
        assert!(matches!(err, EngineError::StorageUnavailable(_)));

        let missing: EngineError = StorageError::NotFound("blocks/aa".into()).into();
        assert_eq!(missing.retry(), Retry::Never);
        assert_eq!(err.retry(), Retry::Later);
    }

    #[test]
    fn test_hash_mismatch_is_content_mismatch() {
        let err: EngineError = hangar_core::Error::HashMismatch {
            expected: "a".into(),
            actual: "b".into(),
        }
        .into();
        assert_eq!(err.code(), "content_mismatch");
    }
}
