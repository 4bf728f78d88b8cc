//! Metadata store error types.

use sqlx::error::ErrorKind;
use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MetadataError {
    /// Classify a driver error by its structured kind.
    ///
    /// Unique and foreign-key violations become `AlreadyExists` and
    /// `Constraint`; everything else stays a database error.
    pub fn classify(err: sqlx::Error, context: impl Into<String>) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.kind() {
                ErrorKind::UniqueViolation => return Self::AlreadyExists(context.into()),
                ErrorKind::ForeignKeyViolation => {
                    return Self::Constraint(format!("{}: {}", context.into(), db_err.message()));
                }
                _ => {}
            }
        }
        Self::Database(err)
    }
}

impl From<std::io::Error> for MetadataError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_passes_through_non_database_errors() {
        let err = MetadataError::classify(sqlx::Error::RowNotFound, "commit");
        assert!(matches!(err, MetadataError::Database(sqlx::Error::RowNotFound)));
    }
}
