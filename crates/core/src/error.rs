//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("invalid change kind: {0}")]
    InvalidChangeKind(String),

    #[error("invalid chunk: {0}")]
    InvalidChunk(String),

    #[error("invalid block size: {size} (max {max})")]
    InvalidBlockSize { size: u64, max: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
