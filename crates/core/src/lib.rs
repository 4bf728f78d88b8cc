//! Core domain types for the hangar file-revisioning service.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Content, block and file hashes
//! - File revisions and change kinds
//! - Access levels
//! - Commit, history and project state views
//! - Upload and download request/response types
//! - Service configuration

pub mod access;
pub mod block;
pub mod commit;
pub mod config;
pub mod download;
pub mod error;
pub mod hash;
pub mod revision;
pub mod upload;

pub use access::AccessLevel;
pub use block::{BlockHash, FileHash, InsertOutcome};
pub use commit::{
    ChangedPath, CommitBoundary, CommitDetail, CommitId, CommitOutcome, CommitRequest,
    CommitSummary, FileState, HistoryPage, INITIAL_COMMIT_MESSAGE, Project, ProjectId,
    ProjectState, StateDiff,
};
pub use download::{DownloadChunk, DownloadPlan};
pub use error::{Error, Result};
pub use hash::{ContentHash, ContentHasher};
pub use revision::{ChangeKind, ProposedChange};
pub use upload::{UploadChunkRequest, UploadOutcome};

/// Default maximum block size: 16 MiB
pub const DEFAULT_MAX_BLOCK_SIZE: u64 = 16 * 1024 * 1024;

/// Retrieval URLs issued for downloads stay valid for 48 hours.
pub const DEFAULT_DOWNLOAD_URL_TTL_SECS: u64 = 48 * 60 * 60;

/// Commits per history page.
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 8;
