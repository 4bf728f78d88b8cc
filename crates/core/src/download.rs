//! Download plans.

use crate::block::{BlockHash, FileHash};
use crate::commit::CommitId;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// One block of a file, with a time-limited URL to fetch it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadChunk {
    pub chunk_index: i64,
    pub block_hash: BlockHash,
    pub size: i64,
    pub url: String,
}

/// Everything a client needs to reassemble one file at one commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadPlan {
    pub content_hash: FileHash,
    pub commit_id: CommitId,
    pub path: String,
    /// Chunks ordered by `chunk_index`.
    pub chunks: Vec<DownloadChunk>,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl DownloadPlan {
    pub fn total_size(&self) -> i64 {
        self.chunks.iter().map(|c| c.size).sum()
    }
}
