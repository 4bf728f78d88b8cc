//! Database models mapping to the metadata schema.

use crate::error::{MetadataError, MetadataResult};
use hangar_core::{ChangeKind, CommitSummary, FileHash, FileState, Project};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Block store and chunk catalog
// =============================================================================

/// A stored content block, keyed by its hash.
#[derive(Debug, Clone, FromRow)]
pub struct BlockRow {
    pub block_hash: String,
    pub storage_key: String,
    pub size: i64,
    pub created_at: OffsetDateTime,
}

/// Placement of a block at one position of a file's content.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ChunkRow {
    pub file_hash: String,
    pub chunk_index: i64,
    pub block_hash: String,
    /// Size of the referenced block.
    pub block_size: i64,
    /// Number of chunks the file is made of; identical on every row of a file.
    pub chunk_count: i64,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Projects, commits and revisions
// =============================================================================

#[derive(Debug, Clone, FromRow)]
pub struct ProjectRow {
    pub project_id: i64,
    pub team_id: String,
    pub title: String,
    pub created_by: String,
    pub created_at: OffsetDateTime,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        Project {
            project_id: row.project_id,
            team_id: row.team_id,
            title: row.title,
            created_by: row.created_by,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct CommitRow {
    pub commit_id: i64,
    pub project_id: i64,
    pub author_id: String,
    pub comment: String,
    pub file_count: i64,
    pub sequence_number: i64,
    pub created_at: OffsetDateTime,
}

impl From<CommitRow> for CommitSummary {
    fn from(row: CommitRow) -> Self {
        CommitSummary {
            commit_id: row.commit_id,
            project_id: row.project_id,
            sequence_number: row.sequence_number,
            author_id: row.author_id,
            comment: row.comment,
            file_count: row.file_count,
            created_at: row.created_at,
        }
    }
}

/// One path's change recorded by a commit.
#[derive(Debug, Clone, FromRow)]
pub struct FileRevisionRow {
    pub revision_id: i64,
    pub project_id: i64,
    pub path: String,
    pub commit_id: i64,
    pub content_hash: String,
    pub change_kind: i32,
    pub chunk_count: i64,
}

impl FileRevisionRow {
    pub fn change_kind(&self) -> MetadataResult<ChangeKind> {
        ChangeKind::from_code(self.change_kind).map_err(|e| {
            MetadataError::Internal(format!("revision {}: {e}", self.revision_id))
        })
    }

    pub fn into_file_state(self) -> MetadataResult<FileState> {
        let change_kind = self.change_kind()?;
        let content_hash = FileHash::from_hex(&self.content_hash).map_err(|e| {
            MetadataError::Internal(format!("revision {}: {e}", self.revision_id))
        })?;
        Ok(FileState {
            path: self.path,
            content_hash,
            change_kind,
            commit_id: self.commit_id,
            revision_id: self.revision_id,
            chunk_count: self.chunk_count,
        })
    }
}

/// A revision to be written by a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRevision {
    pub path: String,
    pub content_hash: String,
    pub change_kind: ChangeKind,
}

/// A commit to be written, with its revisions.
#[derive(Debug, Clone)]
pub struct NewCommit {
    pub project_id: i64,
    pub author_id: String,
    pub comment: String,
    pub revisions: Vec<NewRevision>,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Tokens
// =============================================================================

/// API token record. Only the SHA-256 hash of the secret is stored.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub token_id: Uuid,
    pub user_id: String,
    pub token_hash: String,
    pub is_admin: bool,
    pub expires_at: Option<OffsetDateTime>,
    pub revoked_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub last_used_at: Option<OffsetDateTime>,
    pub description: Option<String>,
}

impl TokenRow {
    /// Whether the token may authenticate at `now`.
    pub fn is_active(&self, now: OffsetDateTime) -> bool {
        self.revoked_at.is_none() && self.expires_at.is_none_or(|exp| exp > now)
    }
}
