//! Commit and revision repository.

use crate::error::MetadataResult;
use crate::models::{CommitRow, FileRevisionRow, NewCommit};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Result of writing a commit.
#[derive(Debug, Clone)]
pub enum CommitWrite {
    Committed(CommitRow),
    /// Nothing was written; these content hashes are not fully registered.
    MissingContent(Vec<String>),
}

/// Result of writing a restore commit.
#[derive(Debug, Clone)]
pub struct RestoreWrite {
    pub commit: CommitRow,
    /// Revisions written by the restore.
    pub revisions: Vec<FileRevisionRow>,
}

/// Repository for commits and file revisions.
#[async_trait]
pub trait CommitRepo: Send + Sync {
    /// Write a commit and its revisions in one transaction.
    ///
    /// The sequence number is one past the project's current maximum. Every
    /// revision's content hash, deletions included, must be complete in the
    /// chunk catalog; otherwise the transaction is rolled back and the
    /// missing hashes are returned. A concurrent writer taking the same
    /// sequence number surfaces as `AlreadyExists`.
    async fn create_commit(&self, commit: &NewCommit) -> MetadataResult<CommitWrite>;

    async fn get_commit(&self, project_id: i64, commit_id: i64)
    -> MetadataResult<Option<CommitRow>>;

    async fn get_commit_by_sequence(
        &self,
        project_id: i64,
        sequence_number: i64,
    ) -> MetadataResult<Option<CommitRow>>;

    /// The commit with the highest sequence number.
    async fn latest_commit(&self, project_id: i64) -> MetadataResult<Option<CommitRow>>;

    /// Commits newest first.
    async fn list_commits(
        &self,
        project_id: i64,
        offset: i64,
        limit: i64,
    ) -> MetadataResult<Vec<CommitRow>>;

    async fn count_commits(&self, project_id: i64) -> MetadataResult<i64>;

    /// Revisions introduced by one commit.
    async fn list_commit_revisions(&self, commit_id: i64) -> MetadataResult<Vec<FileRevisionRow>>;

    /// Newest revision of every path with `commit_id <= at_commit_id`,
    /// deleted paths excluded. Unordered.
    async fn state_at(&self, project_id: i64, at_commit_id: i64)
    -> MetadataResult<Vec<FileRevisionRow>>;

    /// Newest live revision of one path at a commit boundary.
    async fn file_at(
        &self,
        project_id: i64,
        path: &str,
        at_commit_id: i64,
    ) -> MetadataResult<Option<FileRevisionRow>>;

    /// Write a commit that brings the project back to its state at
    /// `target_commit_id`.
    ///
    /// Paths whose current revision already matches the target are not
    /// rewritten; paths live now but absent at the target get a deletion.
    /// Current state and target state are read inside the same transaction.
    async fn restore_commit(
        &self,
        project_id: i64,
        target_commit_id: i64,
        author_id: &str,
        comment: &str,
        created_at: OffsetDateTime,
    ) -> MetadataResult<RestoreWrite>;
}
