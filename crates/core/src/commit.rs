//! Commit requests, outcomes and history views.

use crate::block::FileHash;
use crate::revision::{ChangeKind, ProposedChange};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Catalog identifier of a project.
pub type ProjectId = i64;

/// Global catalog identifier of a commit.
pub type CommitId = i64;

/// Message of the commit created alongside every new project.
pub const INITIAL_COMMIT_MESSAGE: &str = "Initial commit";

/// A project: a named, versioned tree of files owned by a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub project_id: ProjectId,
    pub team_id: String,
    pub title: String,
    pub created_by: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// A proposed commit against one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitRequest {
    pub project_id: ProjectId,
    pub author_id: String,
    pub message: String,
    pub changes: Vec<ProposedChange>,
}

/// Result of proposing a commit.
///
/// `NeedsBlocks` is not a failure: the caller uploads the listed content and
/// resubmits the identical request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CommitOutcome {
    Committed {
        commit_id: CommitId,
        sequence_number: i64,
    },
    NeedsBlocks {
        missing_hashes: Vec<FileHash>,
    },
}

impl CommitOutcome {
    pub fn commit_id(&self) -> Option<CommitId> {
        match self {
            Self::Committed { commit_id, .. } => Some(*commit_id),
            Self::NeedsBlocks { .. } => None,
        }
    }
}

/// Which commit a state query is evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitBoundary {
    /// The newest commit of the project.
    #[default]
    Latest,
    /// A global commit id.
    Id(CommitId),
    /// A per-project sequence number.
    Sequence(i64),
}

/// One commit in a project's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitSummary {
    pub commit_id: CommitId,
    pub project_id: ProjectId,
    pub sequence_number: i64,
    pub author_id: String,
    pub comment: String,
    pub file_count: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// One page of a project's commit log, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub total_count: i64,
    pub offset: i64,
    pub commits: Vec<CommitSummary>,
}

/// A path's resolved revision within a project snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileState {
    pub path: String,
    pub content_hash: FileHash,
    pub change_kind: ChangeKind,
    pub commit_id: CommitId,
    pub revision_id: i64,
    pub chunk_count: i64,
}

/// The live files of a project at a commit boundary, ordered by path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectState {
    pub project_id: ProjectId,
    pub commit_id: CommitId,
    pub sequence_number: i64,
    pub files: Vec<FileState>,
}

impl ProjectState {
    pub fn get(&self, path: &str) -> Option<&FileState> {
        self.files
            .binary_search_by(|f| f.path.as_str().cmp(path))
            .ok()
            .map(|i| &self.files[i])
    }
}

/// A path whose resolved revision differs between two snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangedPath {
    pub path: String,
    pub from: Option<FileState>,
    pub to: Option<FileState>,
}

/// Comparison of two snapshots of one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateDiff {
    pub from_commit_id: CommitId,
    pub to_commit_id: CommitId,
    /// Paths resolving to the same revision in both snapshots.
    pub unchanged: Vec<FileState>,
    pub changed: Vec<ChangedPath>,
}

/// A commit together with the revisions it introduced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitDetail {
    pub commit: CommitSummary,
    pub revisions: Vec<FileState>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(path: &str) -> FileState {
        FileState {
            path: path.to_string(),
            content_hash: FileHash::from_block_hashes(std::iter::empty()),
            change_kind: ChangeKind::Add,
            commit_id: 1,
            revision_id: 1,
            chunk_count: 0,
        }
    }

    #[test]
    fn test_project_state_lookup() {
        let state = ProjectState {
            project_id: 1,
            commit_id: 1,
            sequence_number: 1,
            files: vec![file("a"), file("b/c"), file("d")],
        };
        assert!(state.get("b/c").is_some());
        assert!(state.get("b").is_none());
    }

    #[test]
    fn test_commit_outcome_serialization() {
        let outcome = CommitOutcome::Committed {
            commit_id: 7,
            sequence_number: 2,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["outcome"], "committed");
        assert_eq!(json["commit_id"], 7);
        assert_eq!(outcome.commit_id(), Some(7));
    }
}
