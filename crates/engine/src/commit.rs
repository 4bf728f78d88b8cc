//! Projects, the commit engine and the commit log.

use crate::{Engine, EngineError, EngineResult, MAX_COMMIT_ATTEMPTS};
use hangar_core::revision::validate_path;
use hangar_core::{
    AccessLevel, CommitDetail, CommitId, CommitOutcome, CommitRequest, FileHash, HistoryPage,
    Project, ProjectId,
};
use hangar_metadata::MetadataError;
use hangar_metadata::models::{NewCommit, NewRevision};
use hangar_metadata::repos::CommitWrite;
use std::collections::HashSet;
use time::OffsetDateTime;

/// Longest accepted project title.
const MAX_TITLE_LEN: usize = 256;

impl Engine {
    /// Create a project in a team, together with its empty initial commit.
    ///
    /// The creator needs write access on the team and becomes the
    /// project's owner.
    #[tracing::instrument(skip(self))]
    pub async fn create_project(
        &self,
        creator: &str,
        team_id: &str,
        title: &str,
    ) -> EngineResult<Project> {
        let title = title.trim();
        if title.is_empty() || title.len() > MAX_TITLE_LEN {
            return Err(EngineError::MalformedRequest(format!(
                "project title must be 1 to {MAX_TITLE_LEN} characters"
            )));
        }
        if team_id.is_empty() {
            return Err(EngineError::MalformedRequest("team_id is required".to_string()));
        }

        let team_level = self.metadata.team_access(creator, team_id).await?;
        if !team_level.can_write() {
            return Err(EngineError::InsufficientPermission(format!(
                "write access to team {team_id} required"
            )));
        }

        let row = self
            .metadata
            .create_project(team_id, title, creator, OffsetDateTime::now_utc())
            .await?;
        tracing::info!(project_id = row.project_id, "project created");
        Ok(row.into())
    }

    /// Projects the user can read.
    pub async fn list_projects(&self, user_id: &str) -> EngineResult<Vec<Project>> {
        let rows = self.metadata.list_projects_for_user(user_id).await?;
        Ok(rows.into_iter().map(Project::from).collect())
    }

    pub async fn get_project(&self, user_id: &str, project_id: ProjectId) -> EngineResult<Project> {
        self.require_access(user_id, project_id, AccessLevel::Read)
            .await?;
        self.metadata
            .get_project(project_id)
            .await?
            .map(Project::from)
            .ok_or_else(|| EngineError::ContentNotFound(format!("project {project_id}")))
    }

    /// Propose a commit.
    ///
    /// Returns `NeedsBlocks` with every content hash that is not yet fully
    /// uploaded; in that case nothing was written. A sequence number taken by
    /// a concurrent commit is retried a bounded number of times.
    #[tracing::instrument(
        skip(self, request),
        fields(project_id = request.project_id, changes = request.changes.len())
    )]
    pub async fn commit(&self, request: &CommitRequest) -> EngineResult<CommitOutcome> {
        self.require_access(&request.author_id, request.project_id, AccessLevel::Write)
            .await?;
        validate_changes(request)?;

        let new_commit = NewCommit {
            project_id: request.project_id,
            author_id: request.author_id.clone(),
            comment: request.message.clone(),
            revisions: request
                .changes
                .iter()
                .map(|change| NewRevision {
                    path: change.path.clone(),
                    content_hash: change.content_hash.to_hex(),
                    change_kind: change.change_kind,
                })
                .collect(),
            created_at: OffsetDateTime::now_utc(),
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.metadata.create_commit(&new_commit).await {
                Ok(CommitWrite::Committed(row)) => {
                    tracing::info!(
                        commit_id = row.commit_id,
                        sequence_number = row.sequence_number,
                        "commit created"
                    );
                    return Ok(CommitOutcome::Committed {
                        commit_id: row.commit_id,
                        sequence_number: row.sequence_number,
                    });
                }
                Ok(CommitWrite::MissingContent(missing)) => {
                    tracing::info!(missing = missing.len(), "commit needs blocks");
                    let missing_hashes = missing
                        .iter()
                        .map(|hash| FileHash::from_hex(hash))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(|e| EngineError::Internal(e.to_string()))?;
                    return Ok(CommitOutcome::NeedsBlocks { missing_hashes });
                }
                Err(MetadataError::AlreadyExists(what)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::debug!(attempt, %what, "sequence number taken, retrying commit");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// One page of the commit log, newest first.
    pub async fn history(
        &self,
        user_id: &str,
        project_id: ProjectId,
        offset: i64,
    ) -> EngineResult<HistoryPage> {
        if offset < 0 {
            return Err(EngineError::MalformedRequest(
                "offset must not be negative".to_string(),
            ));
        }
        self.require_access(user_id, project_id, AccessLevel::Read)
            .await?;

        let limit = i64::from(self.settings.history_page_size);
        let total_count = self.metadata.count_commits(project_id).await?;
        let commits = self
            .metadata
            .list_commits(project_id, offset, limit)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        Ok(HistoryPage {
            total_count,
            offset,
            commits,
        })
    }

    /// A commit and the revisions it introduced.
    pub async fn commit_detail(
        &self,
        user_id: &str,
        project_id: ProjectId,
        commit_id: CommitId,
    ) -> EngineResult<CommitDetail> {
        self.require_access(user_id, project_id, AccessLevel::Read)
            .await?;

        let commit = self
            .metadata
            .get_commit(project_id, commit_id)
            .await?
            .ok_or_else(|| {
                EngineError::ContentNotFound(format!("commit {commit_id} in project {project_id}"))
            })?;

        let mut revisions = self
            .metadata
            .list_commit_revisions(commit_id)
            .await?
            .into_iter()
            .map(|row| row.into_file_state())
            .collect::<Result<Vec<_>, _>>()?;
        revisions.sort_by(|a, b| a.path.cmp(&b.path));

        Ok(CommitDetail {
            commit: commit.into(),
            revisions,
        })
    }

    /// Map a per-project sequence number to its commit id.
    pub async fn resolve_sequence(
        &self,
        user_id: &str,
        project_id: ProjectId,
        sequence_number: i64,
    ) -> EngineResult<CommitId> {
        self.require_access(user_id, project_id, AccessLevel::Read)
            .await?;
        let commit = self
            .resolve_boundary(
                project_id,
                hangar_core::CommitBoundary::Sequence(sequence_number),
            )
            .await?;
        Ok(commit.commit_id)
    }
}

/// An empty change list is valid and records a commit with no files.
fn validate_changes(request: &CommitRequest) -> EngineResult<()> {
    let mut paths = HashSet::with_capacity(request.changes.len());
    for change in &request.changes {
        validate_path(&change.path)?;
        if !paths.insert(change.path.as_str()) {
            return Err(EngineError::MalformedRequest(format!(
                "path {} appears more than once",
                change.path
            )));
        }
    }
    Ok(())
}
