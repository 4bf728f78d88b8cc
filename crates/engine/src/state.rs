//! Project state resolution, diffs and restore.

use crate::{Engine, EngineResult, MAX_COMMIT_ATTEMPTS};
use hangar_core::{
    AccessLevel, ChangedPath, CommitBoundary, CommitId, CommitSummary, FileState, ProjectId,
    ProjectState, StateDiff,
};
use hangar_metadata::MetadataError;
use std::collections::BTreeMap;
use time::OffsetDateTime;

impl Engine {
    /// Live files of the project at its newest commit.
    pub async fn current_state(
        &self,
        user_id: &str,
        project_id: ProjectId,
    ) -> EngineResult<ProjectState> {
        self.state_at(user_id, project_id, CommitBoundary::Latest)
            .await
    }

    /// Live files of the project as of a commit boundary.
    ///
    /// For every path the newest revision at or before the boundary wins;
    /// paths whose winning revision is a deletion are left out.
    #[tracing::instrument(skip(self))]
    pub async fn state_at(
        &self,
        user_id: &str,
        project_id: ProjectId,
        boundary: CommitBoundary,
    ) -> EngineResult<ProjectState> {
        self.require_access(user_id, project_id, AccessLevel::Read)
            .await?;
        self.resolve_state(project_id, boundary).await
    }

    async fn resolve_state(
        &self,
        project_id: ProjectId,
        boundary: CommitBoundary,
    ) -> EngineResult<ProjectState> {
        let commit = self.resolve_boundary(project_id, boundary).await?;

        let mut files = self
            .metadata
            .state_at(project_id, commit.commit_id)
            .await?
            .into_iter()
            .map(|row| row.into_file_state())
            .collect::<Result<Vec<_>, _>>()?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        if files.is_empty() {
            tracing::warn!(
                project_id,
                commit_id = commit.commit_id,
                "project has no files at this commit"
            );
        }

        Ok(ProjectState {
            project_id,
            commit_id: commit.commit_id,
            sequence_number: commit.sequence_number,
            files,
        })
    }

    /// Compare two snapshots of a project.
    #[tracing::instrument(skip(self))]
    pub async fn diff(
        &self,
        user_id: &str,
        project_id: ProjectId,
        from: CommitBoundary,
        to: CommitBoundary,
    ) -> EngineResult<StateDiff> {
        self.require_access(user_id, project_id, AccessLevel::Read)
            .await?;
        let from = self.resolve_state(project_id, from).await?;
        let to = self.resolve_state(project_id, to).await?;
        Ok(compare_states(from, to))
    }

    /// Bring the project back to its state at `target_commit_id` by writing
    /// one new commit.
    ///
    /// Only paths that differ from the target are written. Requires manage
    /// access.
    #[tracing::instrument(skip(self))]
    pub async fn restore(
        &self,
        user_id: &str,
        project_id: ProjectId,
        target_commit_id: CommitId,
    ) -> EngineResult<CommitSummary> {
        self.require_access(user_id, project_id, AccessLevel::Manage)
            .await?;

        let target = self
            .resolve_boundary(project_id, CommitBoundary::Id(target_commit_id))
            .await?;
        let comment = format!("Restore to commit #{}", target.sequence_number);

        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .metadata
                .restore_commit(
                    project_id,
                    target.commit_id,
                    user_id,
                    &comment,
                    OffsetDateTime::now_utc(),
                )
                .await;
            match result {
                Ok(write) => {
                    tracing::info!(
                        commit_id = write.commit.commit_id,
                        rewritten = write.revisions.len(),
                        "project restored"
                    );
                    return Ok(write.commit.into());
                }
                Err(MetadataError::AlreadyExists(what)) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::debug!(attempt, %what, "sequence number taken, retrying restore");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// Split the paths of two snapshots into unchanged and changed.
///
/// A path is unchanged when both snapshots resolve it to the same revision.
pub fn compare_states(from: ProjectState, to: ProjectState) -> StateDiff {
    let mut sides: BTreeMap<String, (Option<FileState>, Option<FileState>)> = BTreeMap::new();
    for file in from.files {
        let path = file.path.clone();
        sides.entry(path).or_default().0 = Some(file);
    }
    for file in to.files {
        let path = file.path.clone();
        sides.entry(path).or_default().1 = Some(file);
    }

    let mut unchanged = Vec::new();
    let mut changed = Vec::new();
    for (path, (before, after)) in sides {
        match (before, after) {
            (Some(before), Some(after)) if before.revision_id == after.revision_id => {
                unchanged.push(after);
            }
            (from, to) => changed.push(ChangedPath { path, from, to }),
        }
    }

    StateDiff {
        from_commit_id: from.commit_id,
        to_commit_id: to.commit_id,
        unchanged,
        changed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hangar_core::{BlockHash, ChangeKind, FileHash};

    fn file(path: &str, revision_id: i64) -> FileState {
        FileState {
            path: path.to_string(),
            content_hash: FileHash::from_block_hashes([&BlockHash::compute(path.as_bytes())]),
            change_kind: ChangeKind::Add,
            commit_id: revision_id,
            revision_id,
            chunk_count: 1,
        }
    }

    fn state(commit_id: CommitId, files: Vec<FileState>) -> ProjectState {
        ProjectState {
            project_id: 1,
            commit_id,
            sequence_number: commit_id,
            files,
        }
    }

    #[test]
    fn test_compare_states() {
        let from = state(2, vec![file("a", 1), file("b", 2), file("c", 2)]);
        let to = state(3, vec![file("a", 1), file("b", 3), file("d", 3)]);

        let diff = compare_states(from, to);
        assert_eq!(diff.from_commit_id, 2);
        assert_eq!(diff.to_commit_id, 3);
        let unchanged: Vec<_> = diff.unchanged.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(unchanged, vec!["a"]);

        let changed: Vec<_> = diff
            .changed
            .iter()
            .map(|c| (c.path.as_str(), c.from.is_some(), c.to.is_some()))
            .collect();
        assert_eq!(
            changed,
            vec![("b", true, true), ("c", true, false), ("d", false, true)]
        );
    }
}
