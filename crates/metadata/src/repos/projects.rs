//! Project repository.

use crate::error::MetadataResult;
use crate::models::ProjectRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for projects.
#[async_trait]
pub trait ProjectRepo: Send + Sync {
    /// Create a project together with its initial empty commit.
    ///
    /// The creator is granted owner access. Fails with `AlreadyExists` when
    /// the team already has a project with this title.
    async fn create_project(
        &self,
        team_id: &str,
        title: &str,
        created_by: &str,
        created_at: OffsetDateTime,
    ) -> MetadataResult<ProjectRow>;

    async fn get_project(&self, project_id: i64) -> MetadataResult<Option<ProjectRow>>;

    /// Projects the user can read, through a project grant or a team grant.
    async fn list_projects_for_user(&self, user_id: &str) -> MetadataResult<Vec<ProjectRow>>;
}
