//! Access control repository.

use crate::error::MetadataResult;
use async_trait::async_trait;
use hangar_core::AccessLevel;
use time::OffsetDateTime;

/// Repository for project and team permission grants.
#[async_trait]
pub trait AccessRepo: Send + Sync {
    /// Effective access of a user on a project.
    ///
    /// The higher of the direct project grant and the level implied by a
    /// grant on the project's team.
    async fn project_access(&self, user_id: &str, project_id: i64) -> MetadataResult<AccessLevel>;

    /// Level of a direct team grant.
    async fn team_access(&self, user_id: &str, team_id: &str) -> MetadataResult<AccessLevel>;

    /// Whether the user holds write access anywhere, which is required to
    /// upload content.
    async fn can_upload(&self, user_id: &str) -> MetadataResult<bool>;

    /// Set a direct project grant. `AccessLevel::None` removes it.
    async fn set_project_permission(
        &self,
        user_id: &str,
        project_id: i64,
        level: AccessLevel,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Set a team grant. `AccessLevel::None` removes it.
    async fn set_team_permission(
        &self,
        user_id: &str,
        team_id: &str,
        level: AccessLevel,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
