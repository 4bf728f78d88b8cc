//! Revisioning operations over the metadata catalog and object store.
//!
//! [`Engine`] is constructed once at startup and shared by every request
//! handler. It owns no mutable state; consistency comes from metadata
//! transactions and content-keyed uniqueness.

pub mod commit;
pub mod download;
pub mod error;
pub mod state;
pub mod upload;

pub use error::{EngineError, EngineResult, Retry};

use hangar_core::config::ServerConfig;
use hangar_core::{AccessLevel, CommitBoundary, ProjectId};
use hangar_metadata::MetadataStore;
use hangar_metadata::models::CommitRow;
use hangar_storage::ObjectStore;
use std::sync::Arc;
use std::time::Duration;

/// Attempts made when a concurrent commit takes the same sequence number.
pub const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Tunables for engine operations.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub max_block_size: u64,
    pub download_url_ttl: Duration,
    pub history_page_size: u32,
}

impl EngineSettings {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            max_block_size: config.max_block_size,
            download_url_ttl: config.download_url_ttl(),
            history_page_size: config.history_page_size,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&ServerConfig::default())
    }
}

/// Entry point for every revisioning operation.
#[derive(Clone)]
pub struct Engine {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn ObjectStore>,
    settings: EngineSettings,
}

impl Engine {
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn ObjectStore>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            metadata,
            storage,
            settings,
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub fn storage(&self) -> &Arc<dyn ObjectStore> {
        &self.storage
    }

    /// Fail unless `user_id` holds at least `required` on the project.
    ///
    /// A project the user cannot see at all is reported as permission
    /// failure, never as not found.
    async fn require_access(
        &self,
        user_id: &str,
        project_id: ProjectId,
        required: AccessLevel,
    ) -> EngineResult<AccessLevel> {
        let level = self.metadata.project_access(user_id, project_id).await?;
        if level < required {
            tracing::debug!(
                user_id,
                project_id,
                %level,
                %required,
                "access denied"
            );
            return Err(EngineError::InsufficientPermission(format!(
                "{required} access to project {project_id} required"
            )));
        }
        Ok(level)
    }

    /// Resolve a commit boundary to a commit of the project.
    async fn resolve_boundary(
        &self,
        project_id: ProjectId,
        boundary: CommitBoundary,
    ) -> EngineResult<CommitRow> {
        let commit = match boundary {
            CommitBoundary::Latest => self.metadata.latest_commit(project_id).await?,
            CommitBoundary::Id(commit_id) => {
                self.metadata.get_commit(project_id, commit_id).await?
            }
            CommitBoundary::Sequence(sequence) => {
                self.metadata
                    .get_commit_by_sequence(project_id, sequence)
                    .await?
            }
        };
        commit.ok_or_else(|| {
            EngineError::ContentNotFound(format!(
                "commit {boundary:?} in project {project_id}"
            ))
        })
    }
}
