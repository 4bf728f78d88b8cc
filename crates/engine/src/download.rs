//! Download resolution.

use crate::{Engine, EngineError, EngineResult};
use futures::future::try_join_all;
use hangar_core::revision::validate_path;
use hangar_core::{
    AccessLevel, BlockHash, CommitBoundary, DownloadChunk, DownloadPlan, FileHash, ProjectId,
};
use time::OffsetDateTime;

impl Engine {
    /// Resolve a path at a commit boundary to its ordered blocks, each with
    /// a time-limited retrieval URL.
    #[tracing::instrument(skip(self))]
    pub async fn resolve_download(
        &self,
        user_id: &str,
        project_id: ProjectId,
        path: &str,
        boundary: CommitBoundary,
    ) -> EngineResult<DownloadPlan> {
        self.require_access(user_id, project_id, AccessLevel::Read)
            .await?;
        validate_path(path)?;

        let commit = self.resolve_boundary(project_id, boundary).await?;
        let revision = self
            .metadata
            .file_at(project_id, path, commit.commit_id)
            .await?
            .ok_or_else(|| {
                EngineError::ContentNotFound(format!(
                    "{path} at commit {} of project {project_id}",
                    commit.commit_id
                ))
            })?;

        let chunks = self.metadata.list_chunks(&revision.content_hash).await?;
        let contiguous = chunks
            .iter()
            .enumerate()
            .all(|(i, chunk)| chunk.chunk_index == i as i64);
        if chunks.len() as i64 != revision.chunk_count || !contiguous {
            return Err(EngineError::Internal(format!(
                "catalog for {} has {} of {} chunks",
                revision.content_hash,
                chunks.len(),
                revision.chunk_count
            )));
        }

        let ttl = self.settings.download_url_ttl;
        let presigned = try_join_all(chunks.iter().map(|chunk| async move {
            let block_hash = BlockHash::from_hex(&chunk.block_hash)?;
            let url = self
                .storage
                .presign_get(&block_hash.to_object_key(), ttl)
                .await?;
            Ok::<_, EngineError>((
                DownloadChunk {
                    chunk_index: chunk.chunk_index,
                    block_hash,
                    size: chunk.block_size,
                    url: url.url,
                },
                url.expires_at,
            ))
        }))
        .await?;

        let expires_at = presigned
            .iter()
            .map(|(_, expires_at)| *expires_at)
            .min()
            .unwrap_or_else(|| OffsetDateTime::now_utc() + ttl);
        let content_hash = FileHash::from_hex(&revision.content_hash)?;

        tracing::debug!(
            chunks = presigned.len(),
            commit_id = commit.commit_id,
            "download plan issued"
        );

        Ok(DownloadPlan {
            content_hash,
            commit_id: revision.commit_id,
            path: revision.path,
            chunks: presigned.into_iter().map(|(chunk, _)| chunk).collect(),
            expires_at,
        })
    }
}
