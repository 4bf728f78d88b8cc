//! Single-chunk upload pipeline.

use crate::{Engine, EngineError, EngineResult};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use hangar_core::{BlockHash, ContentHash, InsertOutcome, UploadChunkRequest, UploadOutcome};
use hangar_metadata::MetadataError;
use hangar_metadata::models::{BlockRow, ChunkRow};
use hangar_storage::StreamingUpload;
use std::fmt::Display;
use time::OffsetDateTime;

impl Engine {
    /// Store one chunk of a file and link it into the chunk catalog.
    ///
    /// The block row is recorded before any bytes are written. When the row
    /// already exists and the object is present, the body is not read and
    /// only the chunk link is recorded. Otherwise the body is streamed to the
    /// object store while being hashed; the object only becomes visible once
    /// the hash and length match the declaration.
    #[tracing::instrument(
        skip(self, request, body),
        fields(
            block_hash = %request.block_hash,
            file_hash = %request.file_hash,
            chunk_index = request.chunk_index,
        )
    )]
    pub async fn upload_chunk<S, E>(
        &self,
        request: &UploadChunkRequest,
        body: S,
    ) -> EngineResult<UploadOutcome>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: Display,
    {
        request.validate(self.settings.max_block_size)?;

        if !self.metadata.can_upload(&request.uploader_id).await? {
            return Err(EngineError::InsufficientPermission(
                "write access to a project or team required to upload".to_string(),
            ));
        }

        let block_hash = request.block_hash.to_hex();
        let object_key = request.block_hash.to_object_key();
        let now = OffsetDateTime::now_utc();

        let recorded = self
            .metadata
            .put_block(&BlockRow {
                block_hash: block_hash.clone(),
                storage_key: object_key.clone(),
                size: request.size as i64,
                created_at: now,
            })
            .await?;

        if recorded == InsertOutcome::AlreadyExists {
            let existing = self
                .metadata
                .get_block(&block_hash)
                .await?
                .ok_or_else(|| EngineError::Internal(format!("block {block_hash} vanished")))?;
            if existing.size != request.size as i64 {
                return Err(EngineError::MalformedRequest(format!(
                    "declared size {} does not match stored block size {}",
                    request.size, existing.size
                )));
            }

            if self.storage.exists(&object_key).await? {
                self.link_chunk(request, now).await?;
                tracing::debug!("block deduplicated");
                return Ok(UploadOutcome::DuplicateAccepted);
            }
            // Recorded by an upload that has not finished or did not
            // survive. Writing the same content again is harmless.
            tracing::debug!("block recorded without object, storing");
        }

        if let Err(err) = self.store_verified(request, &object_key, body).await {
            if recorded.is_inserted()
                && let Err(cleanup_err) = self.metadata.delete_block(&block_hash).await
            {
                tracing::warn!(
                    error = %cleanup_err,
                    "failed to remove block record after rejected upload"
                );
            }
            return Err(err);
        }

        self.link_chunk(request, now).await?;
        tracing::debug!(size = request.size, "block uploaded");
        Ok(UploadOutcome::Uploaded)
    }

    /// Stream the body into the object store, committing the object only if
    /// its length and hash match the request.
    async fn store_verified<S, E>(
        &self,
        request: &UploadChunkRequest,
        object_key: &str,
        body: S,
    ) -> EngineResult<()>
    where
        S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
        E: Display,
    {
        let mut upload = self.storage.put_stream(object_key).await?;

        match copy_hashed(upload.as_mut(), request, body).await {
            Ok(()) => {
                upload.finish().await?;
                Ok(())
            }
            Err(err) => {
                if let Err(abort_err) = upload.abort().await {
                    tracing::warn!(
                        key = object_key,
                        error = %abort_err,
                        "failed to abort rejected upload"
                    );
                }
                Err(err)
            }
        }
    }

    async fn link_chunk(
        &self,
        request: &UploadChunkRequest,
        now: OffsetDateTime,
    ) -> EngineResult<InsertOutcome> {
        let outcome = self
            .metadata
            .register_chunk(
                &request.uploader_id,
                &ChunkRow {
                    file_hash: request.file_hash.to_hex(),
                    chunk_index: i64::from(request.chunk_index),
                    block_hash: request.block_hash.to_hex(),
                    block_size: request.size as i64,
                    chunk_count: i64::from(request.total_chunks),
                    created_at: now,
                },
            )
            .await;

        match outcome {
            Ok(outcome) => Ok(outcome),
            Err(MetadataError::Constraint(msg)) => Err(EngineError::MalformedRequest(msg)),
            Err(e) => Err(e.into()),
        }
    }
}

async fn copy_hashed<S, E>(
    upload: &mut dyn StreamingUpload,
    request: &UploadChunkRequest,
    mut body: S,
) -> EngineResult<()>
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin,
    E: Display,
{
    let mut hasher = ContentHash::hasher();
    let mut received: u64 = 0;

    while let Some(frame) = body.next().await {
        let frame = frame
            .map_err(|e| EngineError::MalformedRequest(format!("failed to read chunk body: {e}")))?;
        received += frame.len() as u64;
        if received > request.size {
            return Err(EngineError::MalformedRequest(format!(
                "chunk body exceeds declared size {}",
                request.size
            )));
        }
        hasher.update(&frame);
        upload.write(frame).await?;
    }

    if received != request.size {
        return Err(EngineError::MalformedRequest(format!(
            "chunk body has {received} bytes, declared {}",
            request.size
        )));
    }

    let actual = BlockHash::from_content_hash(hasher.finalize());
    if actual != request.block_hash {
        tracing::warn!(
            expected = %request.block_hash,
            actual = %actual,
            "chunk hash verification failed"
        );
        return Err(EngineError::ContentMismatch {
            expected: request.block_hash.to_hex(),
            actual: actual.to_hex(),
        });
    }
    Ok(())
}
