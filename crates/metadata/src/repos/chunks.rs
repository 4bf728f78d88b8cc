//! Chunk catalog repository.

use crate::error::MetadataResult;
use crate::models::ChunkRow;
use async_trait::async_trait;
use hangar_core::InsertOutcome;

/// Repository for the mapping from file hashes to ordered blocks.
#[async_trait]
pub trait ChunkRepo: Send + Sync {
    /// Register a block at `(file_hash, chunk_index)` on behalf of an uploader.
    ///
    /// Chunks are staged per uploader until all `chunk_count` positions are
    /// present. The staged blocks are then checked against the file hash and,
    /// when they compose it, promoted into the shared catalog; a staged set
    /// that does not compose is discarded with a constraint error. Once a file
    /// is in the catalog its rows never change: re-registering the same block
    /// returns `AlreadyExists`, any other block or `chunk_count` is a
    /// constraint error. A block hash with no block record is one as well.
    async fn register_chunk(
        &self,
        uploader_id: &str,
        chunk: &ChunkRow,
    ) -> MetadataResult<InsertOutcome>;

    /// All catalogued chunks of a file, ordered by index.
    async fn list_chunks(&self, file_hash: &str) -> MetadataResult<Vec<ChunkRow>>;

    /// Number of catalogued positions of a file.
    async fn count_registered_chunks(&self, file_hash: &str) -> MetadataResult<i64>;

    /// Number of positions an uploader has staged for a file not yet in the
    /// catalog.
    async fn count_staged_chunks(
        &self,
        uploader_id: &str,
        file_hash: &str,
    ) -> MetadataResult<i64>;

    /// Whether the file is in the catalog.
    async fn is_file_complete(&self, file_hash: &str) -> MetadataResult<bool>;

    /// The subset of `file_hashes` that are not complete, in input order
    /// without duplicates.
    async fn missing_files(&self, file_hashes: &[String]) -> MetadataResult<Vec<String>>;
}
