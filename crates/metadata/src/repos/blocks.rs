//! Block repository.

use crate::error::MetadataResult;
use crate::models::BlockRow;
use async_trait::async_trait;
use hangar_core::InsertOutcome;

/// Repository for block records.
#[async_trait]
pub trait BlockRepo: Send + Sync {
    /// Record a block, leaving an existing record for the same hash untouched.
    async fn put_block(&self, block: &BlockRow) -> MetadataResult<InsertOutcome>;

    async fn get_block(&self, block_hash: &str) -> MetadataResult<Option<BlockRow>>;

    /// Remove a block record that no chunk references.
    ///
    /// Returns `false` when the block is absent. Fails with a constraint
    /// error when chunks still point at it.
    async fn delete_block(&self, block_hash: &str) -> MetadataResult<bool>;
}
