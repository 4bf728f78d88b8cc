//! Single-chunk upload requests and outcomes.

use crate::block::{BlockHash, FileHash};
use serde::{Deserialize, Serialize};

/// Metadata accompanying the bytes of one uploaded chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadChunkRequest {
    pub uploader_id: String,
    pub file_hash: FileHash,
    pub chunk_index: u32,
    pub total_chunks: u32,
    pub block_hash: BlockHash,
    /// Declared byte length of the chunk.
    pub size: u64,
}

impl UploadChunkRequest {
    /// Check the positional fields and the declared size.
    pub fn validate(&self, max_block_size: u64) -> crate::Result<()> {
        if self.total_chunks == 0 {
            return Err(crate::Error::InvalidChunk(
                "total_chunks must be at least 1".to_string(),
            ));
        }
        if self.chunk_index >= self.total_chunks {
            return Err(crate::Error::InvalidChunk(format!(
                "chunk_index {} out of range for {} chunks",
                self.chunk_index, self.total_chunks
            )));
        }
        if self.size > max_block_size {
            return Err(crate::Error::InvalidBlockSize {
                size: self.size,
                max: max_block_size,
            });
        }
        Ok(())
    }
}

/// Successful result of a chunk upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOutcome {
    /// The block bytes were written to the object store.
    Uploaded,
    /// The block was already stored; only the chunk link was recorded.
    DuplicateAccepted,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(index: u32, total: u32) -> UploadChunkRequest {
        let block_hash = BlockHash::compute(b"data");
        UploadChunkRequest {
            uploader_id: "user".to_string(),
            file_hash: FileHash::from_block_hashes([&block_hash]),
            chunk_index: index,
            total_chunks: total,
            block_hash,
            size: 4,
        }
    }

    #[test]
    fn test_validate_chunk_position() {
        assert!(request(0, 1).validate(16).is_ok());
        assert!(request(3, 4).validate(16).is_ok());
        assert!(request(1, 1).validate(16).is_err());
        assert!(request(0, 0).validate(16).is_err());
    }

    #[test]
    fn test_validate_block_size() {
        let err = request(0, 1).validate(3).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidBlockSize { size: 4, max: 3 }));
    }
}
