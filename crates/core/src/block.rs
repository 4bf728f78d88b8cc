//! Block and file hash types.
//!
//! A block is a content-addressed byte range stored once in the object store.
//! A file is identified by a hash composed from the ordered hashes of the
//! blocks that reconstruct it.

use crate::hash::ContentHash;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A block hash (BLAKE3 of block contents).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockHash(ContentHash);

impl BlockHash {
    /// Create from a ContentHash.
    pub fn from_content_hash(hash: ContentHash) -> Self {
        Self(hash)
    }

    /// Compute the hash of block data.
    pub fn compute(data: &[u8]) -> Self {
        Self(ContentHash::compute(data))
    }

    /// Get the underlying content hash.
    pub fn content_hash(&self) -> &ContentHash {
        &self.0
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(ContentHash::from_hex(s)?))
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }

    /// Get the object store key for this block.
    pub fn to_object_key(&self) -> String {
        let hex = self.to_hex();
        format!("blocks/{}/{}/{}", &hex[..2], &hex[2..4], hex)
    }
}

impl fmt::Debug for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A whole-file content hash.
///
/// Computed as BLAKE3 over the concatenated raw bytes of the file's ordered
/// block hashes. The catalog recomputes it from an uploader's staged blocks
/// before accepting them as the content of the file.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileHash(ContentHash);

impl FileHash {
    /// Create from a ContentHash.
    pub fn from_content_hash(hash: ContentHash) -> Self {
        Self(hash)
    }

    /// Compose a file hash from its ordered block hashes.
    pub fn from_block_hashes<'a, I>(blocks: I) -> Self
    where
        I: IntoIterator<Item = &'a BlockHash>,
    {
        let mut hasher = ContentHash::hasher();
        for block in blocks {
            hasher.update(block.content_hash().as_bytes());
        }
        Self(hasher.finalize())
    }

    /// Get the underlying content hash.
    pub fn content_hash(&self) -> &ContentHash {
        &self.0
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        Ok(Self(ContentHash::from_hex(s)?))
    }

    /// Encode as hex string.
    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl fmt::Debug for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHash({})", &self.to_hex()[..16])
    }
}

impl fmt::Display for FileHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Result of an insert into a content-keyed catalog.
///
/// `AlreadyExists` is a success outcome: content-keyed rows are immutable, so
/// a duplicate insert means the same content is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    AlreadyExists,
}

impl InsertOutcome {
    /// Build from a "did this statement insert a row" flag.
    pub fn from_inserted(inserted: bool) -> Self {
        if inserted {
            Self::Inserted
        } else {
            Self::AlreadyExists
        }
    }

    pub fn is_inserted(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// Split data into blocks of the given size, returning the block hashes and
/// slices in order.
///
/// Empty data yields a single empty block so every file has at least one chunk.
pub fn split_blocks(data: &[u8], block_size: usize) -> Vec<(BlockHash, &[u8])> {
    if data.is_empty() {
        return vec![(BlockHash::compute(data), data)];
    }
    data.chunks(block_size.max(1))
        .map(|block| (BlockHash::compute(block), block))
        .collect()
}
