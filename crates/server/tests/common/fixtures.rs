//! Test fixtures for generating test data.

use hangar_core::block::split_blocks;
use hangar_core::{BlockHash, FileHash};
use sha2::{Digest, Sha256};

/// Generate deterministic test data based on a seed.
pub fn seeded_bytes(seed: u64, len: usize) -> Vec<u8> {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        // Simple LCG for deterministic data
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    data
}

/// Compute SHA-256 hash of data as hex string.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn sha256_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    result.iter().map(|b| format!("{:02x}", b)).collect()
}

/// A file split into blocks the way a client would.
#[allow(dead_code)]
pub struct TestFile {
    pub data: Vec<u8>,
    pub file_hash: FileHash,
    pub blocks: Vec<(BlockHash, Vec<u8>)>,
}

#[allow(dead_code)]
impl TestFile {
    pub fn new(data: Vec<u8>, block_size: usize) -> Self {
        let blocks: Vec<(BlockHash, Vec<u8>)> = split_blocks(&data, block_size)
            .into_iter()
            .map(|(hash, bytes)| (hash, bytes.to_vec()))
            .collect();
        let file_hash = FileHash::from_block_hashes(blocks.iter().map(|(hash, _)| hash));
        Self {
            data,
            file_hash,
            blocks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        let a = seeded_bytes(42, 100);
        let b = seeded_bytes(42, 100);
        assert_eq!(a, b);

        let c = seeded_bytes(43, 100);
        assert_ne!(a, c);
    }

    #[test]
    fn test_file_blocks() {
        let file = TestFile::new(seeded_bytes(1, 100), 30);
        assert_eq!(file.blocks.len(), 4);
        let reassembled: Vec<u8> = file.blocks.iter().flat_map(|(_, b)| b.clone()).collect();
        assert_eq!(reassembled, file.data);
    }
}
