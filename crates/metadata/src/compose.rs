//! Whole-file hash verification for staged chunk sets.

use hangar_core::{BlockHash, FileHash};

/// Whether the ordered `block_hashes` compose `file_hash`.
///
/// A hash that fails to parse never composes.
pub fn blocks_compose<'a, I>(file_hash: &str, block_hashes: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let Ok(expected) = FileHash::from_hex(file_hash) else {
        return false;
    };
    let blocks: Result<Vec<BlockHash>, _> = block_hashes
        .into_iter()
        .map(BlockHash::from_hex)
        .collect();
    match blocks {
        Ok(blocks) => FileHash::from_block_hashes(&blocks) == expected,
        Err(_) => false,
    }
}
