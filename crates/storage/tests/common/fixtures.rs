use bytes::Bytes;
use hangar_storage::{FilesystemBackend, UrlSigner};
use tempfile::TempDir;

/// BLAKE3 of data as lowercase hex.
pub fn blake3_hex(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// Generate deterministic test data using a seeded pseudo-random generator.
/// Same seed produces same output (reproducible tests).
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    // Simple LCG (Linear Congruential Generator)
    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Filesystem backend rooted in a fresh temp directory.
pub async fn test_backend() -> (FilesystemBackend, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let backend = FilesystemBackend::new(
        dir.path(),
        UrlSigner::new(b"storage-test-signing-key".to_vec(), "http://localhost:8080"),
    )
    .await
    .expect("Failed to create filesystem backend");
    (backend, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_bytes_deterministic() {
        assert_eq!(seeded_bytes(7, 100), seeded_bytes(7, 100));
        assert_ne!(seeded_bytes(7, 100), seeded_bytes(8, 100));
    }
}
