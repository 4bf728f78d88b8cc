//! Object storage abstraction and backends for hangar.
//!
//! This crate provides:
//! - Content-addressed block storage with atomic, streamed writes
//! - Time-limited download URLs for stored blocks
//! - Backends: local filesystem and S3-compatible

pub mod backends;
pub mod error;
pub mod presign;
pub mod traits;

pub use backends::filesystem::FilesystemBackend;
pub use backends::s3::{S3Backend, S3Settings};
pub use error::{StorageError, StorageResult};
pub use presign::UrlSigner;
pub use traits::{ByteStream, ObjectMeta, ObjectStore, PresignedUrl, StreamingUpload};

use hangar_core::config::StorageConfig;
use std::sync::Arc;

/// Create an object store from configuration.
pub async fn from_config(config: &StorageConfig) -> StorageResult<Arc<dyn ObjectStore>> {
    config.validate().map_err(StorageError::Config)?;

    match config {
        StorageConfig::Filesystem {
            path,
            public_base_url,
            url_signing_key,
        } => {
            let signer = match url_signing_key {
                Some(key) => UrlSigner::new(key.as_bytes().to_vec(), public_base_url.clone()),
                None => {
                    tracing::warn!(
                        "No storage.url_signing_key configured; download URLs will not survive a restart"
                    );
                    UrlSigner::ephemeral(public_base_url.clone())
                }
            };
            let backend = FilesystemBackend::new(path, signer).await?;
            Ok(Arc::new(backend))
        }
        StorageConfig::S3 {
            bucket,
            endpoint,
            region,
            prefix,
            access_key_id,
            secret_access_key,
            force_path_style,
        } => {
            let backend = S3Backend::new(S3Settings {
                bucket: bucket.clone(),
                endpoint: endpoint.clone(),
                region: region.clone(),
                prefix: prefix.clone(),
                credentials: access_key_id.clone().zip(secret_access_key.clone()),
                force_path_style: *force_path_style,
            });
            Ok(Arc::new(backend))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn from_config_filesystem_ok() {
        let temp = tempdir().unwrap();
        let config = StorageConfig::Filesystem {
            path: temp.path().join("store"),
            public_base_url: "http://pdm.local".to_string(),
            url_signing_key: Some("a-long-enough-signing-key".to_string()),
        };

        let store = from_config(&config).await.unwrap();
        store
            .put("hello.txt", Bytes::from_static(b"hi"))
            .await
            .unwrap();
        assert!(store.exists("hello.txt").await.unwrap());
        assert_eq!(store.backend_name(), "filesystem");

        let url = store
            .presign_get("hello.txt", Duration::from_secs(60))
            .await
            .unwrap();
        assert!(url.url.starts_with("http://pdm.local/v1/blobs/hello.txt?"));
    }

    #[tokio::test]
    async fn from_config_s3_ok() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: Some("minio:9000".to_string()),
            region: Some("us-east-1".to_string()),
            prefix: Some("hangar".to_string()),
            access_key_id: None,
            secret_access_key: None,
            force_path_style: true,
        };

        let store = from_config(&config).await.unwrap();
        assert_eq!(store.backend_name(), "s3");
        assert!(store.verify_presigned("k", 0, "sig").is_err());
    }

    #[tokio::test]
    async fn from_config_rejects_partial_credentials() {
        let config = StorageConfig::S3 {
            bucket: "bucket".to_string(),
            endpoint: None,
            region: None,
            prefix: None,
            access_key_id: Some("access".to_string()),
            secret_access_key: None,
            force_path_style: false,
        };

        match from_config(&config).await {
            Ok(_) => panic!("expected error"),
            Err(StorageError::Config(_)) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
}
