//! S3-compatible block storage.
//!
//! Blocks never exceed the configured maximum block size, so a streamed
//! upload is held in memory and written with a single `PutObject` once it
//! finishes. Nothing is visible under the key before then, and aborting only
//! drops the buffer.

use crate::error::{StorageError, StorageResult};
use crate::traits::{ByteStream, ObjectMeta, ObjectStore, PresignedUrl, StreamingUpload};
use async_trait::async_trait;
use aws_config::default_provider::credentials::DefaultCredentialsChain;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_credential_types::provider::ProvideCredentials;
use aws_credential_types::provider::future::ProvideCredentials as CredentialsFuture;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_smithy_http_client::Builder as HttpClientBuilder;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::sync::OnceCell;
use tokio_util::io::ReaderStream;
use tracing::instrument;

const DEFAULT_REGION: &str = "us-east-1";

/// S3 refuses presigned requests valid for more than seven days.
const MAX_PRESIGN_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

/// Bucket location and access for [`S3Backend`].
#[derive(Clone, Default)]
pub struct S3Settings {
    pub bucket: String,
    /// Custom endpoint. A bare `host:port` is reached over plain HTTP.
    pub endpoint: Option<String>,
    pub region: Option<String>,
    /// Prefix prepended to every block key.
    pub prefix: Option<String>,
    /// Static `(access_key_id, secret_access_key)`. Without it the AWS
    /// default credential chain is used.
    pub credentials: Option<(String, String)>,
    /// Address objects as `endpoint/bucket/key`, as MinIO expects.
    pub force_path_style: bool,
}

/// The AWS default credential chain, built on the first signed request so
/// that creating a backend touches neither the network nor trust roots.
#[derive(Debug)]
struct AmbientCredentials {
    region: Region,
    chain: OnceCell<DefaultCredentialsChain>,
}

impl ProvideCredentials for AmbientCredentials {
    fn provide_credentials<'a>(&'a self) -> CredentialsFuture<'a>
    where
        Self: 'a,
    {
        CredentialsFuture::new(async move {
            let chain = self
                .chain
                .get_or_init(|| {
                    DefaultCredentialsChain::builder()
                        .region(self.region.clone())
                        .build()
                })
                .await;
            chain.provide_credentials().await
        })
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    err.raw_response()
        .is_some_and(|response| response.status().as_u16() == 404)
}

fn s3_error<E>(err: SdkError<E>, key: &str) -> StorageError
where
    E: std::error::Error + Send + Sync + 'static,
{
    if is_not_found(&err) {
        StorageError::NotFound(key.to_string())
    } else {
        StorageError::S3(Box::new(err))
    }
}

/// Block store on an S3 bucket.
#[derive(Debug)]
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: Option<String>,
    endpoint: String,
}

impl S3Backend {
    /// Build a client for the bucket. No request is sent until first use.
    pub fn new(settings: S3Settings) -> Self {
        let region = Region::new(
            settings
                .region
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        );
        let endpoint = settings.endpoint.map(|endpoint| {
            if endpoint.contains("://") {
                endpoint
            } else {
                format!("http://{endpoint}")
            }
        });

        let mut config = aws_sdk_s3::config::Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(region.clone())
            .force_path_style(settings.force_path_style);

        config = match settings.credentials {
            Some((key_id, secret)) => config.credentials_provider(Credentials::new(
                key_id,
                secret,
                None,
                None,
                "hangar-config",
            )),
            None => config.credentials_provider(AmbientCredentials {
                region: region.clone(),
                chain: OnceCell::new(),
            }),
        };

        if let Some(url) = &endpoint {
            config = config.endpoint_url(url);
            if url.starts_with("http://") {
                config = config.http_client(HttpClientBuilder::new().build_http());
            }
        }

        let endpoint = endpoint.unwrap_or_else(|| format!("https://s3.{region}.amazonaws.com"));
        tracing::info!(bucket = %settings.bucket, %endpoint, "using s3 block storage");

        Self {
            client: Client::from_conf(config.build()),
            bucket: settings.bucket,
            prefix: settings
                .prefix
                .map(|prefix| prefix.trim_matches('/').to_string())
                .filter(|prefix| !prefix.is_empty()),
            endpoint,
        }
    }

    fn object_key(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{key}"),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Backend {
    #[instrument(skip(self), fields(backend = "s3"))]
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        match self.head(key).await {
            Ok(_) => Ok(true),
            Err(StorageError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn head(&self, key: &str) -> StorageResult<ObjectMeta> {
        let output = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| s3_error(e, key))?;

        Ok(ObjectMeta {
            size: output.content_length().unwrap_or_default().max(0) as u64,
            last_modified: output
                .last_modified()
                .and_then(|t| OffsetDateTime::from_unix_timestamp(t.secs()).ok()),
            content_type: output.content_type().map(str::to_string),
        })
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| s3_error(e, key))?;
        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::S3(Box::new(e)))?;
        Ok(data.into_bytes())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn get_stream(&self, key: &str) -> StorageResult<ByteStream> {
        let output = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| s3_error(e, key))?;
        let stream =
            ReaderStream::new(output.body.into_async_read()).map(|r| r.map_err(StorageError::Io));
        Ok(Box::pin(stream))
    }

    #[instrument(skip(self, data), fields(backend = "s3", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .body(data.into())
            .send()
            .await
            .map_err(|e| s3_error(e, key))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn put_stream(&self, key: &str) -> StorageResult<Box<dyn StreamingUpload>> {
        Ok(Box::new(BufferedUpload {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: self.object_key(key),
            buffer: BytesMut::new(),
        }))
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        // DeleteObject succeeds for absent keys.
        if !self.exists(key).await? {
            return Err(StorageError::NotFound(key.to_string()));
        }
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .send()
            .await
            .map_err(|e| s3_error(e, key))?;
        Ok(())
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn presign_get(&self, key: &str, ttl: Duration) -> StorageResult<PresignedUrl> {
        if ttl > MAX_PRESIGN_TTL {
            return Err(StorageError::Config(format!(
                "download url ttl {}s is longer than s3 allows ({}s)",
                ttl.as_secs(),
                MAX_PRESIGN_TTL.as_secs()
            )));
        }
        let lifetime = time::Duration::try_from(ttl)
            .map_err(|e| StorageError::Config(format!("invalid download url ttl: {e}")))?;
        let presigning = PresigningConfig::expires_in(ttl)
            .map_err(|e| StorageError::Config(format!("invalid download url ttl: {e}")))?;

        let expires_at = OffsetDateTime::now_utc() + lifetime;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.object_key(key))
            .presigned(presigning)
            .await
            .map_err(|e| s3_error(e, key))?;

        Ok(PresignedUrl {
            url: request.uri().to_string(),
            expires_at,
        })
    }

    fn backend_name(&self) -> &'static str {
        "s3"
    }

    #[instrument(skip(self), fields(backend = "s3"))]
    async fn health_check(&self) -> StorageResult<()> {
        let request = self.client.head_bucket().bucket(&self.bucket).send();
        match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, request).await {
            Ok(result) => result.map(|_| ()).map_err(|e| s3_error(e, &self.bucket)),
            Err(_) => Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("bucket {} did not answer within {HEALTH_CHECK_TIMEOUT:?}", self.bucket),
            ))),
        }
    }
}

/// Streamed block upload, written in one request on finish.
struct BufferedUpload {
    client: Client,
    bucket: String,
    key: String,
    buffer: BytesMut,
}

#[async_trait]
impl StreamingUpload for BufferedUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.buffer.extend_from_slice(&data);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        let Self {
            client,
            bucket,
            key,
            buffer,
        } = *self;
        let size = buffer.len() as u64;
        client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(buffer.freeze().into())
            .send()
            .await
            .map_err(|e| s3_error(e, &key))?;
        tracing::debug!(%key, size, "stored block in s3");
        Ok(size)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        Ok(())
    }
}
