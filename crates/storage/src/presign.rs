//! Signed download URLs for backends that serve objects through this service.
//!
//! A URL has the form `{base}/v1/blobs/{key}?expires={unix}&signature={hex}`
//! where the signature is SHA-256 over `secret:key:expires`.

use crate::error::{StorageError, StorageResult};
use crate::traits::PresignedUrl;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::time::Duration;
use time::OffsetDateTime;

/// Route prefix under which signed objects are served.
pub const BLOB_ROUTE_PREFIX: &str = "/v1/blobs";

/// Characters left unescaped in key path segments.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.');

/// Signs and verifies object download URLs.
#[derive(Clone)]
pub struct UrlSigner {
    secret: Vec<u8>,
    base_url: String,
}

impl UrlSigner {
    /// Create a signer with a configured secret.
    pub fn new(secret: impl Into<Vec<u8>>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            secret: secret.into(),
            base_url,
        }
    }

    /// Create a signer with a random per-process secret.
    pub fn ephemeral(base_url: impl Into<String>) -> Self {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        Self::new(secret.to_vec(), base_url)
    }

    fn signature(&self, key: &str, expires: i64) -> String {
        let mut hasher = Sha256::new();
        hasher.update(&self.secret);
        hasher.update(b":");
        hasher.update(key.as_bytes());
        hasher.update(b":");
        hasher.update(expires.to_string().as_bytes());
        hex_encode(&hasher.finalize())
    }

    /// Build a URL for `key` that stays valid for `ttl` from `now`.
    pub fn sign_at(
        &self,
        key: &str,
        ttl: Duration,
        now: OffsetDateTime,
    ) -> StorageResult<PresignedUrl> {
        let ttl = time::Duration::try_from(ttl)
            .map_err(|e| StorageError::Config(format!("invalid presign ttl: {e}")))?;
        let expires_at = now + ttl;
        let expires = expires_at.unix_timestamp();
        let signature = self.signature(key, expires);

        let encoded_key = key
            .split('/')
            .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
            .collect::<Vec<_>>()
            .join("/");

        Ok(PresignedUrl {
            url: format!(
                "{}{BLOB_ROUTE_PREFIX}/{encoded_key}?expires={expires}&signature={signature}",
                self.base_url
            ),
            expires_at,
        })
    }

    /// Build a URL for `key` that stays valid for `ttl` from now.
    pub fn sign(&self, key: &str, ttl: Duration) -> StorageResult<PresignedUrl> {
        self.sign_at(key, ttl, OffsetDateTime::now_utc())
    }

    /// Verify a URL's signature and expiry as of `now`.
    pub fn verify_at(
        &self,
        key: &str,
        expires: i64,
        signature: &str,
        now: OffsetDateTime,
    ) -> StorageResult<()> {
        let expected = self.signature(key, expires);
        if !constant_time_eq(expected.as_bytes(), signature.to_ascii_lowercase().as_bytes()) {
            return Err(StorageError::InvalidSignature(key.to_string()));
        }
        if now.unix_timestamp() > expires {
            return Err(StorageError::Expired(key.to_string()));
        }
        Ok(())
    }

    /// Verify a URL's signature and expiry as of now.
    pub fn verify(&self, key: &str, expires: i64, signature: &str) -> StorageResult<()> {
        self.verify_at(key, expires, signature, OffsetDateTime::now_utc())
    }
}

impl std::fmt::Debug for UrlSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UrlSigner")
            .field("secret", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
