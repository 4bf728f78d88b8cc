//! Token repository.

use crate::error::MetadataResult;
use crate::models::TokenRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for API token operations.
#[async_trait]
pub trait TokenRepo: Send + Sync {
    async fn create_token(&self, token: &TokenRow) -> MetadataResult<()>;

    /// Look up a token by the hash of its secret.
    async fn get_token_by_hash(&self, token_hash: &str) -> MetadataResult<Option<TokenRow>>;

    async fn get_token(&self, token_id: Uuid) -> MetadataResult<Option<TokenRow>>;

    /// Update last used time.
    async fn touch_token(&self, token_id: Uuid, used_at: OffsetDateTime) -> MetadataResult<()>;

    /// Revoke a token. Returns `false` when no such token exists.
    async fn revoke_token(&self, token_id: Uuid, revoked_at: OffsetDateTime)
    -> MetadataResult<bool>;

    /// List tokens, optionally only those of one user.
    async fn list_tokens(&self, user_id: Option<&str>) -> MetadataResult<Vec<TokenRow>>;
}
