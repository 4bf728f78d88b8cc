//! Marker for the token created from the admin configuration.

use crate::error::MetadataResult;
use async_trait::async_trait;
use uuid::Uuid;

/// Remembers which token the server created from its admin config, so a
/// changed config hash can revoke the token it replaces.
#[async_trait]
pub trait AdminMarkerRepo: Send + Sync {
    async fn admin_token_marker(&self) -> MetadataResult<Option<Uuid>>;

    async fn set_admin_token_marker(&self, token_id: Uuid) -> MetadataResult<()>;
}
