//! Admin token initialization.

use anyhow::{Result, bail};
use hangar_core::config::AdminConfig;
use hangar_metadata::MetadataStore;
use hangar_metadata::models::TokenRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Ensure the configured admin token exists, rotating the previous one if needed.
///
/// If the token hash changes between restarts, the previous admin token is
/// revoked and a new one is created with the new hash.
pub async fn ensure_admin_token(metadata: &dyn MetadataStore, config: &AdminConfig) -> Result<()> {
    // Auth lookups use lowercase hex.
    let hash = config
        .token_hash
        .strip_prefix("sha256:")
        .unwrap_or(&config.token_hash)
        .to_lowercase();
    let hash = hash.as_str();
    if hash.len() != 64 || !hash.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("invalid admin token_hash: expected 64 hex chars");
    }
    if config.user_id.trim().is_empty() {
        bail!("admin user_id must not be empty");
    }

    let now = OffsetDateTime::now_utc();
    if let Some(existing) = metadata.get_token_by_hash(hash).await? {
        if existing.revoked_at.is_some() {
            bail!(
                "admin token hash matches a revoked token (id={}); \
                 use a new token hash",
                existing.token_id
            );
        }
        if let Some(expires_at) = existing.expires_at
            && expires_at <= now
        {
            bail!(
                "admin token hash matches an expired token (id={}, expired={}); \
                 use a new token hash",
                existing.token_id,
                expires_at
            );
        }
        if !existing.is_admin {
            bail!(
                "admin token hash matches a non-admin token (id={})",
                existing.token_id
            );
        }
        metadata.set_admin_token_marker(existing.token_id).await?;
        tracing::debug!("admin token already exists");
        return Ok(());
    }

    if let Some(prev_id) = metadata.admin_token_marker().await? {
        metadata.revoke_token(prev_id, now).await?;
        tracing::info!(token_id = %prev_id, "previous admin token revoked");
    }

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: config.user_id.clone(),
        token_hash: hash.to_string(),
        is_admin: true,
        expires_at: None,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: config.token_description.clone(),
    };

    metadata.create_token(&token).await?;
    metadata.set_admin_token_marker(token.token_id).await?;
    tracing::info!(token_id = %token.token_id, "admin token created");

    Ok(())
}
