//! Administrative endpoints.

use crate::auth::{hash_token, require_auth};
use crate::envelope::ApiSuccess;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Path, Query};
use crate::handlers::common::{format_time, read_json};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use hangar_core::{AccessLevel, ProjectId};
use hangar_metadata::models::TokenRow;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// Create token request.
#[derive(Debug, Deserialize)]
pub struct CreateTokenRequest {
    pub user_id: String,
    #[serde(default)]
    pub is_admin: bool,
    pub expires_in_secs: Option<u64>,
    pub description: Option<String>,
}

/// Create token response. The secret is only ever returned here.
#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    pub token_id: String,
    pub token_secret: String,
    pub expires_at: Option<String>,
}

/// Token listing entry.
#[derive(Debug, Serialize)]
pub struct TokenInfo {
    pub token_id: String,
    pub user_id: String,
    pub is_admin: bool,
    pub expires_at: Option<String>,
    pub revoked_at: Option<String>,
    pub created_at: String,
    pub last_used_at: Option<String>,
    pub description: Option<String>,
}

impl TryFrom<TokenRow> for TokenInfo {
    type Error = ApiError;

    fn try_from(token: TokenRow) -> ApiResult<Self> {
        Ok(Self {
            token_id: token.token_id.to_string(),
            user_id: token.user_id,
            is_admin: token.is_admin,
            expires_at: token.expires_at.map(format_time).transpose()?,
            revoked_at: token.revoked_at.map(format_time).transpose()?,
            created_at: format_time(token.created_at)?,
            last_used_at: token.last_used_at.map(format_time).transpose()?,
            description: token.description,
        })
    }
}

/// POST /v1/admin/tokens - Mint a token for a user.
pub async fn create_token(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<ApiSuccess<CreateTokenResponse>> {
    require_auth(&req)?.require_admin()?;
    let body: CreateTokenRequest = read_json(req).await?;

    if body.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }

    let token_secret = generate_token_secret();
    let now = OffsetDateTime::now_utc();
    let expires_at = match body.expires_in_secs {
        Some(secs) => {
            let secs: i64 = secs.try_into().map_err(|_| {
                ApiError::BadRequest(format!("expires_in_secs too large: {secs}"))
            })?;
            Some(now + time::Duration::seconds(secs))
        }
        None => None,
    };

    let token = TokenRow {
        token_id: Uuid::new_v4(),
        user_id: body.user_id,
        token_hash: hash_token(&token_secret),
        is_admin: body.is_admin,
        expires_at,
        revoked_at: None,
        created_at: now,
        last_used_at: None,
        description: body.description,
    };
    state.metadata.create_token(&token).await?;
    tracing::info!(
        token_id = %token.token_id,
        user_id = %token.user_id,
        is_admin = token.is_admin,
        "token created"
    );

    Ok(ApiSuccess::created(CreateTokenResponse {
        token_id: token.token_id.to_string(),
        token_secret,
        expires_at: expires_at.map(format_time).transpose()?,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListTokensQuery {
    pub user_id: Option<String>,
}

/// GET /v1/admin/tokens?user_id=
pub async fn list_tokens(
    State(state): State<AppState>,
    Query(query): Query<ListTokensQuery>,
    req: Request,
) -> ApiResult<ApiSuccess<Vec<TokenInfo>>> {
    require_auth(&req)?.require_admin()?;

    let tokens = state
        .metadata
        .list_tokens(query.user_id.as_deref())
        .await?
        .into_iter()
        .map(TokenInfo::try_from)
        .collect::<ApiResult<Vec<_>>>()?;
    Ok(ApiSuccess::ok(tokens))
}

/// DELETE /v1/admin/tokens/{token_id}
pub async fn revoke_token(
    State(state): State<AppState>,
    Path(token_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_auth(&req)?.require_admin()?;

    let token_id = Uuid::parse_str(&token_id)
        .map_err(|e| ApiError::BadRequest(format!("invalid token ID: {e}")))?;

    if !state
        .metadata
        .revoke_token(token_id, OffsetDateTime::now_utc())
        .await?
    {
        return Err(ApiError::NotFound(format!("token {token_id}")));
    }
    tracing::info!(%token_id, "token revoked");
    Ok(StatusCode::NO_CONTENT)
}

/// Grant request. Level `none` removes the grant.
#[derive(Debug, Deserialize)]
pub struct SetPermissionRequest {
    pub user_id: String,
    pub level: AccessLevel,
}

/// PUT /v1/admin/permissions/projects/{project_id}
pub async fn set_project_permission(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_auth(&req)?.require_admin()?;
    let body: SetPermissionRequest = read_json(req).await?;

    if state.metadata.get_project(project_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("project {project_id}")));
    }
    state
        .metadata
        .set_project_permission(
            &body.user_id,
            project_id,
            body.level,
            OffsetDateTime::now_utc(),
        )
        .await?;
    tracing::info!(project_id, user_id = %body.user_id, access = %body.level, "project permission set");
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /v1/admin/permissions/teams/{team_id}
pub async fn set_team_permission(
    State(state): State<AppState>,
    Path(team_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    require_auth(&req)?.require_admin()?;
    let body: SetPermissionRequest = read_json(req).await?;

    state
        .metadata
        .set_team_permission(
            &body.user_id,
            &team_id,
            body.level,
            OffsetDateTime::now_utc(),
        )
        .await?;
    tracing::info!(%team_id, user_id = %body.user_id, access = %body.level, "team permission set");
    Ok(StatusCode::NO_CONTENT)
}

/// Generate a random token secret.
fn generate_token_secret() -> String {
    use base64::Engine;
    use rand::RngCore;
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_secret() {
        let a = generate_token_secret();
        let b = generate_token_secret();
        assert_ne!(a, b);
        // 32 bytes, unpadded base64.
        assert_eq!(a.len(), 43);
    }
}
