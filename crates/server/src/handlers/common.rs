//! Shared handler helpers.

use crate::error::{ApiError, ApiResult};
use axum::extract::Request;
use hangar_core::CommitBoundary;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Maximum request body size for JSON endpoints (1 MiB).
pub const MAX_JSON_BODY_SIZE: usize = 1024 * 1024;

/// Read and parse a JSON request body.
pub async fn read_json<T: DeserializeOwned>(req: Request) -> ApiResult<T> {
    let bytes = axum::body::to_bytes(req.into_body(), MAX_JSON_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))
}

/// `?commit=` or `?sequence=` selecting a snapshot; neither means latest.
#[derive(Debug, Default, Deserialize)]
pub struct BoundaryQuery {
    pub commit: Option<i64>,
    pub sequence: Option<i64>,
}

impl BoundaryQuery {
    pub fn boundary(&self) -> ApiResult<CommitBoundary> {
        match (self.commit, self.sequence) {
            (None, None) => Ok(CommitBoundary::Latest),
            (Some(commit_id), None) => Ok(CommitBoundary::Id(commit_id)),
            (None, Some(sequence)) => Ok(CommitBoundary::Sequence(sequence)),
            (Some(_), Some(_)) => Err(ApiError::BadRequest(
                "use either commit or sequence, not both".to_string(),
            )),
        }
    }
}

pub fn format_time(t: OffsetDateTime) -> ApiResult<String> {
    t.format(&Rfc3339)
        .map_err(|e| ApiError::Internal(format!("failed to format timestamp: {e}")))
}
