//! State, diff, restore and download endpoints.

use crate::auth::require_auth;
use crate::envelope::ApiSuccess;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Path, Query};
use crate::handlers::common::{BoundaryQuery, format_time, read_json};
use crate::metrics::{DOWNLOAD_PLANS_ISSUED, RESTORES};
use crate::state::AppState;
use axum::extract::{Request, State};
use hangar_core::{
    CommitBoundary, CommitId, CommitSummary, DownloadChunk, FileHash, ProjectId, ProjectState,
    StateDiff,
};
use serde::{Deserialize, Serialize};

/// GET /v1/projects/{project_id}/state?commit=|sequence=
pub async fn get_state(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<BoundaryQuery>,
    req: Request,
) -> ApiResult<ApiSuccess<ProjectState>> {
    let auth = require_auth(&req)?;
    let boundary = query.boundary()?;
    let snapshot = state
        .engine
        .state_at(&auth.user_id, project_id, boundary)
        .await?;
    Ok(ApiSuccess::ok(snapshot))
}

#[derive(Debug, Deserialize)]
pub struct DiffQuery {
    pub from: CommitId,
    pub to: Option<CommitId>,
}

/// GET /v1/projects/{project_id}/diff?from=&to=
///
/// `to` defaults to the latest commit.
pub async fn get_diff(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<DiffQuery>,
    req: Request,
) -> ApiResult<ApiSuccess<StateDiff>> {
    let auth = require_auth(&req)?;
    let to = query
        .to
        .map(CommitBoundary::Id)
        .unwrap_or(CommitBoundary::Latest);
    let diff = state
        .engine
        .diff(&auth.user_id, project_id, CommitBoundary::Id(query.from), to)
        .await?;
    Ok(ApiSuccess::ok(diff))
}

#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub commit_id: CommitId,
}

/// POST /v1/projects/{project_id}/restore
pub async fn restore(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    req: Request,
) -> ApiResult<ApiSuccess<CommitSummary>> {
    let user_id = require_auth(&req)?.user_id.clone();
    let body: RestoreRequest = read_json(req).await?;

    let commit = state
        .engine
        .restore(&user_id, project_id, body.commit_id)
        .await?;
    RESTORES.inc();
    Ok(ApiSuccess::created(commit))
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub path: String,
    pub commit: Option<CommitId>,
    pub sequence: Option<i64>,
}

/// Download plan response.
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub path: String,
    pub content_hash: FileHash,
    pub commit_id: CommitId,
    pub total_size: i64,
    pub chunks: Vec<DownloadChunk>,
    pub expires_at: String,
}

/// GET /v1/projects/{project_id}/download?path=&commit=|sequence=
pub async fn get_download(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<DownloadQuery>,
    req: Request,
) -> ApiResult<ApiSuccess<DownloadResponse>> {
    let auth = require_auth(&req)?;
    if query.path.is_empty() {
        return Err(ApiError::BadRequest("path is required".to_string()));
    }
    let boundary = BoundaryQuery {
        commit: query.commit,
        sequence: query.sequence,
    }
    .boundary()?;

    let plan = state
        .engine
        .resolve_download(&auth.user_id, project_id, &query.path, boundary)
        .await?;
    DOWNLOAD_PLANS_ISSUED.inc();

    Ok(ApiSuccess::ok(DownloadResponse {
        total_size: plan.total_size(),
        expires_at: format_time(plan.expires_at)?,
        path: plan.path,
        content_hash: plan.content_hash,
        commit_id: plan.commit_id,
        chunks: plan.chunks,
    }))
}
