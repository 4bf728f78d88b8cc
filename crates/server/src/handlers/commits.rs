//! Commit endpoints.

use crate::auth::require_auth;
use crate::envelope::{ApiSuccess, needs_blocks};
use crate::error::ApiResult;
use crate::extract::{Path, Query};
use crate::handlers::common::read_json;
use crate::metrics::{COMMITS_CREATED, COMMITS_NEEDING_BLOCKS};
use crate::state::AppState;
use axum::extract::{Request, State};
use axum::response::{IntoResponse, Response};
use hangar_core::{
    CommitDetail, CommitId, CommitOutcome, CommitRequest, HistoryPage, ProjectId, ProposedChange,
};
use serde::{Deserialize, Serialize};

/// Create commit request body.
#[derive(Debug, Deserialize)]
pub struct CreateCommitRequest {
    pub message: String,
    pub changes: Vec<ProposedChange>,
}

/// Body of a commit that landed.
#[derive(Debug, Serialize)]
pub struct CommitCreated {
    pub commit_id: CommitId,
    pub sequence_number: i64,
}

/// POST /v1/projects/{project_id}/commits - Propose a commit.
///
/// Answers `needs_blocks` when any referenced content is not fully uploaded.
pub async fn create_commit(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    req: Request,
) -> ApiResult<Response> {
    let author_id = require_auth(&req)?.user_id.clone();
    let body: CreateCommitRequest = read_json(req).await?;

    let request = CommitRequest {
        project_id,
        author_id,
        message: body.message,
        changes: body.changes,
    };

    match state.engine.commit(&request).await? {
        CommitOutcome::Committed {
            commit_id,
            sequence_number,
        } => {
            COMMITS_CREATED.inc();
            Ok(ApiSuccess::created(CommitCreated {
                commit_id,
                sequence_number,
            })
            .into_response())
        }
        CommitOutcome::NeedsBlocks { missing_hashes } => {
            COMMITS_NEEDING_BLOCKS.inc();
            Ok(needs_blocks(missing_hashes))
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub offset: i64,
}

/// GET /v1/projects/{project_id}/commits?offset= - One page of history.
pub async fn list_commits(
    State(state): State<AppState>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<HistoryQuery>,
    req: Request,
) -> ApiResult<ApiSuccess<HistoryPage>> {
    let auth = require_auth(&req)?;
    let page = state
        .engine
        .history(&auth.user_id, project_id, query.offset)
        .await?;
    Ok(ApiSuccess::ok(page))
}

/// GET /v1/projects/{project_id}/commits/{commit_id}
pub async fn get_commit(
    State(state): State<AppState>,
    Path((project_id, commit_id)): Path<(ProjectId, CommitId)>,
    req: Request,
) -> ApiResult<ApiSuccess<CommitDetail>> {
    let auth = require_auth(&req)?;
    let detail = state
        .engine
        .commit_detail(&auth.user_id, project_id, commit_id)
        .await?;
    Ok(ApiSuccess::ok(detail))
}
