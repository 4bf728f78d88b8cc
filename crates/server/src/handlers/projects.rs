//! Project endpoints.

use crate::auth::require_auth;
use crate::envelope::ApiSuccess;
use crate::error::ApiResult;
use crate::handlers::common::read_json;
use crate::state::AppState;
use axum::extract::{Request, State};
use hangar_core::Project;
use serde::Deserialize;

/// Create project request.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub team_id: String,
    pub title: String,
}

/// POST /v1/projects - Create a project with its initial commit.
pub async fn create_project(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<ApiSuccess<Project>> {
    let user_id = require_auth(&req)?.user_id.clone();
    let body: CreateProjectRequest = read_json(req).await?;

    let project = state
        .engine
        .create_project(&user_id, &body.team_id, &body.title)
        .await?;
    Ok(ApiSuccess::created(project))
}

/// GET /v1/projects - Projects the caller can read.
pub async fn list_projects(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<ApiSuccess<Vec<Project>>> {
    let auth = require_auth(&req)?;
    let projects = state.engine.list_projects(&auth.user_id).await?;
    Ok(ApiSuccess::ok(projects))
}
