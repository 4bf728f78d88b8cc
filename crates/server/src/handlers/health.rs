//! Health check endpoint.

use crate::envelope::ApiSuccess;
use crate::error::ApiResult;
use crate::state::AppState;
use axum::extract::State;
use serde::Serialize;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /v1/health - Health check.
///
/// Unauthenticated so load balancers can reach it. Returns only status and
/// version.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<ApiSuccess<HealthResponse>> {
    state.metadata.health_check().await?;
    state.storage.health_check().await?;

    Ok(ApiSuccess::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}
