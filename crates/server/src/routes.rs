//! Route configuration.

use crate::auth::auth_middleware;
use crate::handlers;
use crate::metrics::{metrics_handler, track_http_metrics};
use crate::state::AppState;
use axum::Router;
use axum::middleware;
use axum::routing::{delete, get, post, put};
use hangar_storage::presign::BLOB_ROUTE_PREFIX;
use tower_http::trace::TraceLayer;

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // Health check (unauthenticated for load balancers)
        .route("/v1/health", get(handlers::health_check))
        .route(
            "/v1/projects",
            post(handlers::create_project).get(handlers::list_projects),
        )
        .route(
            "/v1/projects/{project_id}/commits",
            post(handlers::create_commit).get(handlers::list_commits),
        )
        .route(
            "/v1/projects/{project_id}/commits/{commit_id}",
            get(handlers::get_commit),
        )
        .route("/v1/projects/{project_id}/state", get(handlers::get_state))
        .route("/v1/projects/{project_id}/diff", get(handlers::get_diff))
        .route("/v1/projects/{project_id}/restore", post(handlers::restore))
        .route(
            "/v1/projects/{project_id}/download",
            get(handlers::get_download),
        )
        .route("/v1/blocks/{block_hash}", put(handlers::upload_block))
        // Presigned block retrieval (signature replaces the bearer token)
        .route(
            &format!("{BLOB_ROUTE_PREFIX}/{{*key}}"),
            get(handlers::get_blob),
        )
        // Admin endpoints (admin token required)
        .route(
            "/v1/admin/tokens",
            post(handlers::create_token).get(handlers::list_tokens),
        )
        .route(
            "/v1/admin/tokens/{token_id}",
            delete(handlers::revoke_token),
        )
        .route(
            "/v1/admin/permissions/projects/{project_id}",
            put(handlers::set_project_permission),
        )
        .route(
            "/v1/admin/permissions/teams/{team_id}",
            put(handlers::set_team_permission),
        );

    let mut router = Router::new().merge(api_routes);

    // SECURITY: When enabled, this endpoint MUST be network-restricted
    // to authorized Prometheus scraper IPs only.
    if state.config.server.metrics_enabled {
        router = router.route("/metrics", get(metrics_handler));
    }

    // Order of execution: TraceLayer -> metrics -> Auth -> Handler
    router
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn(track_http_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
