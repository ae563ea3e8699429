//! API route table.

use axum::routing::get;
use axum::Router;

use super::handlers::{self, ApiState};

/// Build the `/api/v1` router.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/stages", get(handlers::list_stages))
        .route(
            "/pipelines",
            get(handlers::list_pipelines).post(handlers::run_pipeline),
        )
        .route("/pipelines/:id", get(handlers::get_pipeline))
        .route("/pipelines/:id/logs", get(handlers::get_stage_logs))
        .route("/pipelines/:id/progress", get(handlers::get_progress))
        .route("/pipelines/:id/events", get(handlers::pipeline_events))
        .with_state(state)
}

/// Unversioned routes.
pub fn health_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .with_state(state)
}
