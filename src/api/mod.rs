//! REST API module using Axum
//!
//! Provides HTTP endpoints for the advisory pipeline:
//! - `POST /api/v1/pipelines` starts a run (waits for the Advisory, or
//!   returns the id immediately with `?mode=async`)
//! - record, stage log and derived progress reads per pipeline id
//! - `GET /api/v1/pipelines/:id/events` streams progress as Server-Sent Events

pub mod envelope;
pub mod handlers;
mod routes;

pub use handlers::ApiState;

use crate::config::defaults::CORS_ORIGINS_ENV;
use axum::http::{header, Method};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `AGRI_CORS_ORIGINS` to a comma-separated list of allowed origins,
/// e.g. `http://localhost:5173` for a local frontend dev server.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match std::env::var(CORS_ORIGINS_ENV) {
        Ok(origins) => {
            let allowed: Vec<_> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();
            tracing::info!(origins = %origins, "CORS: allowing configured origins");
            base.allow_origin(allowed)
        }
        Err(_) => base,
    }
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", routes::api_routes(state.clone()))
        .merge(routes::health_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
