//! REST API module using Axum
//!
//! Exposes the pipeline over HTTP:
//! - `GET  /api/v1/health` - service and collaborator summary
//! - `POST /api/v1/runs` - run a video end to end, returns the run summary
//! - `POST /api/v1/runs/stream` - the same run as server-sent stage events

pub mod envelope;
mod handlers;

pub use handlers::{ApiState, HealthResponse, RunRequest};

use axum::http::{header, Method};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Build a CORS layer that is restrictive by default (same-origin only).
///
/// Set `SITEWATCH_CORS_ORIGINS` to a comma-separated list of allowed origins
/// for development.
fn build_cors_layer() -> CorsLayer {
    let base = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    match std::env::var("SITEWATCH_CORS_ORIGINS") {
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

fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/runs", post(handlers::create_run))
        .route("/runs/stream", post(handlers::stream_run))
        .with_state(state)
}

/// Create the complete application router.
pub fn create_app(state: ApiState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer())
}
