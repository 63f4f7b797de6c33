//! API request handlers

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config;
use crate::pipeline::{PipelineInfo, SafetyPipeline};

use super::envelope::{ApiErrorResponse, ApiResponse};

/// Shared handler state. The pipeline is read-only, so runs need no lock.
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<SafetyPipeline>,
}

impl ApiState {
    pub fn new(pipeline: Arc<SafetyPipeline>) -> Self {
        Self { pipeline }
    }
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub pipeline: PipelineInfo,
}

/// GET /api/v1/health
pub async fn get_health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        service: config::get().project.name.clone(),
        pipeline: state.pipeline.info(),
    })
}

// ============================================================================
// Runs
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub video_path: String,
}

impl RunRequest {
    /// The trimmed path, resolved against `paths.input_dir`.
    fn video(&self) -> Option<String> {
        let path = self.video_path.trim();
        if path.is_empty() {
            return None;
        }
        let resolved = config::get().paths.resolve_video(path);
        Some(resolved.to_string_lossy().into_owned())
    }
}

/// POST /api/v1/runs
///
/// Runs all six stages and returns the run summary.
pub async fn create_run(State(state): State<ApiState>, Json(req): Json<RunRequest>) -> Response {
    let Some(video) = req.video() else {
        return ApiErrorResponse::bad_request("video_path must not be empty");
    };

    info!(video = %video, "API run requested");
    match state.pipeline.run(&video).await {
        Ok(finished) => ApiResponse::ok(finished.summary()),
        Err(e) => {
            warn!(video = %video, error = %e, "API run failed");
            ApiErrorResponse::from_pipeline(&e)
        }
    }
}

/// POST /api/v1/runs/stream
///
/// Server-sent events, one per completed stage, named after the stage. A
/// run-ending error arrives as a final `error` event.
pub async fn stream_run(State(state): State<ApiState>, Json(req): Json<RunRequest>) -> Response {
    let Some(video) = req.video() else {
        return ApiErrorResponse::bad_request("video_path must not be empty");
    };

    info!(video = %video, "API streaming run requested");
    let events = state.pipeline.stream(&video).map(|item| {
        let event = match item {
            Ok(update) => Event::default()
                .event(update.stage.as_str())
                .json_data(&update)
                .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())),
            Err(e) => Event::default().event("error").data(e.to_string()),
        };
        Ok::<_, Infallible>(event)
    });

    Sse::new(events).keep_alive(KeepAlive::default()).into_response()
}
