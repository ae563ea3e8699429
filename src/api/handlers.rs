//! API handlers: pipeline invocation, progress reads and live events.
//!
//! All JSON handlers return `Response` via [`ApiResponse`] or
//! [`ApiErrorResponse`]. The event stream is plain Server-Sent Events.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::envelope::{ApiErrorResponse, ApiResponse};
use crate::config::defaults::{DEFAULT_LIST_LIMIT, MAX_LIST_LIMIT};
use crate::pipeline::{AdvisoryRunner, PipelineError};
use crate::store::{ProgressEvent, ProgressStore, ProgressView};
use crate::types::{Advisory, FarmerInput, PipelineId, PipelineRecord, Stage};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub runner: Arc<AdvisoryRunner>,
    pub store: Arc<dyn ProgressStore>,
}

impl ApiState {
    pub fn new(runner: AdvisoryRunner) -> Self {
        let store = Arc::clone(runner.store());
        Self {
            runner: Arc::new(runner),
            store,
        }
    }
}

// ============================================================================
// Request / response types
// ============================================================================

/// Body of `POST /api/v1/pipelines`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    #[serde(flatten)]
    pub input: FarmerInput,
    #[serde(default)]
    pub pipeline_id: Option<String>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Respond once the Advisory is ready
    #[default]
    Wait,
    /// Respond immediately with the pipeline id
    Async,
}

#[derive(Debug, Deserialize)]
pub struct RunQuery {
    #[serde(default)]
    pub mode: RunMode,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResponse {
    pub pipeline_id: PipelineId,
    pub advisory: Advisory,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunAccepted {
    pub pipeline_id: PipelineId,
}

#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct StageInfo {
    pub index: usize,
    pub name: &'static str,
    pub role: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: &'static str,
    pub agents: &'static str,
}

// ============================================================================
// Internal helpers
// ============================================================================

fn pipeline_error_response(err: &PipelineError) -> Response {
    match err {
        PipelineError::InvalidInput(e) => ApiErrorResponse::bad_request(e.to_string()),
        PipelineError::AlreadyFinished { .. } | PipelineError::AlreadyRunning { .. } => {
            ApiErrorResponse::conflict(err.to_string())
        }
        _ => ApiErrorResponse::internal(err.to_string()),
    }
}

fn parse_id(raw: String) -> Result<PipelineId, Response> {
    PipelineId::new(raw).map_err(|e| ApiErrorResponse::bad_request(e.to_string()))
}

fn load_record(state: &ApiState, id: &PipelineId) -> Result<PipelineRecord, Response> {
    match state.store.get_record(id) {
        Ok(Some(record)) => Ok(record),
        Ok(None) => Err(ApiErrorResponse::not_found(format!("pipeline {id} not found"))),
        Err(e) => Err(ApiErrorResponse::internal(format!("Storage error: {e}"))),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Response {
    ApiResponse::ok(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        store: state.store.backend_name(),
        agents: state.runner.agent_backend(),
    })
}

/// GET /api/v1/stages
pub async fn list_stages() -> Response {
    let stages: Vec<StageInfo> = Stage::ALL
        .iter()
        .map(|s| StageInfo {
            index: s.index(),
            name: s.name(),
            role: s.role(),
        })
        .collect();
    ApiResponse::ok(stages)
}

/// POST /api/v1/pipelines[?mode=async]
pub async fn run_pipeline(
    State(state): State<ApiState>,
    Query(query): Query<RunQuery>,
    body: Result<Json<RunRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => return ApiErrorResponse::bad_request(rejection.body_text()),
    };

    let pipeline_id = match request.pipeline_id {
        Some(raw) => match parse_id(raw) {
            Ok(id) => id,
            Err(resp) => return resp,
        },
        None => PipelineId::generate(),
    };

    match query.mode {
        RunMode::Wait => match state.runner.run(request.input, pipeline_id.clone()).await {
            Ok(advisory) => ApiResponse::ok(RunResponse {
                pipeline_id,
                advisory,
            }),
            Err(e) => pipeline_error_response(&e),
        },
        RunMode::Async => match state.runner.spawn(request.input, pipeline_id.clone()) {
            Ok(_handle) => {
                info!(pipeline_id = %pipeline_id, "Pipeline accepted");
                ApiResponse::accepted(RunAccepted { pipeline_id })
            }
            Err(e) => pipeline_error_response(&e),
        },
    }
}

/// GET /api/v1/pipelines?limit=20
pub async fn list_pipelines(
    State(state): State<ApiState>,
    Query(q): Query<LimitQuery>,
) -> Response {
    let limit = q.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT);
    match state.store.list_records(limit) {
        Ok(records) => ApiResponse::ok(records),
        Err(e) => ApiErrorResponse::internal(format!("Storage error: {e}")),
    }
}

/// GET /api/v1/pipelines/:id
pub async fn get_pipeline(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let record = parse_id(id).and_then(|id| load_record(&state, &id));
    match record {
        Ok(record) => ApiResponse::ok(record),
        Err(resp) => resp,
    }
}

/// GET /api/v1/pipelines/:id/logs
pub async fn get_stage_logs(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(id).and_then(|id| load_record(&state, &id).map(|_| id)) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    match state.store.stage_logs(&id) {
        Ok(logs) => ApiResponse::ok(logs),
        Err(e) => ApiErrorResponse::internal(format!("Storage error: {e}")),
    }
}

/// GET /api/v1/pipelines/:id/progress
pub async fn get_progress(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let (id, record) = match parse_id(id).and_then(|id| load_record(&state, &id).map(|r| (id, r))) {
        Ok(found) => found,
        Err(resp) => return resp,
    };

    match state.store.stage_logs(&id) {
        Ok(logs) => ApiResponse::ok(ProgressView::derive(&record, &logs)),
        Err(e) => ApiErrorResponse::internal(format!("Storage error: {e}")),
    }
}

/// GET /api/v1/pipelines/:id/events
///
/// Sends the current record first, then every write until the pipeline
/// finishes. The subscription is taken before the snapshot is read so no
/// write can fall between them; a write seen twice is harmless.
pub async fn pipeline_events(State(state): State<ApiState>, Path(id): Path<String>) -> Response {
    let id = match parse_id(id) {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    let subscription = state.store.subscribe(&id);
    let record = match load_record(&state, &id) {
        Ok(record) => record,
        Err(resp) => return resp,
    };

    debug!(pipeline_id = %id, status = %record.status, "Event stream opened");

    let finished = record.status.is_terminal();
    let snapshot = stream::iter([ProgressEvent::Record { record }]);
    let events: BoxStream<'static, ProgressEvent> = if finished {
        drop(subscription);
        snapshot.boxed()
    } else {
        snapshot.chain(subscription.until_finished()).boxed()
    };

    let sse_events = events.map(|event| {
        Event::default().event(event.kind()).json_data(&event).map_err(|e| {
            warn!(error = %e, "Failed to encode progress event");
            e
        })
    });

    Sse::new(sse_events)
        .keep_alive(KeepAlive::default())
        .into_response()
}
