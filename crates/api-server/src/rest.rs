//! REST handlers for campaign management and operational endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

use dripflow_channel::SessionSupervisor;
use dripflow_core::channels::SessionState;
use dripflow_core::store::{ContentStore, RecipientRegistry};
use dripflow_core::types::{ContentStep, Recipient, TickOutcome};
use dripflow_engine::{ProgressionEngine, TickError};

/// Maximum string field length (recipient id).
const MAX_FIELD_LEN: usize = 256;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<dyn RecipientRegistry>,
    pub content: Arc<dyn ContentStore>,
    pub engine: Arc<ProgressionEngine>,
    pub session: Arc<SessionSupervisor>,
    pub node_id: String,
    pub start_time: Instant,
}

#[derive(Debug, Deserialize)]
pub struct EnrollRequest {
    pub recipient_id: String,
}

#[derive(Debug, Deserialize)]
pub struct UpsertContentRequest {
    pub day: u32,
    pub body: String,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

#[derive(Serialize)]
pub struct SessionStatusResponse {
    pub state: SessionState,
}

fn unavailable(e: impl std::fmt::Display) -> (StatusCode, Json<ErrorResponse>) {
    error!(error = %e, "Store unavailable");
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(ErrorResponse {
            error: "store_unavailable".to_string(),
            message: e.to_string(),
        }),
    )
}

// ─── Recipients ────────────────────────────────────────────────────────────

/// POST /api/v1/recipients — enroll a recipient (idempotent; re-enrolling
/// resets progress to day 1).
pub async fn enroll_recipient(
    State(state): State<AppState>,
    Json(req): Json<EnrollRequest>,
) -> Result<(StatusCode, Json<Recipient>), (StatusCode, Json<ErrorResponse>)> {
    if req.recipient_id.is_empty() || req.recipient_id.len() > MAX_FIELD_LEN {
        warn!("Enrollment validation failed");
        metrics::counter!("api.validation_errors").increment(1);
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "invalid_recipient_id".to_string(),
                message: format!("'recipient_id' must be 1..={MAX_FIELD_LEN} characters"),
            }),
        ));
    }

    let recipient = state
        .registry
        .enroll(&req.recipient_id)
        .await
        .map_err(unavailable)?;
    metrics::counter!("api.recipients_enrolled").increment(1);
    Ok((StatusCode::CREATED, Json(recipient)))
}

/// GET /api/v1/recipients — all recipients with cursor and status.
pub async fn list_recipients(
    State(state): State<AppState>,
) -> Result<Json<Vec<Recipient>>, (StatusCode, Json<ErrorResponse>)> {
    state.registry.list_all().await.map(Json).map_err(unavailable)
}

// ─── Content ───────────────────────────────────────────────────────────────

/// POST /api/v1/content — author or replace the step for a day.
pub async fn upsert_content(
    State(state): State<AppState>,
    Json(req): Json<UpsertContentRequest>,
) -> Result<(StatusCode, Json<ContentStep>), (StatusCode, Json<ErrorResponse>)> {
    if req.day == 0 {
        warn!("Content validation failed: day must be positive");
        metrics::counter!("api.validation_errors").increment(1);
        return Err((
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(ErrorResponse {
                error: "invalid_day".to_string(),
                message: "'day' must be a positive integer".to_string(),
            }),
        ));
    }

    let step = state
        .content
        .upsert(req.day, req.body)
        .await
        .map_err(unavailable)?;
    metrics::counter!("api.content_saved").increment(1);
    Ok((StatusCode::CREATED, Json(step)))
}

/// GET /api/v1/content — all authored steps ordered by day.
pub async fn list_content(
    State(state): State<AppState>,
) -> Result<Json<Vec<ContentStep>>, (StatusCode, Json<ErrorResponse>)> {
    state.content.list().await.map(Json).map_err(unavailable)
}

/// GET /api/v1/content/:day — one step, 404 when unauthored.
pub async fn get_content(
    State(state): State<AppState>,
    Path(day): Path<u32>,
) -> Result<Json<ContentStep>, StatusCode> {
    match state.content.get(day).await {
        Ok(Some(step)) => Ok(Json(step)),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(_) => Err(StatusCode::SERVICE_UNAVAILABLE),
    }
}

// ─── Session / ticks ───────────────────────────────────────────────────────

/// GET /api/v1/session — delivery session status.
pub async fn session_status(State(state): State<AppState>) -> Json<SessionStatusResponse> {
    Json(SessionStatusResponse {
        state: state.session.state(),
    })
}

/// POST /api/v1/ticks/run — manual tick trigger for operators.
pub async fn run_tick_now(
    State(state): State<AppState>,
) -> Result<Json<TickOutcome>, (StatusCode, Json<ErrorResponse>)> {
    match state.engine.run_tick().await {
        Ok(outcome) => Ok(Json(outcome)),
        Err(TickError::AlreadyRunning) => Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "tick_in_flight".to_string(),
                message: "a tick is already running".to_string(),
            }),
        )),
        Err(e) => {
            error!(error = %e, "Manual tick aborted");
            Err((
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "tick_aborted".to_string(),
                    message: e.to_string(),
                }),
            ))
        }
    }
}

// ─── Operational ───────────────────────────────────────────────────────────

/// GET /health — Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — Readiness probe for Kubernetes.
pub async fn readiness(State(state): State<AppState>) -> StatusCode {
    if state.start_time.elapsed().as_secs() > 0 {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// GET /live — Liveness probe for Kubernetes.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}
