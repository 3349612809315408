//! HTTP handlers for the session store.
//!
//! Implements:
//! - GET /health - Health check endpoint
//! - GET /sessions/{id} - Lock and read session data
//! - PUT /sessions/{id} - Write session data and release the lock
//! - DELETE /sessions/{id} - Destroy a session
//! - POST /gc - Flag expired sessions inactive
//!
//! Each request is its own session cycle. A GET leaves the record locked until the
//! client's PUT for the same id; a concurrent GET waits for that PUT or times out.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use session_store_core::{SessionHandler, SessionStore};
use tracing::{debug, warn};

use crate::error::Result;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionStore,
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub backend: &'static str,
}

/// GC response.
#[derive(Serialize)]
pub struct GcResponse {
    pub deactivated: u64,
}

/// Build the router with all session routes.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route(
            "/sessions/{id}",
            get(read_handler).put(write_handler).delete(destroy_handler),
        )
        .route("/gc", post(gc_handler))
        .with_state(state)
}

/// GET /health - Health check endpoint.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        backend: state.sessions.backend_name(),
    })
}

/// GET /sessions/{id} - Session bytes, empty when absent or expired.
pub async fn read_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let mut cycle = state.sessions.cycle();
    let data = cycle.read(&id).await?;
    debug!("GET session {} ({} bytes)", id, data.len());

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data).into_response())
}

/// PUT /sessions/{id} - Store the request body.
pub async fn write_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<StatusCode> {
    let mut cycle = state.sessions.cycle();
    cycle.write(&id, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /sessions/{id} - Always succeeds.
pub async fn destroy_handler(State(state): State<AppState>, Path(id): Path<String>) -> StatusCode {
    let mut cycle = state.sessions.cycle();
    SessionHandler::destroy(&mut cycle, &id).await;
    StatusCode::NO_CONTENT
}

/// POST /gc - Always succeeds; a failed sweep reports nothing deactivated.
pub async fn gc_handler(State(state): State<AppState>) -> Json<GcResponse> {
    let deactivated = match state.sessions.gc().await {
        Ok(matched) => matched,
        Err(e) => {
            warn!("Session gc failed: {}", e);
            0
        }
    };
    Json(GcResponse { deactivated })
}
