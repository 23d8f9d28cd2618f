use axum::{extract::State, http::StatusCode, Json};
use perp_scalper_core::PositionState;
use perp_scalper_engine::StateStore;
use serde::Serialize;
use std::sync::Arc;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

#[derive(Serialize)]
pub struct PauseResponse {
    pub paused: bool,
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

/// Returns the persisted position record as-is. Read-only: the control
/// loop is the only writer of position fields.
///
/// # Errors
/// Returns `StatusCode::INTERNAL_SERVER_ERROR` if the record cannot be read.
pub async fn get_state(
    State(store): State<Arc<StateStore>>,
) -> Result<Json<PositionState>, StatusCode> {
    let state = store.load().map_err(|e| {
        tracing::error!(error = %e, "state read failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(state))
}

/// Pauses trading. The control loop keeps reconciling but places no new
/// orders until resumed.
///
/// # Errors
/// Returns `StatusCode::INTERNAL_SERVER_ERROR` if the flag cannot be
/// persisted.
pub async fn pause(
    State(store): State<Arc<StateStore>>,
) -> Result<Json<PauseResponse>, StatusCode> {
    set_paused(&store, true)
}

/// Resumes trading.
///
/// # Errors
/// Returns `StatusCode::INTERNAL_SERVER_ERROR` if the flag cannot be
/// persisted.
pub async fn resume(
    State(store): State<Arc<StateStore>>,
) -> Result<Json<PauseResponse>, StatusCode> {
    set_paused(&store, false)
}

fn set_paused(store: &StateStore, paused: bool) -> Result<Json<PauseResponse>, StatusCode> {
    let state = store.set_paused(paused).map_err(|e| {
        tracing::error!(error = %e, paused, "pause update failed");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;
    Ok(Json(PauseResponse {
        paused: state.paused,
    }))
}
