//! Shift routes, including the "I'm OK" shortcut.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use safecheck_core::types::{Alert, CheckIn, NewShift, Shift};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::state::AppState;

/// Create shift router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/shifts", post(start_shift))
        .route("/shifts/{id}", get(get_shift))
        .route("/shifts/{id}/end", post(end_shift))
        .route("/shifts/{id}/cancel", post(cancel_shift))
        .route("/shifts/{id}/extend", post(extend_shift))
        .route("/shifts/{id}/check-ins", get(list_check_ins))
        .route("/shifts/{id}/check-ins/ok", post(confirm_ok))
        .route("/shifts/{id}/check-ins/missed", post(report_missed))
        .route("/workers/{worker_id}/active-shift", get(get_active_shift))
}

pub async fn start_shift(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewShift>,
) -> Result<(StatusCode, Json<Shift>), ApiError> {
    let shift = state.engine.shifts.start_shift(req).map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(shift)))
}

pub async fn get_shift(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Shift>, ApiError> {
    state.engine.shifts.get(&id).map(Json).map_err(api_error)
}

pub async fn end_shift(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Shift>, ApiError> {
    state.engine.shifts.end_shift(&id).map(Json).map_err(api_error)
}

pub async fn cancel_shift(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Shift>, ApiError> {
    state
        .engine
        .shifts
        .cancel_shift(&id)
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendShiftRequest {
    pub estimated_end_time: DateTime<Utc>,
}

pub async fn extend_shift(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ExtendShiftRequest>,
) -> Result<Json<Shift>, ApiError> {
    state
        .engine
        .shifts
        .extend_shift(&id, req.estimated_end_time)
        .map(Json)
        .map_err(api_error)
}

pub async fn list_check_ins(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<CheckIn>>, ApiError> {
    state.engine.shifts.get(&id).map_err(api_error)?;
    state
        .engine
        .check_ins
        .list_for_shift(&id)
        .map(Json)
        .map_err(api_error)
}

/// Worker taps "I'm OK"
pub async fn confirm_ok(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CheckIn>, ApiError> {
    state
        .engine
        .check_ins
        .confirm_check_in_for_shift(&id)
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissedCheckInResponse {
    pub check_in: CheckIn,
    pub alert: Alert,
}

/// Supervisor records that the worker could not be reached.
pub async fn report_missed(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<MissedCheckInResponse>, ApiError> {
    let missed = state
        .engine
        .check_ins
        .mark_check_in_as_missed_for_shift(&id)
        .await
        .map_err(api_error)?;
    Ok(Json(MissedCheckInResponse {
        check_in: missed.check_in,
        alert: missed.alert,
    }))
}

pub async fn get_active_shift(
    State(state): State<Arc<AppState>>,
    Path(worker_id): Path<String>,
) -> Result<Json<Option<Shift>>, ApiError> {
    state
        .engine
        .shifts
        .get_active_shift(&worker_id)
        .map(Json)
        .map_err(api_error)
}
