//! Alert routes: emergencies, acknowledgement, resolution and escalation.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use safecheck_core::escalation::ScanReport;
use safecheck_core::types::{Alert, GeoPoint};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::state::AppState;

/// Create alert router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/alerts/active", get(list_active))
        .route("/alerts/emergency", post(trigger_emergency))
        .route("/alerts/{id}", get(get_alert))
        .route("/alerts/{id}/acknowledge", post(acknowledge))
        .route("/alerts/{id}/resolve", post(resolve))
        .route("/workers/{worker_id}/alerts", get(list_for_worker))
        .route("/contacts/{contact_id}/alerts", get(list_for_contact))
        .route("/escalation/scan", post(scan_now))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyRequest {
    pub worker_id: String,
    pub message: Option<String>,
    pub location: Option<GeoPoint>,
}

#[derive(Debug, Deserialize)]
pub struct ActorRequest {
    pub by: String,
}

pub async fn list_active(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    state
        .engine
        .alerts
        .find_active_alerts()
        .map(Json)
        .map_err(api_error)
}

pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Alert>, ApiError> {
    state.engine.alerts.get(&id).map(Json).map_err(api_error)
}

/// Worker presses the emergency button
pub async fn trigger_emergency(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmergencyRequest>,
) -> Result<(StatusCode, Json<Alert>), ApiError> {
    let alert = state
        .engine
        .alerts
        .trigger_emergency(&req.worker_id, req.message.as_deref(), req.location)
        .await
        .map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(alert)))
}

pub async fn acknowledge(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<Alert>, ApiError> {
    state
        .engine
        .alerts
        .acknowledge(&id, &req.by)
        .map(Json)
        .map_err(api_error)
}

pub async fn resolve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ActorRequest>,
) -> Result<Json<Alert>, ApiError> {
    state
        .engine
        .alerts
        .resolve(&id, &req.by)
        .map(Json)
        .map_err(api_error)
}

pub async fn list_for_worker(
    State(state): State<Arc<AppState>>,
    Path(worker_id): Path<String>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    state
        .engine
        .alerts
        .find_by_worker_id(&worker_id)
        .map(Json)
        .map_err(api_error)
}

pub async fn list_for_contact(
    State(state): State<Arc<AppState>>,
    Path(contact_id): Path<String>,
) -> Result<Json<Vec<Alert>>, ApiError> {
    state
        .engine
        .alerts
        .find_by_backup_contact_id(&contact_id)
        .map(Json)
        .map_err(api_error)
}

/// Run one escalation pass now instead of waiting for the next tick.
pub async fn scan_now(State(state): State<Arc<AppState>>) -> Json<ScanReport> {
    Json(state.engine.escalation.scan_now().await)
}
