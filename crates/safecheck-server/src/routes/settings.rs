//! System settings routes.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use safecheck_core::settings::{SettingsUpdate, SystemSettings};
use serde::Deserialize;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::state::AppState;

/// Create settings router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/settings", get(get_settings).patch(update_settings))
        .route("/settings/reset", post(reset_settings))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    #[serde(flatten)]
    pub update: SettingsUpdate,
    pub updated_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetSettingsRequest {
    pub reset_by: Option<String>,
}

pub async fn get_settings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SystemSettings>, ApiError> {
    state.engine.settings.get().map(Json).map_err(api_error)
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<SystemSettings>, ApiError> {
    state
        .engine
        .settings
        .update(&req.update, req.updated_by.as_deref())
        .map(Json)
        .map_err(api_error)
}

pub async fn reset_settings(
    State(state): State<Arc<AppState>>,
    req: Option<Json<ResetSettingsRequest>>,
) -> Result<Json<SystemSettings>, ApiError> {
    let reset_by = req.and_then(|Json(r)| r.reset_by);
    state
        .engine
        .settings
        .reset(reset_by.as_deref())
        .map(Json)
        .map_err(api_error)
}
