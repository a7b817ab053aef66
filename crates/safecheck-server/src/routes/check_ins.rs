use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use safecheck_core::types::CheckIn;
use std::sync::Arc;

use super::{ApiError, api_error};
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/check-ins/{id}", get(get_check_in))
        .route("/check-ins/{id}/confirm", post(confirm_check_in))
}

pub async fn get_check_in(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CheckIn>, ApiError> {
    state.engine.check_ins.get(&id).map(Json).map_err(api_error)
}

pub async fn confirm_check_in(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CheckIn>, ApiError> {
    state
        .engine
        .check_ins
        .confirm_check_in(&id)
        .map(Json)
        .map_err(api_error)
}
