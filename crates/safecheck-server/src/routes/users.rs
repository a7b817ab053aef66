//! User, backup-contact and notification inbox routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use safecheck_core::types::{Notification, User};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, api_error, error_response};
use crate::state::AppState;

/// Create user router
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/{id}", get(get_user).put(save_user))
        .route(
            "/users/{id}/backup-contacts",
            get(list_backup_contacts).put(assign_backup_contacts),
        )
        .route("/users/{id}/notifications", get(list_notifications))
        .route("/users/{id}/notifications/unread-count", get(unread_count))
        .route("/notifications/{id}/read", post(mark_read))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignContactsRequest {
    pub contact_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct UnreadCount {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<User>, ApiError> {
    state.engine.contacts.get_user(&id).map(Json).map_err(api_error)
}

/// Create or update a user profile. Contact assignments are managed separately.
pub async fn save_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(user): Json<User>,
) -> Result<Json<User>, ApiError> {
    if user.id != id {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "User id does not match path",
        ));
    }
    state
        .engine
        .contacts
        .save_user(user)
        .map(Json)
        .map_err(api_error)
}

pub async fn list_backup_contacts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<User>>, ApiError> {
    state
        .engine
        .contacts
        .backup_contacts(&id)
        .map(Json)
        .map_err(api_error)
}

/// Replace a worker's escalation chain, in priority order.
pub async fn assign_backup_contacts(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<AssignContactsRequest>,
) -> Result<Json<User>, ApiError> {
    state
        .engine
        .contacts
        .assign_backup_contacts(&id, &req.contact_ids)
        .map(Json)
        .map_err(api_error)
}

pub async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Notification>>, ApiError> {
    state
        .engine
        .dispatcher
        .list_for_user(&id)
        .map(Json)
        .map_err(api_error)
}

pub async fn unread_count(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UnreadCount>, ApiError> {
    let count = state
        .engine
        .dispatcher
        .count_unread(&id)
        .map_err(api_error)?;
    Ok(Json(UnreadCount { count }))
}

pub async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .engine
        .dispatcher
        .mark_read(&id)
        .map_err(api_error)?;
    Ok(Json(SuccessResponse { success: true }))
}
