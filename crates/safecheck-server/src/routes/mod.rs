//! API route modules.

pub mod alerts;
pub mod check_ins;
pub mod health;
pub mod settings;
pub mod shifts;
pub mod users;

use axum::{Json, Router, http::StatusCode, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        .merge(settings::router())
        .merge(shifts::router())
        .merge(check_ins::router())
        .merge(alerts::router())
        .merge(users::router());

    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            success: false,
            error: message.into(),
        }),
    )
}

/// Map a core error to an HTTP status.
pub fn api_error(e: safecheck_core::Error) -> ApiError {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if e.is_invalid_state() {
        StatusCode::CONFLICT
    } else if e.is_validation() {
        StatusCode::BAD_REQUEST
    } else {
        error!(error = %e, "Request failed");
        StatusCode::INTERNAL_SERVER_ERROR
    };
    error_response(status, e.to_string())
}

#[cfg(test)]
pub(crate) mod test_support {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use safecheck_core::clock::ManualClock;
    use safecheck_core::store::Stores;
    use safecheck_core::types::{User, UserRole};
    use safecheck_core::{Engine, EngineOptions};
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::state::AppState;

    pub struct TestApp {
        pub state: Arc<AppState>,
        pub clock: Arc<ManualClock>,
        _dir: tempfile::TempDir,
    }

    impl TestApp {
        /// In-memory app with worker w1 and contacts c1, c2.
        pub fn new() -> Self {
            let dir = tempfile::tempdir().unwrap();
            let config = Config::load_from(dir.path(), |_| None).unwrap();
            let clock = Arc::new(ManualClock::default());
            let engine = Engine::new(
                Stores::in_memory(),
                EngineOptions {
                    clock: clock.clone(),
                    ..Default::default()
                },
            );

            for (id, role) in [
                ("w1", UserRole::Worker),
                ("c1", UserRole::BackupContact),
                ("c2", UserRole::BackupContact),
            ] {
                engine
                    .contacts
                    .save_user(User::new(id, role, id.to_uppercase(), "Test"))
                    .unwrap();
            }
            engine
                .contacts
                .assign_backup_contacts("w1", &["c1".into(), "c2".into()])
                .unwrap();

            Self {
                state: AppState::new(config, engine, None),
                clock,
                _dir: dir,
            }
        }

        pub async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
            let builder = Request::builder().method(method).uri(uri);
            let request = match body {
                Some(json) => builder
                    .header("content-type", "application/json")
                    .body(Body::from(json.to_string()))
                    .unwrap(),
                None => builder.body(Body::empty()).unwrap(),
            };

            let response = super::create_router(self.state.clone())
                .oneshot(request)
                .await
                .unwrap();
            let status = response.status();
            let bytes = response.into_body().collect().await.unwrap().to_bytes();
            let value = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, value)
        }
    }
}
