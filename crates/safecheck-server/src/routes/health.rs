//! Health check endpoint.

use axum::{Json, extract::State};
use safecheck_core::escalation::SchedulerStatus;
use serde::Serialize;
use std::sync::Arc;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: HealthComponents,
    pub metrics: HealthMetrics,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponents {
    pub database: bool,
    pub scheduler: SchedulerStatus,
    pub overdue_sweep: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthMetrics {
    pub pending_alerts: usize,
}

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthStatus> {
    // In-memory mode has no database to ping
    let db_healthy = state
        .database
        .as_ref()
        .map(|db| db.ping().is_ok())
        .unwrap_or(true);

    let scheduler = state.engine.escalation.status().await;
    let overdue_sweep = state.sweeper.is_running().await;

    let pending_alerts = state.engine.alerts.count_pending_alerts().unwrap_or(0);

    let status = if db_healthy && scheduler.running && overdue_sweep {
        "healthy"
    } else {
        "degraded"
    };

    Json(HealthStatus {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        components: HealthComponents {
            database: db_healthy,
            scheduler,
            overdue_sweep,
        },
        metrics: HealthMetrics { pending_alerts },
    })
}
