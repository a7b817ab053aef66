//! Application state.

use safecheck_core::{Database, Engine};
use std::sync::Arc;
use std::time::Instant;

use crate::config::Config;
use crate::services::OverdueSweeper;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Server configuration
    pub config: Arc<Config>,
    /// Domain services
    pub engine: Engine,
    /// SQLite handle, unset when running in memory
    pub database: Option<Arc<Database>>,
    /// Overdue check-in sweep
    pub sweeper: Arc<OverdueSweeper>,
    /// Server start time
    pub start_time: Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(config: Config, engine: Engine, database: Option<Arc<Database>>) -> Arc<Self> {
        let sweeper = Arc::new(OverdueSweeper::new(
            engine.check_ins.clone(),
            config.overdue_sweep_interval,
        ));
        Arc::new(Self {
            config: Arc::new(config),
            engine,
            database,
            sweeper,
            start_time: Instant::now(),
        })
    }
}
