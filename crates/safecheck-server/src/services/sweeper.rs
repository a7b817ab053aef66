//! OverdueSweeper - periodic overdue check-in sweep
//!
//! Calls `CheckInTracker::process_overdue_check_ins` on a fixed interval.
//! Missed check-ins raise alerts; the escalation scheduler takes it from there.

use safecheck_core::checkin::CheckInTracker;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{error, info};

/// Handle for the running sweep task
struct SweepHandle {
    abort_handle: tokio::task::AbortHandle,
}

pub struct OverdueSweeper {
    tracker: Arc<CheckInTracker>,
    interval: Duration,
    handle: Mutex<Option<SweepHandle>>,
}

impl OverdueSweeper {
    pub fn new(tracker: Arc<CheckInTracker>, interval: Duration) -> Self {
        Self {
            tracker,
            interval,
            handle: Mutex::new(None),
        }
    }

    /// Run one sweep. Returns the number of check-ins marked missed.
    pub async fn sweep_once(&self) -> usize {
        match self.tracker.process_overdue_check_ins().await {
            Ok(count) => count,
            Err(e) => {
                error!(error = %e, "Overdue check-in sweep failed");
                0
            }
        }
    }

    /// Start sweeping. The first sweep runs immediately. No-op if running.
    pub async fn start(self: Arc<Self>) {
        let mut handle = self.handle.lock().await;
        if handle.is_some() {
            return;
        }

        info!(
            interval_secs = self.interval.as_secs(),
            "Starting overdue check-in sweep"
        );

        let sweeper = Arc::clone(&self);
        let task = tokio::spawn(async move {
            let mut ticker = interval(sweeper.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                sweeper.sweep_once().await;
            }
        });

        *handle = Some(SweepHandle {
            abort_handle: task.abort_handle(),
        });
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort_handle.abort();
            info!("Stopped overdue check-in sweep");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle.lock().await.is_some()
    }
}
