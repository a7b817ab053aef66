//! EscalationScheduler - walks unanswered alerts down the backup-contact chain
//!
//! Each scan looks at every Active alert. An alert whose last escalation is at
//! least `escalationDelayMinutes` old gets its next contact notified and the
//! escalation pointer advanced. Acknowledged and resolved alerts are never
//! touched.
//!
//! Scans are single-flight: a tick that arrives while the previous scan is
//! still running is skipped, not queued.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info};

use crate::alert::AlertService;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::notify::NotificationDispatcher;
use crate::settings::SystemSettingsService;
use crate::store::UserStore;
use crate::types::Alert;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Whether the recurring scan is armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerStatus {
    pub running: bool,
    pub poll_interval_ms: u64,
}

/// Tally of one scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Another scan held the guard, so nothing was examined.
    pub skipped: bool,
    pub scanned: usize,
    pub escalated: usize,
    pub not_due: usize,
    pub exhausted: usize,
    /// Contact was notified but the alert was resolved before the pointer moved.
    pub superseded: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Escalated(usize),
    NotDue,
    Exhausted,
    Superseded,
    Undelivered,
}

struct ScanHandle {
    abort_handle: tokio::task::AbortHandle,
}

pub struct EscalationScheduler {
    alerts: Arc<AlertService>,
    users: Arc<dyn UserStore>,
    settings: Arc<SystemSettingsService>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    /// Held for the duration of a scan.
    scan_lock: Mutex<()>,
    /// Lock for start/stop
    operation_lock: Mutex<()>,
    handle: Mutex<Option<ScanHandle>>,
}

impl EscalationScheduler {
    pub fn new(
        alerts: Arc<AlertService>,
        users: Arc<dyn UserStore>,
        settings: Arc<SystemSettingsService>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            alerts,
            users,
            settings,
            dispatcher,
            clock,
            poll_interval,
            scan_lock: Mutex::new(()),
            operation_lock: Mutex::new(()),
            handle: Mutex::new(None),
        }
    }

    /// Arm the recurring scan and run one scan immediately.
    ///
    /// Calling `start` on a running scheduler does nothing.
    pub async fn start(self: &Arc<Self>) {
        {
            let _lock = self.operation_lock.lock().await;
            let mut handle = self.handle.lock().await;
            if handle.is_some() {
                debug!("Escalation scheduler already running");
                return;
            }

            let scheduler = Arc::clone(self);
            let period = self.poll_interval;
            let task = tokio::spawn(async move {
                let mut ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    scheduler.scan_now().await;
                }
            });
            *handle = Some(ScanHandle {
                abort_handle: task.abort_handle(),
            });

            info!(
                poll_interval_ms = self.poll_interval_ms(),
                "Escalation scheduler started"
            );
        }

        self.scan_now().await;
    }

    /// Disarm the recurring scan. A scan already in progress finishes.
    pub async fn stop(&self) {
        let _lock = self.operation_lock.lock().await;
        if let Some(handle) = self.handle.lock().await.take() {
            handle.abort_handle.abort();
            info!("Escalation scheduler stopped");
        }
    }

    pub async fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.handle.lock().await.is_some(),
            poll_interval_ms: self.poll_interval_ms(),
        }
    }

    fn poll_interval_ms(&self) -> u64 {
        u64::try_from(self.poll_interval.as_millis()).unwrap_or(u64::MAX)
    }

    /// Run one scan over all Active alerts.
    ///
    /// Returns a report with `skipped` set when another scan is in progress.
    /// Errors on one alert are logged and counted; the scan moves on.
    pub async fn scan_now(&self) -> ScanReport {
        let mut report = ScanReport::default();

        let Ok(_guard) = self.scan_lock.try_lock() else {
            debug!("Previous escalation scan still running, skipping tick");
            report.skipped = true;
            return report;
        };

        let delay_minutes = match self.settings.get() {
            Ok(settings) => settings.escalation_delay_minutes,
            Err(e) => {
                error!(error = %e, "Failed to read settings for escalation scan");
                return report;
            }
        };

        let active = match self.alerts.find_active_alerts() {
            Ok(alerts) => alerts,
            Err(e) => {
                error!(error = %e, "Failed to list active alerts");
                return report;
            }
        };

        for alert in &active {
            report.scanned += 1;
            match self.process_alert(alert, delay_minutes).await {
                Ok(Outcome::Escalated(index)) => {
                    report.escalated += 1;
                    info!(alert_id = %alert.id, index = index, "Alert escalated");
                }
                Ok(Outcome::NotDue) => report.not_due += 1,
                Ok(Outcome::Exhausted) => report.exhausted += 1,
                Ok(Outcome::Superseded) => report.superseded += 1,
                Ok(Outcome::Undelivered) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(alert_id = %alert.id, error = %e, "Escalation failed for alert");
                }
            }
        }

        if report.escalated > 0 || report.failed > 0 {
            info!(
                scanned = report.scanned,
                escalated = report.escalated,
                exhausted = report.exhausted,
                failed = report.failed,
                "Escalation scan complete"
            );
        }
        report
    }

    async fn process_alert(&self, alert: &Alert, delay_minutes: u32) -> Result<Outcome> {
        let Some(last) = alert.last_escalated_at else {
            return Ok(Outcome::NotDue);
        };
        let elapsed_ms = (self.clock.now() - last).num_milliseconds();
        if elapsed_ms < i64::from(delay_minutes) * 60_000 {
            return Ok(Outcome::NotDue);
        }

        // The alert may have been acknowledged since the scan listed it.
        let current = self.alerts.get(&alert.id)?;
        if !current.is_active() {
            return Ok(Outcome::NotDue);
        }

        let worker = self
            .users
            .get(&current.worker_id)?
            .ok_or_else(|| Error::not_found("User", &current.worker_id))?;

        let next = current.escalated_to_index + 1;
        if next >= worker.assigned_backup_contact_ids.len() {
            info!(
                alert_id = %current.id,
                chain_len = worker.assigned_backup_contact_ids.len(),
                "Escalation chain exhausted"
            );
            return Ok(Outcome::Exhausted);
        }

        let worker_name = worker.full_name();
        if !self
            .dispatcher
            .notify_contact_at_index(&current, &worker, &worker_name, next)
            .await?
        {
            return Ok(Outcome::Undelivered);
        }

        if !self.alerts.advance_escalation(&current.id, next)? {
            debug!(alert_id = %current.id, index = next, "Alert changed during dispatch");
            return Ok(Outcome::Superseded);
        }
        Ok(Outcome::Escalated(next))
    }
}
