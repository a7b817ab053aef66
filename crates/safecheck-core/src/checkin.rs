//! CheckInTracker - scheduled welfare checks and the overdue sweep.
//!
//! A check-in starts Pending and ends exactly once, as Confirmed (the worker
//! responded) or Missed (the response window elapsed). Missing a check-in
//! raises a MissedCheckIn alert. While the shift stays Active, closing its
//! last Pending check-in schedules the next one.

use chrono::Duration;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::alert::AlertService;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::settings::SystemSettingsService;
use crate::store::{CheckInStore, ShiftStore};
use crate::types::{Alert, CheckIn, CheckInStatus};

/// A check-in that was marked Missed and the alert raised for it.
#[derive(Debug, Clone)]
pub struct MissedCheckIn {
    pub check_in: CheckIn,
    pub alert: Alert,
}

pub struct CheckInTracker {
    check_ins: Arc<dyn CheckInStore>,
    shifts: Arc<dyn ShiftStore>,
    settings: Arc<SystemSettingsService>,
    alerts: Arc<AlertService>,
    clock: Arc<dyn Clock>,
}

impl CheckInTracker {
    pub fn new(
        check_ins: Arc<dyn CheckInStore>,
        shifts: Arc<dyn ShiftStore>,
        settings: Arc<SystemSettingsService>,
        alerts: Arc<AlertService>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            check_ins,
            shifts,
            settings,
            alerts,
            clock,
        }
    }

    pub fn get(&self, id: &str) -> Result<CheckIn> {
        self.check_ins
            .get(id)?
            .ok_or_else(|| Error::not_found("CheckIn", id))
    }

    pub fn list_for_shift(&self, shift_id: &str) -> Result<Vec<CheckIn>> {
        self.check_ins.list_for_shift(shift_id)
    }

    /// Schedule the next check-in for a shift.
    ///
    /// Due one interval from now, using the shift's own interval when set and
    /// the global setting otherwise.
    pub fn schedule_check_in(&self, shift_id: &str) -> Result<CheckIn> {
        let shift = self
            .shifts
            .get(shift_id)?
            .ok_or_else(|| Error::not_found("Shift", shift_id))?;

        let interval = match shift.check_in_interval_minutes {
            Some(minutes) => minutes,
            None => self.settings.get()?.check_in_interval_minutes,
        };

        let check_in = CheckIn {
            id: uuid::Uuid::new_v4().to_string(),
            shift_id: shift.id.clone(),
            worker_id: shift.worker_id.clone(),
            scheduled_time: self.clock.now() + Duration::minutes(i64::from(interval)),
            response_time: None,
            status: CheckInStatus::Pending,
            response_seconds: None,
        };
        self.check_ins.insert(&check_in)?;

        debug!(
            check_in_id = %check_in.id,
            shift_id = %shift.id,
            scheduled_time = %check_in.scheduled_time,
            "Check-in scheduled"
        );
        Ok(check_in)
    }

    /// Pending -> Confirmed, recording how long the worker took to respond.
    ///
    /// `response_seconds` is rounded and floored at zero, so a confirmation
    /// before the scheduled time records 0.
    pub fn confirm_check_in(&self, id: &str) -> Result<CheckIn> {
        let check_in = self.get(id)?;
        let now = self.clock.now();
        let elapsed_ms = (now - check_in.scheduled_time).num_milliseconds();
        let response_seconds = ((elapsed_ms as f64) / 1000.0).round().max(0.0) as i64;

        if !self
            .check_ins
            .complete(id, CheckInStatus::Confirmed, Some(now), Some(response_seconds))?
        {
            return Err(Error::invalid_state("Check-in is not pending"));
        }

        info!(
            check_in_id = %id,
            worker_id = %check_in.worker_id,
            response_seconds = response_seconds,
            "Check-in confirmed"
        );
        self.schedule_next(&check_in.shift_id);
        self.get(id)
    }

    /// Pending -> Missed, then raise the MissedCheckIn alert.
    ///
    /// The status change is claimed first, so concurrent callers produce at
    /// most one alert.
    pub async fn mark_as_missed(&self, id: &str) -> Result<MissedCheckIn> {
        self.get(id)?;
        if !self
            .check_ins
            .complete(id, CheckInStatus::Missed, None, None)?
        {
            return Err(Error::invalid_state("Check-in is not pending"));
        }
        let check_in = self.get(id)?;

        info!(
            check_in_id = %id,
            worker_id = %check_in.worker_id,
            scheduled_time = %check_in.scheduled_time,
            "Check-in missed"
        );
        self.schedule_next(&check_in.shift_id);

        let alert = self.alerts.raise_missed_check_in(&check_in).await?;
        Ok(MissedCheckIn { check_in, alert })
    }

    /// Mark every Pending check-in older than the response timeout as Missed.
    ///
    /// Failures on one check-in are logged and do not stop the sweep. Returns
    /// the number marked.
    pub async fn process_overdue_check_ins(&self) -> Result<usize> {
        let timeout_ms = i64::from(self.settings.get()?.response_timeout_seconds) * 1000;
        let now = self.clock.now();

        let overdue: Vec<CheckIn> = self
            .check_ins
            .list_pending()?
            .into_iter()
            .filter(|c| (now - c.scheduled_time).num_milliseconds() > timeout_ms)
            .collect();

        let mut marked = 0;
        for check_in in &overdue {
            match self.mark_as_missed(&check_in.id).await {
                Ok(_) => marked += 1,
                Err(e) if e.is_invalid_state() => {
                    debug!(check_in_id = %check_in.id, "Check-in resolved before sweep reached it");
                }
                Err(e) => {
                    error!(
                        check_in_id = %check_in.id,
                        error = %e,
                        "Failed to process overdue check-in"
                    );
                }
            }
        }

        if marked > 0 {
            info!(marked = marked, "Processed overdue check-ins");
        }
        Ok(marked)
    }

    /// Keep the cycle going: schedule the next check-in if the shift is
    /// still Active and has nothing Pending.
    ///
    /// Failures are logged; the completed check-in stands either way.
    fn schedule_next(&self, shift_id: &str) {
        let result = self.shifts.get(shift_id).and_then(|shift| match shift {
            Some(shift) if shift.is_active() => {
                let pending = self
                    .check_ins
                    .list_for_shift(shift_id)?
                    .iter()
                    .any(|c| c.status == CheckInStatus::Pending);
                if pending {
                    Ok(None)
                } else {
                    self.schedule_check_in(shift_id).map(Some)
                }
            }
            _ => Ok(None),
        });

        if let Err(e) = result {
            warn!(shift_id = %shift_id, error = %e, "Failed to schedule next check-in");
        }
    }

    /// Create a check-in due now on an Active shift.
    fn instant_check_in(&self, shift_id: &str) -> Result<CheckIn> {
        let shift = self
            .shifts
            .get(shift_id)?
            .ok_or_else(|| Error::not_found("Shift", shift_id))?;
        if !shift.is_active() {
            return Err(Error::invalid_state("Shift is not active"));
        }

        let check_in = CheckIn {
            id: uuid::Uuid::new_v4().to_string(),
            shift_id: shift.id,
            worker_id: shift.worker_id,
            scheduled_time: self.clock.now(),
            response_time: None,
            status: CheckInStatus::Pending,
            response_seconds: None,
        };
        self.check_ins.insert(&check_in)?;
        Ok(check_in)
    }

    /// Record an unscheduled "I'm OK" for a shift.
    pub fn confirm_check_in_for_shift(&self, shift_id: &str) -> Result<CheckIn> {
        let check_in = self.instant_check_in(shift_id)?;
        self.confirm_check_in(&check_in.id)
    }

    /// Record an immediate missed check-in for a shift and raise its alert.
    pub async fn mark_check_in_as_missed_for_shift(&self, shift_id: &str) -> Result<MissedCheckIn> {
        let check_in = self.instant_check_in(shift_id)?;
        self.mark_as_missed(&check_in.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsUpdate;
    use crate::testing::Fixture;
    use crate::types::{AlertSeverity, AlertStatus, AlertType};

    #[tokio::test]
    async fn test_schedule_uses_shift_interval_or_global() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");
        let now = fx.clock.now();

        let first = fx.engine.check_ins.list_for_shift(&shift.id).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].scheduled_time, now + Duration::minutes(15));
        assert_eq!(first[0].status, CheckInStatus::Pending);

        fx.worker_with_contacts("w2", &["c2"]);
        let custom = fx.start_shift_with_interval("w2", 30);
        let scheduled = fx.engine.check_ins.list_for_shift(&custom.id).unwrap();
        assert_eq!(scheduled[0].scheduled_time, now + Duration::minutes(30));
    }

    #[tokio::test]
    async fn test_schedule_unknown_shift() {
        let fx = Fixture::new();
        let err = fx.engine.check_ins.schedule_check_in("nope").unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_confirm_records_response_time() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");
        let pending = fx.engine.check_ins.list_for_shift(&shift.id).unwrap()[0].clone();

        fx.clock.advance(Duration::minutes(15) + Duration::seconds(20));
        let confirmed = fx.engine.check_ins.confirm_check_in(&pending.id).unwrap();

        assert_eq!(confirmed.status, CheckInStatus::Confirmed);
        assert_eq!(confirmed.response_time, Some(fx.clock.now()));
        assert_eq!(confirmed.response_seconds, Some(20));

        let err = fx.engine.check_ins.confirm_check_in(&pending.id).unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(err.to_string(), "Check-in is not pending");
    }

    #[tokio::test]
    async fn test_mark_as_missed_raises_alert() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1", "c2"]);
        let shift = fx.start_shift("w1");

        let missed = fx
            .engine
            .check_ins
            .mark_check_in_as_missed_for_shift(&shift.id)
            .await
            .unwrap();

        assert_eq!(missed.check_in.status, CheckInStatus::Missed);
        assert_eq!(missed.alert.alert_type, AlertType::MissedCheckIn);
        assert_eq!(missed.alert.severity, AlertSeverity::High);
        assert_eq!(missed.alert.shift_id.as_deref(), Some(shift.id.as_str()));
        assert_eq!(missed.alert.backup_contact_id.as_deref(), Some("c1"));

        // A missed check-in cannot be confirmed afterwards.
        assert!(fx
            .engine
            .check_ins
            .confirm_check_in(&missed.check_in.id)
            .unwrap_err()
            .is_invalid_state());
        assert!(fx
            .engine
            .check_ins
            .mark_as_missed(&missed.check_in.id)
            .await
            .unwrap_err()
            .is_invalid_state());
        assert_eq!(fx.engine.alerts.count_pending_alerts().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_early_confirmation_records_zero() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");
        let pending = fx.engine.check_ins.list_for_shift(&shift.id).unwrap()[0].clone();

        fx.clock.advance(Duration::minutes(3));
        let confirmed = fx.engine.check_ins.confirm_check_in(&pending.id).unwrap();
        assert_eq!(confirmed.response_seconds, Some(0));
    }

    #[tokio::test]
    async fn test_instant_check_in_for_shift() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");

        let ok = fx.engine.check_ins.confirm_check_in_for_shift(&shift.id).unwrap();
        assert_eq!(ok.status, CheckInStatus::Confirmed);
        assert_eq!(ok.scheduled_time, fx.clock.now());
        assert_eq!(ok.response_seconds, Some(0));

        // The scheduled check-in is untouched.
        let check_ins = fx.engine.check_ins.list_for_shift(&shift.id).unwrap();
        assert_eq!(check_ins.len(), 2);
        assert_eq!(
            check_ins
                .iter()
                .filter(|c| c.status == CheckInStatus::Pending)
                .count(),
            1
        );

        fx.engine.shifts.end_shift(&shift.id).unwrap();
        assert!(fx
            .engine
            .check_ins
            .confirm_check_in_for_shift(&shift.id)
            .unwrap_err()
            .is_invalid_state());
        assert!(fx
            .engine
            .check_ins
            .confirm_check_in_for_shift("no-such-shift")
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_overdue_sweep_respects_timeout_boundary() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");

        // Exactly at scheduled + 60s: not yet overdue.
        fx.clock.advance(Duration::minutes(15) + Duration::seconds(60));
        assert_eq!(fx.engine.check_ins.process_overdue_check_ins().await.unwrap(), 0);

        fx.clock.advance(Duration::seconds(1));
        assert_eq!(fx.engine.check_ins.process_overdue_check_ins().await.unwrap(), 1);

        let check_ins = fx.engine.check_ins.list_for_shift(&shift.id).unwrap();
        assert_eq!(check_ins[0].status, CheckInStatus::Missed);

        // Nothing left to sweep.
        assert_eq!(fx.engine.check_ins.process_overdue_check_ins().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_overdue_sweep_uses_current_timeout() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        fx.start_shift("w1");
        fx.clock.advance(Duration::minutes(15) + Duration::seconds(90));

        fx.engine
            .settings
            .update(
                &SettingsUpdate {
                    response_timeout_seconds: Some(120),
                    ..Default::default()
                },
                Some("admin"),
            )
            .unwrap();
        assert_eq!(fx.engine.check_ins.process_overdue_check_ins().await.unwrap(), 0);

        fx.engine.settings.reset(Some("admin")).unwrap();
        assert_eq!(fx.engine.check_ins.process_overdue_check_ins().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_overdue_sweep_continues_past_failures() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w2", &["c2"]);
        fx.start_shift("w2");
        // A pending check-in whose worker no longer exists cannot raise an alert.
        fx.stores
            .check_ins
            .insert(&CheckIn {
                id: "orphan".into(),
                shift_id: "gone".into(),
                worker_id: "ghost".into(),
                scheduled_time: fx.clock.now(),
                response_time: None,
                status: CheckInStatus::Pending,
                response_seconds: None,
            })
            .unwrap();

        fx.clock.advance(Duration::minutes(20));
        assert_eq!(fx.engine.check_ins.process_overdue_check_ins().await.unwrap(), 1);

        let alerts = fx.engine.alerts.find_by_worker_id("w2").unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].status, AlertStatus::Active);
    }

    #[tokio::test]
    async fn test_confirm_schedules_next_check_in() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");
        let first = fx.engine.check_ins.list_for_shift(&shift.id).unwrap()[0].clone();

        fx.clock.advance(Duration::minutes(15));
        fx.engine.check_ins.confirm_check_in(&first.id).unwrap();

        let check_ins = fx.engine.check_ins.list_for_shift(&shift.id).unwrap();
        assert_eq!(check_ins.len(), 2);
        let next = &check_ins[1];
        assert_eq!(next.status, CheckInStatus::Pending);
        assert_eq!(next.scheduled_time, fx.clock.now() + Duration::minutes(15));

        // Nobody answers the second one.
        fx.clock.advance(Duration::minutes(40));
        assert_eq!(fx.engine.check_ins.process_overdue_check_ins().await.unwrap(), 1);
        assert_eq!(
            fx.engine.check_ins.get(&next.id).unwrap().status,
            CheckInStatus::Missed
        );

        // Missing it keeps the cycle going too.
        let check_ins = fx.engine.check_ins.list_for_shift(&shift.id).unwrap();
        assert_eq!(check_ins.len(), 3);
        assert_eq!(check_ins[2].status, CheckInStatus::Pending);
        assert_eq!(check_ins[2].scheduled_time, fx.clock.now() + Duration::minutes(15));
    }

    #[tokio::test]
    async fn test_no_next_check_in_after_shift_ends() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");
        let first = fx.engine.check_ins.list_for_shift(&shift.id).unwrap()[0].clone();

        fx.engine.shifts.end_shift(&shift.id).unwrap();
        fx.clock.advance(Duration::minutes(15));
        fx.engine.check_ins.confirm_check_in(&first.id).unwrap();

        assert_eq!(fx.engine.check_ins.list_for_shift(&shift.id).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_shortcut_keeps_single_pending_check_in() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");

        fx.engine.check_ins.confirm_check_in_for_shift(&shift.id).unwrap();
        fx.engine
            .check_ins
            .mark_check_in_as_missed_for_shift(&shift.id)
            .await
            .unwrap();

        let pending = fx
            .engine
            .check_ins
            .list_for_shift(&shift.id)
            .unwrap()
            .into_iter()
            .filter(|c| c.status == CheckInStatus::Pending)
            .count();
        assert_eq!(pending, 1);
    }

    // Worker misses a check-in: c1 is notified immediately, c2 only after the
    // escalation delay.
    #[tokio::test]
    async fn test_missed_check_in_end_to_end() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1", "c2"]);
        fx.start_shift("w1");

        fx.clock.advance(Duration::minutes(16) + Duration::seconds(1));
        assert_eq!(fx.engine.check_ins.process_overdue_check_ins().await.unwrap(), 1);
        assert_eq!(fx.notifications_for("c1").len(), 1);
        assert!(fx.notifications_for("c2").is_empty());

        fx.clock.advance(Duration::minutes(5));
        let report = fx.engine.escalation.scan_now().await;
        assert_eq!(report.escalated, 1);
        assert_eq!(fx.notifications_for("c2").len(), 1);
    }
}
