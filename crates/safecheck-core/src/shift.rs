//! Shift lifecycle
//!
//! A worker has at most one Active shift. Starting a shift schedules its first
//! check-in; ending or cancelling it is terminal.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::checkin::CheckInTracker;
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::settings::CHECK_IN_INTERVAL_RANGE;
use crate::store::{ShiftStore, UserStore};
use crate::types::{NewShift, Shift, ShiftStatus};

pub struct ShiftService {
    shifts: Arc<dyn ShiftStore>,
    users: Arc<dyn UserStore>,
    tracker: Arc<CheckInTracker>,
    clock: Arc<dyn Clock>,
}

impl ShiftService {
    pub fn new(
        shifts: Arc<dyn ShiftStore>,
        users: Arc<dyn UserStore>,
        tracker: Arc<CheckInTracker>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            shifts,
            users,
            tracker,
            clock,
        }
    }

    pub fn get(&self, id: &str) -> Result<Shift> {
        self.shifts
            .get(id)?
            .ok_or_else(|| Error::not_found("Shift", id))
    }

    pub fn get_active_shift(&self, worker_id: &str) -> Result<Option<Shift>> {
        self.shifts.find_active_for_worker(worker_id)
    }

    /// Start a shift and schedule its first check-in.
    ///
    /// Fails with `InvalidState` if the worker already has an Active shift.
    pub fn start_shift(&self, input: NewShift) -> Result<Shift> {
        if let Some(minutes) = input.check_in_interval_minutes {
            if !CHECK_IN_INTERVAL_RANGE.contains(&minutes) {
                return Err(Error::validation(
                    "checkInIntervalMinutes",
                    format!(
                        "must be between {} and {}",
                        CHECK_IN_INTERVAL_RANGE.start(),
                        CHECK_IN_INTERVAL_RANGE.end()
                    ),
                ));
            }
        }
        if input.location_id.trim().is_empty() {
            return Err(Error::validation("locationId", "must not be empty"));
        }

        let now = self.clock.now();
        if input.estimated_end_time <= now {
            return Err(Error::validation(
                "estimatedEndTime",
                "must be after the shift start",
            ));
        }

        self.users
            .get(&input.worker_id)?
            .ok_or_else(|| Error::not_found("User", &input.worker_id))?;

        let shift = Shift {
            id: uuid::Uuid::new_v4().to_string(),
            worker_id: input.worker_id,
            location_id: input.location_id,
            status: ShiftStatus::Active,
            start_time: now,
            end_time: None,
            estimated_end_time: input.estimated_end_time,
            check_in_interval_minutes: input.check_in_interval_minutes,
        };
        self.shifts.insert_if_no_active(&shift)?;

        info!(
            shift_id = %shift.id,
            worker_id = %shift.worker_id,
            location_id = %shift.location_id,
            "Shift started"
        );

        self.tracker.schedule_check_in(&shift.id)?;
        Ok(shift)
    }

    /// Active -> Completed. Pending check-ins are left as they are.
    pub fn end_shift(&self, id: &str) -> Result<Shift> {
        self.finish(id, ShiftStatus::Completed)
    }

    /// Active -> Cancelled.
    pub fn cancel_shift(&self, id: &str) -> Result<Shift> {
        self.finish(id, ShiftStatus::Cancelled)
    }

    fn finish(&self, id: &str, status: ShiftStatus) -> Result<Shift> {
        self.get(id)?;
        if !self.shifts.finish(id, status, self.clock.now())? {
            return Err(Error::invalid_state("Shift is not active"));
        }
        info!(shift_id = %id, status = %status, "Shift finished");
        self.get(id)
    }

    /// Move the estimated end of an Active shift.
    pub fn extend_shift(&self, id: &str, estimated_end_time: DateTime<Utc>) -> Result<Shift> {
        let shift = self.get(id)?;
        if !shift.is_active() {
            return Err(Error::invalid_state("Shift is not active"));
        }
        if estimated_end_time <= shift.start_time {
            return Err(Error::validation(
                "estimatedEndTime",
                "must be after the shift start",
            ));
        }
        if !self.shifts.set_estimated_end(id, estimated_end_time)? {
            return Err(Error::invalid_state("Shift is not active"));
        }
        info!(shift_id = %id, estimated_end_time = %estimated_end_time, "Shift extended");
        self.get(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use crate::types::CheckInStatus;
    use chrono::Duration;

    fn new_shift(fx: &Fixture, worker_id: &str) -> NewShift {
        NewShift {
            worker_id: worker_id.to_string(),
            location_id: "site-1".to_string(),
            estimated_end_time: fx.clock.now() + Duration::hours(8),
            check_in_interval_minutes: None,
        }
    }

    #[tokio::test]
    async fn test_start_shift_schedules_first_check_in() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);

        let shift = fx.engine.shifts.start_shift(new_shift(&fx, "w1")).unwrap();
        assert!(shift.is_active());
        assert_eq!(shift.start_time, fx.clock.now());

        let check_ins = fx.engine.check_ins.list_for_shift(&shift.id).unwrap();
        assert_eq!(check_ins.len(), 1);
        assert_eq!(check_ins[0].status, CheckInStatus::Pending);

        let active = fx.engine.shifts.get_active_shift("w1").unwrap().unwrap();
        assert_eq!(active.id, shift.id);
    }

    #[tokio::test]
    async fn test_second_active_shift_rejected() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        fx.engine.shifts.start_shift(new_shift(&fx, "w1")).unwrap();

        let err = fx.engine.shifts.start_shift(new_shift(&fx, "w1")).unwrap_err();
        assert!(err.is_invalid_state());
    }

    #[tokio::test]
    async fn test_concurrent_starts_allow_one_active_shift() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);

        let results: Vec<_> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let input = new_shift(&fx, "w1");
                    let shifts = &fx.engine.shifts;
                    scope.spawn(move || shifts.start_shift(input))
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| e.is_invalid_state()));
    }

    #[tokio::test]
    async fn test_start_shift_validation() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);

        let mut input = new_shift(&fx, "w1");
        input.check_in_interval_minutes = Some(0);
        assert!(fx.engine.shifts.start_shift(input).unwrap_err().is_validation());

        let mut input = new_shift(&fx, "w1");
        input.estimated_end_time = fx.clock.now();
        assert!(fx.engine.shifts.start_shift(input).unwrap_err().is_validation());

        let input = new_shift(&fx, "nobody");
        assert!(fx.engine.shifts.start_shift(input).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_end_shift_keeps_pending_check_ins() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.engine.shifts.start_shift(new_shift(&fx, "w1")).unwrap();

        fx.clock.advance(Duration::hours(1));
        let ended = fx.engine.shifts.end_shift(&shift.id).unwrap();
        assert_eq!(ended.status, ShiftStatus::Completed);
        assert_eq!(ended.end_time, Some(fx.clock.now()));
        assert!(fx.engine.shifts.get_active_shift("w1").unwrap().is_none());

        let check_ins = fx.engine.check_ins.list_for_shift(&shift.id).unwrap();
        assert_eq!(check_ins[0].status, CheckInStatus::Pending);

        assert!(fx.engine.shifts.end_shift(&shift.id).unwrap_err().is_invalid_state());
        assert!(fx.engine.shifts.cancel_shift(&shift.id).unwrap_err().is_invalid_state());

        // A new shift can start once the previous one ended.
        fx.engine.shifts.start_shift(new_shift(&fx, "w1")).unwrap();
    }

    #[tokio::test]
    async fn test_extend_shift() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.engine.shifts.start_shift(new_shift(&fx, "w1")).unwrap();

        let later = shift.estimated_end_time + Duration::hours(2);
        let extended = fx.engine.shifts.extend_shift(&shift.id, later).unwrap();
        assert_eq!(extended.estimated_end_time, later);

        assert!(fx
            .engine
            .shifts
            .extend_shift(&shift.id, shift.start_time)
            .unwrap_err()
            .is_validation());

        fx.engine.shifts.cancel_shift(&shift.id).unwrap();
        assert!(fx
            .engine
            .shifts
            .extend_shift(&shift.id, later)
            .unwrap_err()
            .is_invalid_state());
    }
}
