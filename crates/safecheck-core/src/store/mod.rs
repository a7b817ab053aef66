//! Persistence traits, one per entity.
//!
//! Implementations handle the actual storage backend ([`InMemoryStore`], or the
//! SQLite [`Database`](crate::db::Database) with the `db` feature).
//!
//! Every lifecycle transition is a conditional write: the store checks the
//! current status and applies the change under a single lock or statement, and
//! reports whether the write happened. Services turn a `false` into the right
//! domain error.

mod memory;

pub use memory::InMemoryStore;

use crate::error::Result;
use crate::settings::SystemSettings;
use crate::types::{
    Alert, AlertStatus, CheckIn, CheckInStatus, Notification, Shift, ShiftStatus, User,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub trait ShiftStore: Send + Sync {
    /// Insert a shift unless the worker already has an Active one.
    ///
    /// The check and the insert are atomic. Fails with `InvalidState` on conflict.
    fn insert_if_no_active(&self, shift: &Shift) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Shift>>;

    fn find_active_for_worker(&self, worker_id: &str) -> Result<Option<Shift>>;

    /// Move an Active shift to `status`. Returns false if the shift was not Active.
    fn finish(&self, id: &str, status: ShiftStatus, end_time: DateTime<Utc>) -> Result<bool>;

    /// Change the estimated end of an Active shift.
    fn set_estimated_end(&self, id: &str, estimated_end_time: DateTime<Utc>) -> Result<bool>;
}

pub trait CheckInStore: Send + Sync {
    fn insert(&self, check_in: &CheckIn) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<CheckIn>>;

    /// All Pending check-ins, oldest scheduled first.
    fn list_pending(&self) -> Result<Vec<CheckIn>>;

    fn list_for_shift(&self, shift_id: &str) -> Result<Vec<CheckIn>>;

    /// Move a Pending check-in to a terminal status. Returns false if it was not Pending.
    fn complete(
        &self,
        id: &str,
        status: CheckInStatus,
        response_time: Option<DateTime<Utc>>,
        response_seconds: Option<i64>,
    ) -> Result<bool>;
}

pub trait AlertStore: Send + Sync {
    fn insert(&self, alert: &Alert) -> Result<()>;

    fn get(&self, id: &str) -> Result<Option<Alert>>;

    /// Alerts in `status`, oldest first.
    fn list_by_status(&self, status: AlertStatus) -> Result<Vec<Alert>>;

    fn list_for_worker(&self, worker_id: &str) -> Result<Vec<Alert>>;

    /// Alerts whose primary `backup_contact_id` field equals `contact_id`.
    fn list_for_primary_contact(&self, contact_id: &str) -> Result<Vec<Alert>>;

    fn count_by_status(&self, status: AlertStatus) -> Result<usize>;

    /// Active -> Acknowledged. Returns false if the alert was not Active.
    fn acknowledge(&self, id: &str, by: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Active|Acknowledged -> Resolved. Returns false if already Resolved.
    fn resolve(&self, id: &str, by: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Record that contact `new_index` was notified at `at`.
    ///
    /// No-op (returns false) when the alert is Resolved or `new_index` does not
    /// move the pointer forward, which keeps the index monotonic.
    fn advance_escalation(&self, id: &str, new_index: usize, at: DateTime<Utc>) -> Result<bool>;
}

pub trait UserStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<User>>;

    /// Insert or replace a user.
    fn upsert(&self, user: &User) -> Result<()>;

    /// Workers whose escalation chain contains `contact_id`.
    fn find_workers_by_backup_contact(&self, contact_id: &str) -> Result<Vec<User>>;

    /// Replace a worker's ordered chain and keep the contacts' inverse lists in step.
    fn assign_backup_contacts(&self, worker_id: &str, contact_ids: &[String]) -> Result<()>;
}

pub trait NotificationStore: Send + Sync {
    fn insert(&self, notification: &Notification) -> Result<()>;

    /// Notifications for a user, newest first.
    fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>>;

    fn mark_read(&self, id: &str) -> Result<bool>;

    fn count_unread(&self, user_id: &str) -> Result<usize>;
}

pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Option<SystemSettings>>;

    fn save(&self, settings: &SystemSettings) -> Result<()>;
}

/// Handles to every entity store, as shared trait objects.
#[derive(Clone)]
pub struct Stores {
    pub shifts: Arc<dyn ShiftStore>,
    pub check_ins: Arc<dyn CheckInStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub users: Arc<dyn UserStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub settings: Arc<dyn SettingsStore>,
}

impl Stores {
    /// Back every store with one in-memory store.
    pub fn in_memory() -> Self {
        Self::from_backend(Arc::new(InMemoryStore::new()))
    }

    /// Back every store with the same backend value.
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: ShiftStore
            + CheckInStore
            + AlertStore
            + UserStore
            + NotificationStore
            + SettingsStore
            + 'static,
    {
        Self {
            shifts: backend.clone(),
            check_ins: backend.clone(),
            alerts: backend.clone(),
            users: backend.clone(),
            notifications: backend.clone(),
            settings: backend,
        }
    }
}
