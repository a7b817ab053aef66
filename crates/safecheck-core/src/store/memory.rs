//! In-memory store implementation.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{AlertStore, CheckInStore, NotificationStore, SettingsStore, ShiftStore, UserStore};
use crate::error::{Error, Result};
use crate::settings::SystemSettings;
use crate::types::{
    Alert, AlertStatus, CheckIn, CheckInStatus, Notification, Shift, ShiftStatus, User,
};

/// Process-local store for tests and single-node deployments without a database.
///
/// Each entity map sits behind its own lock; every conditional transition runs
/// under the write lock of the map it touches.
#[derive(Default)]
pub struct InMemoryStore {
    shifts: RwLock<HashMap<String, Shift>>,
    check_ins: RwLock<HashMap<String, CheckIn>>,
    alerts: RwLock<HashMap<String, Alert>>,
    users: RwLock<HashMap<String, User>>,
    notifications: RwLock<HashMap<String, Notification>>,
    settings: RwLock<Option<SystemSettings>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ShiftStore for InMemoryStore {
    fn insert_if_no_active(&self, shift: &Shift) -> Result<()> {
        let mut shifts = self.shifts.write().map_err(|_| Error::LockPoisoned)?;
        if shifts
            .values()
            .any(|s| s.worker_id == shift.worker_id && s.is_active())
        {
            return Err(Error::invalid_state(format!(
                "Worker {} already has an active shift",
                shift.worker_id
            )));
        }
        shifts.insert(shift.id.clone(), shift.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Shift>> {
        let shifts = self.shifts.read().map_err(|_| Error::LockPoisoned)?;
        Ok(shifts.get(id).cloned())
    }

    fn find_active_for_worker(&self, worker_id: &str) -> Result<Option<Shift>> {
        let shifts = self.shifts.read().map_err(|_| Error::LockPoisoned)?;
        Ok(shifts
            .values()
            .find(|s| s.worker_id == worker_id && s.is_active())
            .cloned())
    }

    fn finish(&self, id: &str, status: ShiftStatus, end_time: DateTime<Utc>) -> Result<bool> {
        let mut shifts = self.shifts.write().map_err(|_| Error::LockPoisoned)?;
        match shifts.get_mut(id) {
            Some(shift) if shift.is_active() => {
                shift.status = status;
                shift.end_time = Some(end_time);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn set_estimated_end(&self, id: &str, estimated_end_time: DateTime<Utc>) -> Result<bool> {
        let mut shifts = self.shifts.write().map_err(|_| Error::LockPoisoned)?;
        match shifts.get_mut(id) {
            Some(shift) if shift.is_active() => {
                shift.estimated_end_time = estimated_end_time;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl CheckInStore for InMemoryStore {
    fn insert(&self, check_in: &CheckIn) -> Result<()> {
        let mut check_ins = self.check_ins.write().map_err(|_| Error::LockPoisoned)?;
        check_ins.insert(check_in.id.clone(), check_in.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<CheckIn>> {
        let check_ins = self.check_ins.read().map_err(|_| Error::LockPoisoned)?;
        Ok(check_ins.get(id).cloned())
    }

    fn list_pending(&self) -> Result<Vec<CheckIn>> {
        let check_ins = self.check_ins.read().map_err(|_| Error::LockPoisoned)?;
        let mut pending: Vec<CheckIn> = check_ins
            .values()
            .filter(|c| c.status == CheckInStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|c| c.scheduled_time);
        Ok(pending)
    }

    fn list_for_shift(&self, shift_id: &str) -> Result<Vec<CheckIn>> {
        let check_ins = self.check_ins.read().map_err(|_| Error::LockPoisoned)?;
        let mut list: Vec<CheckIn> = check_ins
            .values()
            .filter(|c| c.shift_id == shift_id)
            .cloned()
            .collect();
        list.sort_by_key(|c| c.scheduled_time);
        Ok(list)
    }

    fn complete(
        &self,
        id: &str,
        status: CheckInStatus,
        response_time: Option<DateTime<Utc>>,
        response_seconds: Option<i64>,
    ) -> Result<bool> {
        let mut check_ins = self.check_ins.write().map_err(|_| Error::LockPoisoned)?;
        match check_ins.get_mut(id) {
            Some(check_in) if check_in.status == CheckInStatus::Pending => {
                check_in.status = status;
                check_in.response_time = response_time;
                check_in.response_seconds = response_seconds;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl InMemoryStore {
    fn collect_alerts(&self, predicate: impl Fn(&Alert) -> bool) -> Result<Vec<Alert>> {
        let alerts = self.alerts.read().map_err(|_| Error::LockPoisoned)?;
        let mut list: Vec<Alert> = alerts.values().filter(|a| predicate(*a)).cloned().collect();
        list.sort_by_key(|a| a.created_at);
        Ok(list)
    }
}

impl AlertStore for InMemoryStore {
    fn insert(&self, alert: &Alert) -> Result<()> {
        let mut alerts = self.alerts.write().map_err(|_| Error::LockPoisoned)?;
        alerts.insert(alert.id.clone(), alert.clone());
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Alert>> {
        let alerts = self.alerts.read().map_err(|_| Error::LockPoisoned)?;
        Ok(alerts.get(id).cloned())
    }

    fn list_by_status(&self, status: AlertStatus) -> Result<Vec<Alert>> {
        self.collect_alerts(|a| a.status == status)
    }

    fn list_for_worker(&self, worker_id: &str) -> Result<Vec<Alert>> {
        self.collect_alerts(|a| a.worker_id == worker_id)
    }

    fn list_for_primary_contact(&self, contact_id: &str) -> Result<Vec<Alert>> {
        self.collect_alerts(|a| a.backup_contact_id.as_deref() == Some(contact_id))
    }

    fn count_by_status(&self, status: AlertStatus) -> Result<usize> {
        let alerts = self.alerts.read().map_err(|_| Error::LockPoisoned)?;
        Ok(alerts.values().filter(|a| a.status == status).count())
    }

    fn acknowledge(&self, id: &str, by: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut alerts = self.alerts.write().map_err(|_| Error::LockPoisoned)?;
        match alerts.get_mut(id) {
            Some(alert) if alert.status == AlertStatus::Active => {
                alert.status = AlertStatus::Acknowledged;
                alert.acknowledged_at = Some(at);
                alert.acknowledged_by = Some(by.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn resolve(&self, id: &str, by: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut alerts = self.alerts.write().map_err(|_| Error::LockPoisoned)?;
        match alerts.get_mut(id) {
            Some(alert) if alert.status != AlertStatus::Resolved => {
                alert.status = AlertStatus::Resolved;
                alert.resolved_at = Some(at);
                alert.resolved_by = Some(by.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn advance_escalation(&self, id: &str, new_index: usize, at: DateTime<Utc>) -> Result<bool> {
        let mut alerts = self.alerts.write().map_err(|_| Error::LockPoisoned)?;
        match alerts.get_mut(id) {
            Some(alert)
                if alert.status != AlertStatus::Resolved
                    && new_index > alert.escalated_to_index =>
            {
                alert.escalated_to_index = new_index;
                alert.last_escalated_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

impl UserStore for InMemoryStore {
    fn get(&self, id: &str) -> Result<Option<User>> {
        let users = self.users.read().map_err(|_| Error::LockPoisoned)?;
        Ok(users.get(id).cloned())
    }

    fn upsert(&self, user: &User) -> Result<()> {
        let mut users = self.users.write().map_err(|_| Error::LockPoisoned)?;
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    fn find_workers_by_backup_contact(&self, contact_id: &str) -> Result<Vec<User>> {
        let users = self.users.read().map_err(|_| Error::LockPoisoned)?;
        let mut workers: Vec<User> = users
            .values()
            .filter(|u| u.assigned_backup_contact_ids.iter().any(|id| id == contact_id))
            .cloned()
            .collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workers)
    }

    fn assign_backup_contacts(&self, worker_id: &str, contact_ids: &[String]) -> Result<()> {
        let mut users = self.users.write().map_err(|_| Error::LockPoisoned)?;
        if !users.contains_key(worker_id) {
            return Err(Error::not_found("User", worker_id));
        }
        if let Some(missing) = contact_ids.iter().find(|id| !users.contains_key(id.as_str())) {
            return Err(Error::not_found("User", missing.clone()));
        }

        let previous = users
            .get(worker_id)
            .map(|w| w.assigned_backup_contact_ids.clone())
            .unwrap_or_default();
        for old in previous.iter().filter(|id| !contact_ids.contains(id)) {
            if let Some(contact) = users.get_mut(old) {
                contact.assigned_worker_ids.retain(|w| w != worker_id);
            }
        }
        for id in contact_ids {
            if let Some(contact) = users.get_mut(id) {
                if !contact.assigned_worker_ids.iter().any(|w| w == worker_id) {
                    contact.assigned_worker_ids.push(worker_id.to_string());
                }
            }
        }
        if let Some(worker) = users.get_mut(worker_id) {
            worker.assigned_backup_contact_ids = contact_ids.to_vec();
        }
        Ok(())
    }
}

impl NotificationStore for InMemoryStore {
    fn insert(&self, notification: &Notification) -> Result<()> {
        let mut notifications = self.notifications.write().map_err(|_| Error::LockPoisoned)?;
        notifications.insert(notification.id.clone(), notification.clone());
        Ok(())
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        let notifications = self.notifications.read().map_err(|_| Error::LockPoisoned)?;
        let mut list: Vec<Notification> = notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(list)
    }

    fn mark_read(&self, id: &str) -> Result<bool> {
        let mut notifications = self.notifications.write().map_err(|_| Error::LockPoisoned)?;
        match notifications.get_mut(id) {
            Some(n) => {
                n.is_read = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn count_unread(&self, user_id: &str) -> Result<usize> {
        let notifications = self.notifications.read().map_err(|_| Error::LockPoisoned)?;
        Ok(notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.is_read)
            .count())
    }
}

impl SettingsStore for InMemoryStore {
    fn load(&self) -> Result<Option<SystemSettings>> {
        let settings = self.settings.read().map_err(|_| Error::LockPoisoned)?;
        Ok(settings.clone())
    }

    fn save(&self, settings: &SystemSettings) -> Result<()> {
        let mut current = self.settings.write().map_err(|_| Error::LockPoisoned)?;
        *current = Some(settings.clone());
        Ok(())
    }
}
