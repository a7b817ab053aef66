//! AlertService - alert creation and the Active/Acknowledged/Resolved state machine.
//!
//! ```text
//! Active ──acknowledge──► Acknowledged ──resolve──► Resolved
//!   │                                                  ▲
//!   └──────────────────────resolve─────────────────────┘
//! ```
//!
//! Creating an alert notifies only the first backup contact. The escalation
//! scheduler walks the rest of the chain over time.

use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::notify::{NotificationDispatcher, alert_action_url};
use crate::store::{AlertStore, ShiftStore, UserStore};
use crate::types::{
    Alert, AlertSeverity, AlertStatus, AlertType, CheckIn, GeoPoint, NewAlert, NotificationType,
    User,
};

pub struct AlertService {
    alerts: Arc<dyn AlertStore>,
    users: Arc<dyn UserStore>,
    shifts: Arc<dyn ShiftStore>,
    dispatcher: Arc<NotificationDispatcher>,
    clock: Arc<dyn Clock>,
}

impl AlertService {
    pub fn new(
        alerts: Arc<dyn AlertStore>,
        users: Arc<dyn UserStore>,
        shifts: Arc<dyn ShiftStore>,
        dispatcher: Arc<NotificationDispatcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            alerts,
            users,
            shifts,
            dispatcher,
            clock,
        }
    }

    fn require_user(&self, id: &str) -> Result<User> {
        self.users.get(id)?.ok_or_else(|| Error::not_found("User", id))
    }

    /// Get an alert by ID
    pub fn get(&self, id: &str) -> Result<Alert> {
        self.alerts.get(id)?.ok_or_else(|| Error::not_found("Alert", id))
    }

    /// Raise a new alert and notify the first backup contact.
    ///
    /// The alert is persisted before any notification goes out; fan-out
    /// failures are logged and do not undo the alert.
    pub async fn create(&self, new_alert: NewAlert) -> Result<Alert> {
        let worker = self.require_user(&new_alert.worker_id)?;
        if let Some(contact_id) = new_alert.backup_contact_id.as_deref() {
            self.require_user(contact_id)?;
        }

        let now = self.clock.now();
        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            shift_id: new_alert.shift_id,
            worker_id: new_alert.worker_id,
            backup_contact_id: new_alert.backup_contact_id,
            alert_type: new_alert.alert_type,
            severity: new_alert.severity,
            status: AlertStatus::Active,
            message: new_alert.message,
            created_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            escalated_to_index: 0,
            // The escalation clock starts with the initial fan-out.
            last_escalated_at: Some(now),
        };
        self.alerts.insert(&alert)?;

        info!(
            alert_id = %alert.id,
            worker_id = %alert.worker_id,
            alert_type = %alert.alert_type,
            severity = %alert.severity,
            "Alert raised"
        );

        let worker_name = worker.full_name();
        match self
            .dispatcher
            .notify_contact_at_index(&alert, &worker, &worker_name, 0)
            .await
        {
            Ok(true) => {}
            Ok(false) => warn!(
                alert_id = %alert.id,
                worker_id = %worker.id,
                "No backup contact could be notified for new alert"
            ),
            Err(e) => error!(
                alert_id = %alert.id,
                error = %e,
                "Initial alert notification failed"
            ),
        }

        Ok(alert)
    }

    /// Raise the alert for a check-in that was marked missed.
    pub async fn raise_missed_check_in(&self, check_in: &CheckIn) -> Result<Alert> {
        let worker = self.require_user(&check_in.worker_id)?;
        let message = format!(
            "{} missed a scheduled check-in at {}",
            worker.full_name(),
            check_in.scheduled_time.format("%Y-%m-%d %H:%M UTC")
        );

        self.create(NewAlert {
            shift_id: Some(check_in.shift_id.clone()),
            worker_id: worker.id.clone(),
            backup_contact_id: worker.assigned_backup_contact_ids.first().cloned(),
            alert_type: AlertType::MissedCheckIn,
            severity: AlertSeverity::High,
            message,
        })
        .await
    }

    /// Raise a critical emergency alert for a worker.
    ///
    /// Tied to the worker's active shift when there is one. The location, if
    /// given, is validated before anything is written.
    pub async fn trigger_emergency(
        &self,
        worker_id: &str,
        message: Option<&str>,
        location: Option<GeoPoint>,
    ) -> Result<Alert> {
        if let Some(point) = location {
            validate_location(&point)?;
        }
        let worker = self.require_user(worker_id)?;
        let shift = self.shifts.find_active_for_worker(worker_id)?;

        let mut text = message
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("{} needs immediate assistance", worker.full_name()));
        if let Some(point) = location {
            text.push_str(&format!(
                " Location: {:.5}, {:.5}",
                point.latitude, point.longitude
            ));
        }

        self.create(NewAlert {
            shift_id: shift.map(|s| s.id),
            worker_id: worker.id.clone(),
            backup_contact_id: worker.assigned_backup_contact_ids.first().cloned(),
            alert_type: AlertType::Emergency,
            severity: AlertSeverity::Critical,
            message: text,
        })
        .await
    }

    /// Active -> Acknowledged.
    ///
    /// Tells the worker, and every other contact in the chain so they stop
    /// trying independently.
    pub fn acknowledge(&self, id: &str, by: &str) -> Result<Alert> {
        self.get(id)?;
        if !self.alerts.acknowledge(id, by, self.clock.now())? {
            return Err(Error::invalid_state("Alert is not active"));
        }
        let alert = self.get(id)?;
        info!(alert_id = %id, acknowledged_by = %by, "Alert acknowledged");

        let actor = self.display_name(by);
        let worker = self.users.get(&alert.worker_id)?;
        let worker_name = worker
            .as_ref()
            .map(User::full_name)
            .unwrap_or_else(|| alert.worker_id.clone());

        if alert.worker_id != by {
            self.fan_out(
                &alert,
                &alert.worker_id,
                NotificationType::AlertAcknowledged,
                "Alert Acknowledged",
                &format!("{} acknowledged your alert", actor),
            );
        }
        if let Some(worker) = &worker {
            for contact_id in worker.assigned_backup_contact_ids.iter().filter(|c| *c != by) {
                self.fan_out(
                    &alert,
                    contact_id,
                    NotificationType::AlertAcknowledged,
                    "Alert Handled",
                    &format!("{} acknowledged the alert for {}", actor, worker_name),
                );
            }
        }

        Ok(alert)
    }

    /// Active|Acknowledged -> Resolved. Resolved alerts never change again.
    pub fn resolve(&self, id: &str, by: &str) -> Result<Alert> {
        self.get(id)?;
        if !self.alerts.resolve(id, by, self.clock.now())? {
            return Err(Error::invalid_state("Alert is already resolved"));
        }
        let alert = self.get(id)?;
        info!(alert_id = %id, resolved_by = %by, "Alert resolved");

        let actor = self.display_name(by);
        let worker = self.users.get(&alert.worker_id)?;
        let worker_name = worker
            .as_ref()
            .map(User::full_name)
            .unwrap_or_else(|| alert.worker_id.clone());

        self.fan_out(
            &alert,
            &alert.worker_id,
            NotificationType::AlertResolved,
            "Alert Resolved",
            &format!("Your alert was resolved by {}", actor),
        );
        if let Some(worker) = &worker {
            for contact_id in &worker.assigned_backup_contact_ids {
                self.fan_out(
                    &alert,
                    contact_id,
                    NotificationType::AlertResolved,
                    "Alert Resolved",
                    &format!("The alert for {} was resolved by {}", worker_name, actor),
                );
            }
        }

        Ok(alert)
    }

    /// Record that the scheduler notified contact `new_index`.
    pub fn advance_escalation(&self, id: &str, new_index: usize) -> Result<bool> {
        let advanced = self
            .alerts
            .advance_escalation(id, new_index, self.clock.now())?;
        if !advanced {
            debug!(alert_id = %id, new_index = new_index, "Escalation pointer not advanced");
        }
        Ok(advanced)
    }

    /// Alerts still waiting for someone to respond. Acknowledged alerts are excluded.
    pub fn find_active_alerts(&self) -> Result<Vec<Alert>> {
        self.alerts.list_by_status(AlertStatus::Active)
    }

    pub fn find_by_worker_id(&self, worker_id: &str) -> Result<Vec<Alert>> {
        self.alerts.list_for_worker(worker_id)
    }

    /// Alerts a contact is responsible for, via the primary field or anywhere in a worker's chain.
    pub fn find_by_backup_contact_id(&self, contact_id: &str) -> Result<Vec<Alert>> {
        let mut seen = HashSet::new();
        let mut alerts = Vec::new();

        let direct = self.alerts.list_for_primary_contact(contact_id)?;
        let mut via_chain = Vec::new();
        for worker in self.users.find_workers_by_backup_contact(contact_id)? {
            via_chain.extend(self.alerts.list_for_worker(&worker.id)?);
        }

        for alert in direct.into_iter().chain(via_chain) {
            if seen.insert(alert.id.clone()) {
                alerts.push(alert);
            }
        }
        alerts.sort_by_key(|a| a.created_at);
        Ok(alerts)
    }

    /// Number of alerts still Active.
    pub fn count_pending_alerts(&self) -> Result<usize> {
        self.alerts.count_by_status(AlertStatus::Active)
    }

    fn display_name(&self, user_id: &str) -> String {
        match self.users.get(user_id) {
            Ok(Some(user)) => user.full_name(),
            _ => user_id.to_string(),
        }
    }

    fn fan_out(
        &self,
        alert: &Alert,
        user_id: &str,
        notification_type: NotificationType,
        title: &str,
        message: &str,
    ) {
        if let Err(e) = self.dispatcher.notify_user(
            user_id,
            notification_type,
            title,
            message,
            Some(alert_action_url(&alert.id)),
        ) {
            error!(
                alert_id = %alert.id,
                user_id = %user_id,
                error = %e,
                "Failed to write alert notification"
            );
        }
    }
}

fn validate_location(point: &GeoPoint) -> Result<()> {
    if !point.latitude.is_finite() || !(-90.0..=90.0).contains(&point.latitude) {
        return Err(Error::validation("latitude", "must be between -90 and 90"));
    }
    if !point.longitude.is_finite() || !(-180.0..=180.0).contains(&point.longitude) {
        return Err(Error::validation("longitude", "must be between -180 and 180"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[tokio::test]
    async fn test_create_notifies_first_contact_only() {
        let fx = Fixture::new();
        let worker = fx.worker_with_contacts("w1", &["c1", "c2"]);

        let alert = fx
            .engine
            .alerts
            .create(NewAlert {
                shift_id: None,
                worker_id: worker.id.clone(),
                backup_contact_id: None,
                alert_type: AlertType::MissedCheckIn,
                severity: AlertSeverity::High,
                message: "missed".into(),
            })
            .await
            .unwrap();

        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.escalated_to_index, 0);
        assert_eq!(alert.last_escalated_at, Some(fx.clock.now()));
        assert_eq!(fx.notifications_for("c1").len(), 1);
        assert!(fx.notifications_for("c2").is_empty());
        assert_eq!(fx.sms.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_create_validates_worker_and_contact() {
        let fx = Fixture::new();
        let err = fx
            .engine
            .alerts
            .create(NewAlert {
                shift_id: None,
                worker_id: "ghost".into(),
                backup_contact_id: None,
                alert_type: AlertType::SystemAlert,
                severity: AlertSeverity::Low,
                message: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        fx.worker_with_contacts("w1", &["c1"]);
        let err = fx
            .engine
            .alerts
            .create(NewAlert {
                shift_id: None,
                worker_id: "w1".into(),
                backup_contact_id: Some("ghost".into()),
                alert_type: AlertType::SystemAlert,
                severity: AlertSeverity::Low,
                message: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(fx.engine.alerts.count_pending_alerts().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_acknowledge_twice_fails() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1", "c2"]);
        let alert = fx.raise_missed_alert("w1").await;

        let acked = fx.engine.alerts.acknowledge(&alert.id, "c1").unwrap();
        assert_eq!(acked.status, AlertStatus::Acknowledged);
        assert_eq!(acked.acknowledged_by.as_deref(), Some("c1"));

        let err = fx.engine.alerts.acknowledge(&alert.id, "c2").unwrap_err();
        assert!(err.is_invalid_state());
        assert_eq!(err.to_string(), "Alert is not active");

        let stored = fx.engine.alerts.get(&alert.id).unwrap();
        assert_eq!(stored, acked);
    }

    #[tokio::test]
    async fn test_acknowledge_notifies_worker_and_other_contacts() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1", "c2"]);
        let alert = fx.raise_missed_alert("w1").await;
        let c1_before = fx.notifications_for("c1").len();

        fx.engine.alerts.acknowledge(&alert.id, "c1").unwrap();

        assert_eq!(fx.notifications_for("c1").len(), c1_before);
        assert!(fx
            .notifications_for("c2")
            .iter()
            .any(|n| n.notification_type == NotificationType::AlertAcknowledged));
        assert!(fx
            .notifications_for("w1")
            .iter()
            .any(|n| n.notification_type == NotificationType::AlertAcknowledged));
    }

    #[tokio::test]
    async fn test_resolve_from_active_and_acknowledged() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1", "c2"]);

        let first = fx.raise_missed_alert("w1").await;
        let resolved = fx.engine.alerts.resolve(&first.id, "c2").unwrap();
        assert_eq!(resolved.status, AlertStatus::Resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("c2"));

        let second = fx.raise_missed_alert("w1").await;
        fx.engine.alerts.acknowledge(&second.id, "c1").unwrap();
        fx.engine.alerts.resolve(&second.id, "c1").unwrap();

        let err = fx.engine.alerts.resolve(&second.id, "c1").unwrap_err();
        assert_eq!(err.to_string(), "Alert is already resolved");

        // Resolved alerts can no longer be acknowledged or escalated
        assert!(fx.engine.alerts.acknowledge(&second.id, "c2").is_err());
        assert!(!fx.engine.alerts.advance_escalation(&second.id, 1).unwrap());

        for user in ["w1", "c1", "c2"] {
            assert!(fx
                .notifications_for(user)
                .iter()
                .any(|n| n.notification_type == NotificationType::AlertResolved));
        }
    }

    #[tokio::test]
    async fn test_unknown_alert_is_not_found() {
        let fx = Fixture::new();
        assert!(fx.engine.alerts.acknowledge("nope", "c1").unwrap_err().is_not_found());
        assert!(fx.engine.alerts.resolve("nope", "c1").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_find_by_backup_contact_uses_whole_chain() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1", "c2"]);
        fx.worker_with_contacts("w2", &["c3"]);
        let a1 = fx.raise_missed_alert("w1").await;
        fx.raise_missed_alert("w2").await;

        let for_c2 = fx.engine.alerts.find_by_backup_contact_id("c2").unwrap();
        assert_eq!(for_c2.len(), 1);
        assert_eq!(for_c2[0].id, a1.id);

        let for_c1 = fx.engine.alerts.find_by_backup_contact_id("c1").unwrap();
        assert_eq!(for_c1.len(), 1);

        assert_eq!(fx.engine.alerts.find_by_worker_id("w2").unwrap().len(), 1);
        assert_eq!(fx.engine.alerts.count_pending_alerts().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_emergency_uses_active_shift_and_location() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);
        let shift = fx.start_shift("w1");

        let alert = fx
            .engine
            .alerts
            .trigger_emergency(
                "w1",
                Some("Fell from ladder"),
                Some(GeoPoint {
                    latitude: 51.5,
                    longitude: -0.12,
                }),
            )
            .await
            .unwrap();

        assert_eq!(alert.alert_type, AlertType::Emergency);
        assert_eq!(alert.severity, AlertSeverity::Critical);
        assert_eq!(alert.shift_id.as_deref(), Some(shift.id.as_str()));
        assert!(alert.message.starts_with("Fell from ladder"));
        assert!(alert.message.contains("51.50000"));
        assert_eq!(fx.notifications_for("c1")[0].title, "Emergency Alert");
    }

    #[tokio::test]
    async fn test_emergency_rejects_bad_coordinates() {
        let fx = Fixture::new();
        fx.worker_with_contacts("w1", &["c1"]);

        let err = fx
            .engine
            .alerts
            .trigger_emergency(
                "w1",
                None,
                Some(GeoPoint {
                    latitude: 91.0,
                    longitude: 0.0,
                }),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert_eq!(fx.engine.alerts.count_pending_alerts().unwrap(), 0);
    }
}
