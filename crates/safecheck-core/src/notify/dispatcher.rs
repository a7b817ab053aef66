//! NotificationDispatcher - fans one alert out to one backup contact.
//!
//! In-app notifications are the authoritative record: failing to write one is
//! an error. SMS and email are best-effort: failures are logged and the
//! dispatch still counts as delivered.

use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{EmailSender, SmsSender};
use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::settings::SystemSettingsService;
use crate::store::{NotificationStore, UserStore};
use crate::types::{Alert, AlertType, Notification, NotificationType, User};

/// Relative link to an alert for in-app notifications.
pub fn alert_action_url(alert_id: &str) -> String {
    format!("/alerts/{}", alert_id)
}

/// SMS body sent to a contact.
pub fn sms_body(alert: &Alert, worker_name: &str) -> String {
    match alert.alert_type {
        AlertType::Emergency => format!(
            "EMERGENCY: {} has triggered an emergency alert. {} Please respond immediately and acknowledge the alert in SafeCheck.",
            worker_name, alert.message
        ),
        AlertType::MissedCheckIn => format!(
            "SAFETY ALERT: {} missed a scheduled check-in. Please try to contact them and acknowledge the alert in SafeCheck.",
            worker_name
        ),
        AlertType::SystemAlert => format!(
            "SAFETY ALERT for {}: {} Please acknowledge the alert in SafeCheck.",
            worker_name, alert.message
        ),
    }
}

fn in_app_body(alert: &Alert, worker_name: &str) -> String {
    match alert.alert_type {
        AlertType::Emergency => format!("{} triggered an emergency alert: {}", worker_name, alert.message),
        AlertType::MissedCheckIn => format!(
            "{} missed a scheduled check-in. Please try to reach them and acknowledge this alert.",
            worker_name
        ),
        AlertType::SystemAlert => format!("{}: {}", worker_name, alert.message),
    }
}

pub struct NotificationDispatcher {
    users: Arc<dyn UserStore>,
    notifications: Arc<dyn NotificationStore>,
    settings: Arc<SystemSettingsService>,
    sms: Arc<dyn SmsSender>,
    email: Arc<dyn EmailSender>,
    clock: Arc<dyn Clock>,
}

impl NotificationDispatcher {
    pub fn new(
        users: Arc<dyn UserStore>,
        notifications: Arc<dyn NotificationStore>,
        settings: Arc<SystemSettingsService>,
        sms: Arc<dyn SmsSender>,
        email: Arc<dyn EmailSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            notifications,
            settings,
            sms,
            email,
            clock,
        }
    }

    /// Write an in-app notification for a user.
    pub fn notify_user(
        &self,
        user_id: &str,
        notification_type: NotificationType,
        title: &str,
        message: &str,
        action_url: Option<String>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            notification_type,
            title: title.to_string(),
            message: message.to_string(),
            is_read: false,
            created_at: self.clock.now(),
            action_url,
        };
        self.notifications.insert(&notification)?;
        Ok(notification)
    }

    /// A user's inbox, newest first.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        self.notifications.list_for_user(user_id)
    }

    pub fn mark_read(&self, notification_id: &str) -> Result<()> {
        if !self.notifications.mark_read(notification_id)? {
            return Err(Error::not_found("Notification", notification_id));
        }
        Ok(())
    }

    pub fn count_unread(&self, user_id: &str) -> Result<usize> {
        self.notifications.count_unread(user_id)
    }

    /// Notify the contact at `index` in the worker's chain.
    ///
    /// Returns `false` with no side effects when the chain is exhausted or the
    /// contact no longer exists.
    pub async fn notify_contact_at_index(
        &self,
        alert: &Alert,
        worker: &User,
        worker_name: &str,
        index: usize,
    ) -> Result<bool> {
        let Some(contact_id) = worker.assigned_backup_contact_ids.get(index) else {
            debug!(
                alert_id = %alert.id,
                index = index,
                chain_len = worker.assigned_backup_contact_ids.len(),
                "No backup contact at index"
            );
            return Ok(false);
        };

        let Some(contact) = self.users.get(contact_id)? else {
            warn!(
                alert_id = %alert.id,
                contact_id = %contact_id,
                "Backup contact not found"
            );
            return Ok(false);
        };

        let settings = self.settings.get()?;
        let url = alert_action_url(&alert.id);

        self.notify_user(
            &contact.id,
            NotificationType::AlertRaised,
            alert.alert_type.title(),
            &in_app_body(alert, worker_name),
            Some(url.clone()),
        )?;
        self.notify_user(
            &worker.id,
            NotificationType::ContactAlerted,
            "Backup Contact Alerted",
            &format!("{} has been alerted", contact.full_name()),
            Some(url),
        )?;

        if settings.enable_sms_notifications {
            if let Some(phone) = contact.phone.as_deref().filter(|p| !p.trim().is_empty()) {
                let result = self.sms.send(phone, &sms_body(alert, worker_name)).await;
                if !result.success {
                    warn!(
                        alert_id = %alert.id,
                        contact_id = %contact.id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "SMS delivery failed"
                    );
                }
            }
        }

        if settings.enable_email_notifications {
            if let Some(email) = contact.email.as_deref().filter(|e| !e.trim().is_empty()) {
                let subject = format!("{}: {}", alert.alert_type.title(), worker_name);
                let result = self
                    .email
                    .send(email, &subject, &in_app_body(alert, worker_name), None)
                    .await;
                if !result.success {
                    warn!(
                        alert_id = %alert.id,
                        contact_id = %contact.id,
                        error = result.error.as_deref().unwrap_or("unknown"),
                        "Email delivery failed"
                    );
                }
            }
        }

        info!(
            alert_id = %alert.id,
            contact_id = %contact.id,
            index = index,
            "Backup contact notified"
        );
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::SettingsUpdate;
    use crate::testing::Fixture;
    use crate::types::AlertSeverity;

    #[test]
    fn test_sms_body_per_alert_type() {
        let fx = Fixture::new();
        let mut alert = fx.raw_alert("a1", "w1", AlertType::MissedCheckIn);
        alert.message = "Gas detector triggered".to_string();

        let missed = sms_body(&alert, "Wendy Worker");
        assert!(missed.starts_with("SAFETY ALERT: Wendy Worker missed a scheduled check-in."));

        alert.alert_type = AlertType::Emergency;
        let emergency = sms_body(&alert, "Wendy Worker");
        assert!(emergency.starts_with("EMERGENCY: Wendy Worker"));
        assert!(emergency.contains("Gas detector triggered"));

        alert.alert_type = AlertType::SystemAlert;
        let system = sms_body(&alert, "Wendy Worker");
        assert_eq!(
            system,
            "SAFETY ALERT for Wendy Worker: Gas detector triggered Please acknowledge the alert in SafeCheck."
        );
        assert!(!system.contains("missed"));
    }

    #[tokio::test]
    async fn test_notifies_contact_and_worker() {
        let fx = Fixture::new();
        let worker = fx.worker_with_contacts("w1", &["c1", "c2"]);
        let alert = fx.raw_alert("a1", &worker.id, AlertType::MissedCheckIn);

        let notified = fx
            .engine
            .dispatcher
            .notify_contact_at_index(&alert, &worker, "Wendy Worker", 1)
            .await
            .unwrap();
        assert!(notified);

        let c2 = fx.notifications_for("c2");
        assert_eq!(c2.len(), 1);
        assert_eq!(c2[0].title, "Missed Check-In");
        assert_eq!(c2[0].action_url.as_deref(), Some("/alerts/a1"));
        assert!(fx.notifications_for("c1").is_empty());

        let w = fx.notifications_for("w1");
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].notification_type, NotificationType::ContactAlerted);
        assert!(w[0].message.contains("has been alerted"));

        let sent = fx.sms.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.starts_with("SAFETY ALERT"));
    }

    #[tokio::test]
    async fn test_emergency_template() {
        let fx = Fixture::new();
        let worker = fx.worker_with_contacts("w1", &["c1"]);
        let mut alert = fx.raw_alert("a1", &worker.id, AlertType::Emergency);
        alert.severity = AlertSeverity::Critical;

        fx.engine
            .dispatcher
            .notify_contact_at_index(&alert, &worker, "Wendy Worker", 0)
            .await
            .unwrap();

        assert_eq!(fx.notifications_for("c1")[0].title, "Emergency Alert");
        assert!(fx.sms.sent()[0].1.starts_with("EMERGENCY"));
    }

    #[tokio::test]
    async fn test_exhausted_index_has_no_side_effects() {
        let fx = Fixture::new();
        let worker = fx.worker_with_contacts("w1", &["c1"]);
        let alert = fx.raw_alert("a1", &worker.id, AlertType::MissedCheckIn);

        let notified = fx
            .engine
            .dispatcher
            .notify_contact_at_index(&alert, &worker, "Wendy Worker", 1)
            .await
            .unwrap();
        assert!(!notified);
        assert!(fx.notifications_for("w1").is_empty());
        assert!(fx.sms.sent().is_empty());
    }

    #[tokio::test]
    async fn test_missing_contact_returns_false() {
        let fx = Fixture::new();
        let mut worker = fx.worker_with_contacts("w1", &["c1"]);
        worker.assigned_backup_contact_ids.push("ghost".to_string());
        let alert = fx.raw_alert("a1", &worker.id, AlertType::MissedCheckIn);

        let notified = fx
            .engine
            .dispatcher
            .notify_contact_at_index(&alert, &worker, "Wendy Worker", 1)
            .await
            .unwrap();
        assert!(!notified);
        assert!(fx.notifications_for("w1").is_empty());
    }

    #[tokio::test]
    async fn test_sms_disabled_still_notifies_in_app() {
        let fx = Fixture::new();
        fx.engine
            .settings
            .update(
                &SettingsUpdate {
                    enable_sms_notifications: Some(false),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let worker = fx.worker_with_contacts("w1", &["c1"]);
        let alert = fx.raw_alert("a1", &worker.id, AlertType::MissedCheckIn);

        let notified = fx
            .engine
            .dispatcher
            .notify_contact_at_index(&alert, &worker, "Wendy Worker", 0)
            .await
            .unwrap();
        assert!(notified);
        assert!(fx.sms.sent().is_empty());
        assert_eq!(fx.notifications_for("c1").len(), 1);
    }

    #[tokio::test]
    async fn test_inbox_read_state() {
        let fx = Fixture::new();
        let worker = fx.worker_with_contacts("w1", &["c1"]);
        let alert = fx.raw_alert("a1", &worker.id, AlertType::MissedCheckIn);
        fx.engine
            .dispatcher
            .notify_contact_at_index(&alert, &worker, "Wendy Worker", 0)
            .await
            .unwrap();

        let dispatcher = &fx.engine.dispatcher;
        assert_eq!(dispatcher.count_unread("c1").unwrap(), 1);
        let inbox = dispatcher.list_for_user("c1").unwrap();
        dispatcher.mark_read(&inbox[0].id).unwrap();
        assert_eq!(dispatcher.count_unread("c1").unwrap(), 0);
        assert!(dispatcher.list_for_user("c1").unwrap()[0].is_read);

        assert!(dispatcher.mark_read("missing").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_transport_failure_does_not_fail_dispatch() {
        let fx = Fixture::new();
        fx.sms.fail_all();
        let worker = fx.worker_with_contacts("w1", &["c1"]);
        let alert = fx.raw_alert("a1", &worker.id, AlertType::MissedCheckIn);

        let notified = fx
            .engine
            .dispatcher
            .notify_contact_at_index(&alert, &worker, "Wendy Worker", 0)
            .await
            .unwrap();
        assert!(notified);
        assert_eq!(fx.notifications_for("c1").len(), 1);
    }
}
