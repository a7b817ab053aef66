//! Shared fixtures for unit tests.

use async_trait::async_trait;
use chrono::Duration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::clock::{Clock, ManualClock};
use crate::engine::{Engine, EngineOptions};
use crate::notify::{ConsoleEmailSender, SendResult, SmsSender};
use crate::store::Stores;
use crate::types::{
    Alert, AlertSeverity, AlertStatus, AlertType, NewAlert, NewShift, Notification, Shift, User,
    UserRole,
};

/// Records every SMS instead of sending it.
#[derive(Default)]
pub struct RecordingSmsSender {
    sent: Mutex<Vec<(String, String)>>,
    fail: AtomicBool,
}

impl RecordingSmsSender {
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Make every later send report failure.
    pub fn fail_all(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl SmsSender for RecordingSmsSender {
    async fn send(&self, to: &str, message: &str) -> SendResult {
        if self.fail.load(Ordering::SeqCst) {
            return SendResult::failed("provider unavailable");
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), message.to_string()));
        SendResult::delivered("test")
    }
}

pub struct Fixture {
    pub clock: Arc<ManualClock>,
    pub stores: Stores,
    pub sms: Arc<RecordingSmsSender>,
    pub engine: Engine,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::default());
        let stores = Stores::in_memory();
        let sms = Arc::new(RecordingSmsSender::default());
        let engine = Engine::new(
            stores.clone(),
            EngineOptions {
                clock: clock.clone(),
                sms: sms.clone(),
                email: Arc::new(ConsoleEmailSender),
                ..Default::default()
            },
        );
        Self {
            clock,
            stores,
            sms,
            engine,
        }
    }

    /// Create a worker and its contacts, and assign the chain in order.
    pub fn worker_with_contacts(&self, worker_id: &str, contact_ids: &[&str]) -> User {
        for (i, id) in contact_ids.iter().enumerate() {
            let contact = User::new(*id, UserRole::BackupContact, "Contact", id.to_uppercase())
                .with_phone(format!("555000{:04}", i + 1));
            self.stores.users.upsert(&contact).unwrap();
        }
        let worker = User::new(worker_id, UserRole::Worker, "Wendy", "Worker");
        self.stores.users.upsert(&worker).unwrap();

        let ids: Vec<String> = contact_ids.iter().map(|s| s.to_string()).collect();
        self.stores
            .users
            .assign_backup_contacts(worker_id, &ids)
            .unwrap();
        self.stores.users.get(worker_id).unwrap().unwrap()
    }

    pub fn start_shift(&self, worker_id: &str) -> Shift {
        self.start_shift_inner(worker_id, None)
    }

    pub fn start_shift_with_interval(&self, worker_id: &str, minutes: u32) -> Shift {
        self.start_shift_inner(worker_id, Some(minutes))
    }

    fn start_shift_inner(&self, worker_id: &str, minutes: Option<u32>) -> Shift {
        self.engine
            .shifts
            .start_shift(NewShift {
                worker_id: worker_id.to_string(),
                location_id: "site-1".to_string(),
                estimated_end_time: self.clock.now() + Duration::hours(8),
                check_in_interval_minutes: minutes,
            })
            .unwrap()
    }

    /// Raise a missed check-in alert through the service.
    pub async fn raise_missed_alert(&self, worker_id: &str) -> Alert {
        self.engine
            .alerts
            .create(NewAlert {
                shift_id: None,
                worker_id: worker_id.to_string(),
                backup_contact_id: None,
                alert_type: AlertType::MissedCheckIn,
                severity: AlertSeverity::High,
                message: "missed check-in".to_string(),
            })
            .await
            .unwrap()
    }

    /// Store an Active alert directly, skipping validation and fan-out.
    pub fn raw_alert(&self, id: &str, worker_id: &str, alert_type: AlertType) -> Alert {
        let now = self.clock.now();
        let alert = Alert {
            id: id.to_string(),
            shift_id: None,
            worker_id: worker_id.to_string(),
            backup_contact_id: None,
            alert_type,
            severity: AlertSeverity::High,
            status: AlertStatus::Active,
            message: "test alert".to_string(),
            created_at: now,
            acknowledged_at: None,
            acknowledged_by: None,
            resolved_at: None,
            resolved_by: None,
            escalated_to_index: 0,
            last_escalated_at: Some(now),
        };
        self.stores.alerts.insert(&alert).unwrap();
        alert
    }

    pub fn notifications_for(&self, user_id: &str) -> Vec<Notification> {
        self.stores.notifications.list_for_user(user_id).unwrap()
    }
}
