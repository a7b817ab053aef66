//! Engine - builds every service over one set of stores.

use std::sync::Arc;
use std::time::Duration;

use crate::alert::AlertService;
use crate::checkin::CheckInTracker;
use crate::clock::{Clock, SystemClock};
use crate::contacts::ContactService;
use crate::escalation::{DEFAULT_POLL_INTERVAL, EscalationScheduler};
use crate::notify::{ConsoleEmailSender, ConsoleSmsSender, EmailSender, NotificationDispatcher, SmsSender};
use crate::settings::SystemSettingsService;
use crate::shift::ShiftService;
use crate::store::Stores;

/// Collaborators the engine does not own.
#[derive(Clone)]
pub struct EngineOptions {
    pub clock: Arc<dyn Clock>,
    pub sms: Arc<dyn SmsSender>,
    pub email: Arc<dyn EmailSender>,
    /// How often the escalation scheduler scans once started.
    pub poll_interval: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            sms: Arc::new(ConsoleSmsSender),
            email: Arc::new(ConsoleEmailSender),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// All services, sharing one clock and one set of stores.
#[derive(Clone)]
pub struct Engine {
    pub stores: Stores,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<SystemSettingsService>,
    pub contacts: Arc<ContactService>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub alerts: Arc<AlertService>,
    pub check_ins: Arc<CheckInTracker>,
    pub shifts: Arc<ShiftService>,
    pub escalation: Arc<EscalationScheduler>,
}

impl Engine {
    pub fn new(stores: Stores, options: EngineOptions) -> Self {
        let EngineOptions {
            clock,
            sms,
            email,
            poll_interval,
        } = options;

        let settings = Arc::new(SystemSettingsService::new(
            stores.settings.clone(),
            clock.clone(),
        ));
        let contacts = Arc::new(ContactService::new(stores.users.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            stores.users.clone(),
            stores.notifications.clone(),
            settings.clone(),
            sms,
            email,
            clock.clone(),
        ));
        let alerts = Arc::new(AlertService::new(
            stores.alerts.clone(),
            stores.users.clone(),
            stores.shifts.clone(),
            dispatcher.clone(),
            clock.clone(),
        ));
        let check_ins = Arc::new(CheckInTracker::new(
            stores.check_ins.clone(),
            stores.shifts.clone(),
            settings.clone(),
            alerts.clone(),
            clock.clone(),
        ));
        let shifts = Arc::new(ShiftService::new(
            stores.shifts.clone(),
            stores.users.clone(),
            check_ins.clone(),
            clock.clone(),
        ));
        let escalation = Arc::new(EscalationScheduler::new(
            alerts.clone(),
            stores.users.clone(),
            settings.clone(),
            dispatcher.clone(),
            clock.clone(),
            poll_interval,
        ));

        Self {
            stores,
            clock,
            settings,
            contacts,
            dispatcher,
            alerts,
            check_ins,
            shifts,
            escalation,
        }
    }

    /// In-memory stores, wall clock, console senders.
    pub fn in_memory() -> Self {
        Self::new(Stores::in_memory(), EngineOptions::default())
    }
}
