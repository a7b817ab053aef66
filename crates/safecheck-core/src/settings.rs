//! Process-wide system settings.
//!
//! A single validated record, created with defaults on first read and mutable
//! by administrators at runtime. Readers call [`SystemSettingsService::get`]
//! each time they need a value, so updates are visible immediately.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::RangeInclusive;
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::store::SettingsStore;

pub const DEFAULT_CHECK_IN_INTERVAL_MINUTES: u32 = 15;
pub const DEFAULT_RESPONSE_TIMEOUT_SECONDS: u32 = 60;
pub const DEFAULT_ESCALATION_DELAY_MINUTES: u32 = 5;

pub const CHECK_IN_INTERVAL_RANGE: RangeInclusive<u32> = 1..=120;
pub const RESPONSE_TIMEOUT_RANGE: RangeInclusive<u32> = 30..=600;
pub const ESCALATION_DELAY_RANGE: RangeInclusive<u32> = 1..=60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub check_in_interval_minutes: u32,
    pub response_timeout_seconds: u32,
    pub escalation_delay_minutes: u32,
    pub enable_sms_notifications: bool,
    pub enable_email_notifications: bool,
    pub enable_push_notifications: bool,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Option<String>,
}

impl SystemSettings {
    /// Hardcoded defaults: 15 minute interval, 60 second timeout, 5 minute delay, all channels on.
    pub fn defaults(at: DateTime<Utc>) -> Self {
        Self {
            check_in_interval_minutes: DEFAULT_CHECK_IN_INTERVAL_MINUTES,
            response_timeout_seconds: DEFAULT_RESPONSE_TIMEOUT_SECONDS,
            escalation_delay_minutes: DEFAULT_ESCALATION_DELAY_MINUTES,
            enable_sms_notifications: true,
            enable_email_notifications: true,
            enable_push_notifications: true,
            updated_at: at,
            updated_by: None,
        }
    }
}

/// Partial update; unset fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsUpdate {
    pub check_in_interval_minutes: Option<u32>,
    pub response_timeout_seconds: Option<u32>,
    pub escalation_delay_minutes: Option<u32>,
    pub enable_sms_notifications: Option<bool>,
    pub enable_email_notifications: Option<bool>,
    pub enable_push_notifications: Option<bool>,
}

impl SettingsUpdate {
    /// Check every supplied bound. Nothing is applied unless all pass.
    pub fn validate(&self) -> Result<()> {
        check_range(
            "checkInIntervalMinutes",
            self.check_in_interval_minutes,
            &CHECK_IN_INTERVAL_RANGE,
        )?;
        check_range(
            "responseTimeoutSeconds",
            self.response_timeout_seconds,
            &RESPONSE_TIMEOUT_RANGE,
        )?;
        check_range(
            "escalationDelayMinutes",
            self.escalation_delay_minutes,
            &ESCALATION_DELAY_RANGE,
        )?;
        Ok(())
    }

    fn apply_to(&self, settings: &mut SystemSettings) {
        if let Some(v) = self.check_in_interval_minutes {
            settings.check_in_interval_minutes = v;
        }
        if let Some(v) = self.response_timeout_seconds {
            settings.response_timeout_seconds = v;
        }
        if let Some(v) = self.escalation_delay_minutes {
            settings.escalation_delay_minutes = v;
        }
        if let Some(v) = self.enable_sms_notifications {
            settings.enable_sms_notifications = v;
        }
        if let Some(v) = self.enable_email_notifications {
            settings.enable_email_notifications = v;
        }
        if let Some(v) = self.enable_push_notifications {
            settings.enable_push_notifications = v;
        }
    }
}

fn check_range(field: &str, value: Option<u32>, range: &RangeInclusive<u32>) -> Result<()> {
    match value {
        Some(v) if !range.contains(&v) => Err(Error::validation(
            field,
            format!("must be between {} and {}", range.start(), range.end()),
        )),
        _ => Ok(()),
    }
}

/// Validated access to the settings singleton.
pub struct SystemSettingsService {
    store: Arc<dyn SettingsStore>,
    clock: Arc<dyn Clock>,
    /// Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl SystemSettingsService {
    pub fn new(store: Arc<dyn SettingsStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    /// Current settings, seeding defaults on first access.
    pub fn get(&self) -> Result<SystemSettings> {
        if let Some(settings) = self.store.load()? {
            return Ok(settings);
        }
        let _guard = self.write_lock.lock().map_err(|_| Error::LockPoisoned)?;
        // Another caller may have seeded while we waited.
        if let Some(settings) = self.store.load()? {
            return Ok(settings);
        }
        let settings = SystemSettings::defaults(self.clock.now());
        self.store.save(&settings)?;
        info!("Seeded default system settings");
        Ok(settings)
    }

    /// Apply a partial update. Rejects the whole update if any bound fails.
    pub fn update(&self, update: &SettingsUpdate, updated_by: Option<&str>) -> Result<SystemSettings> {
        update.validate()?;

        let current = self.get()?;
        let _guard = self.write_lock.lock().map_err(|_| Error::LockPoisoned)?;
        let mut settings = self.store.load()?.unwrap_or(current);
        update.apply_to(&mut settings);
        settings.updated_at = self.clock.now();
        settings.updated_by = updated_by.map(String::from);
        self.store.save(&settings)?;

        info!(
            updated_by = updated_by.unwrap_or("system"),
            check_in_interval_minutes = settings.check_in_interval_minutes,
            response_timeout_seconds = settings.response_timeout_seconds,
            escalation_delay_minutes = settings.escalation_delay_minutes,
            "System settings updated"
        );
        Ok(settings)
    }

    /// Restore the hardcoded defaults.
    pub fn reset(&self, reset_by: Option<&str>) -> Result<SystemSettings> {
        let _guard = self.write_lock.lock().map_err(|_| Error::LockPoisoned)?;
        let mut settings = SystemSettings::defaults(self.clock.now());
        settings.updated_by = reset_by.map(String::from);
        self.store.save(&settings)?;

        info!(reset_by = reset_by.unwrap_or("system"), "System settings reset to defaults");
        Ok(settings)
    }
}
