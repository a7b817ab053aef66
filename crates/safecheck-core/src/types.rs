//! Shared types for safecheck-core.
//!
//! These types are used by the services, the stores and the server layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Status Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle of a shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShiftStatus {
    Active,
    Completed,
    Cancelled,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Active => "active",
            ShiftStatus::Completed => "completed",
            ShiftStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShiftStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ShiftStatus::Active),
            "completed" => Ok(ShiftStatus::Completed),
            "cancelled" => Ok(ShiftStatus::Cancelled),
            _ => Err(format!("Invalid shift status: {}", s)),
        }
    }
}

/// Lifecycle of a check-in. Confirmed and Missed are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    Pending,
    Confirmed,
    Missed,
}

impl CheckInStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckInStatus::Pending => "pending",
            CheckInStatus::Confirmed => "confirmed",
            CheckInStatus::Missed => "missed",
        }
    }
}

impl std::fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckInStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CheckInStatus::Pending),
            "confirmed" => Ok(CheckInStatus::Confirmed),
            "missed" => Ok(CheckInStatus::Missed),
            _ => Err(format!("Invalid check-in status: {}", s)),
        }
    }
}

/// What raised an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    MissedCheckIn,
    Emergency,
    SystemAlert,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::MissedCheckIn => "missed_check_in",
            AlertType::Emergency => "emergency",
            AlertType::SystemAlert => "system_alert",
        }
    }

    /// Title used for the in-app notification sent to a contact.
    pub fn title(&self) -> &'static str {
        match self {
            AlertType::MissedCheckIn => "Missed Check-In",
            AlertType::Emergency => "Emergency Alert",
            AlertType::SystemAlert => "Safety Alert",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missed_check_in" => Ok(AlertType::MissedCheckIn),
            "emergency" => Ok(AlertType::Emergency),
            "system_alert" => Ok(AlertType::SystemAlert),
            _ => Err(format!("Invalid alert type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertSeverity::Low => "low",
            AlertSeverity::Medium => "medium",
            AlertSeverity::High => "high",
            AlertSeverity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertSeverity {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(AlertSeverity::Low),
            "medium" => Ok(AlertSeverity::Medium),
            "high" => Ok(AlertSeverity::High),
            "critical" => Ok(AlertSeverity::Critical),
            _ => Err(format!("Invalid alert severity: {}", s)),
        }
    }
}

/// Alert state machine: Active -> Acknowledged -> Resolved, or Active -> Resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
}

impl AlertStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
        }
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AlertStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(AlertStatus::Active),
            "acknowledged" => Ok(AlertStatus::Acknowledged),
            "resolved" => Ok(AlertStatus::Resolved),
            _ => Err(format!("Invalid alert status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Worker,
    BackupContact,
    Supervisor,
    Admin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Worker => "worker",
            UserRole::BackupContact => "backup_contact",
            UserRole::Supervisor => "supervisor",
            UserRole::Admin => "admin",
        }
    }
}

impl std::fmt::Display for UserRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for UserRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "worker" => Ok(UserRole::Worker),
            "backup_contact" => Ok(UserRole::BackupContact),
            "supervisor" => Ok(UserRole::Supervisor),
            "admin" => Ok(UserRole::Admin),
            _ => Err(format!("Invalid user role: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// A contact is asked to respond to an alert.
    AlertRaised,
    /// The worker is told which contact was alerted.
    ContactAlerted,
    AlertAcknowledged,
    AlertResolved,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::AlertRaised => "alert_raised",
            NotificationType::ContactAlerted => "contact_alerted",
            NotificationType::AlertAcknowledged => "alert_acknowledged",
            NotificationType::AlertResolved => "alert_resolved",
        }
    }
}

impl std::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "alert_raised" => Ok(NotificationType::AlertRaised),
            "contact_alerted" => Ok(NotificationType::ContactAlerted),
            "alert_acknowledged" => Ok(NotificationType::AlertAcknowledged),
            "alert_resolved" => Ok(NotificationType::AlertResolved),
            _ => Err(format!("Invalid notification type: {}", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entity Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Shift {
    pub id: String,
    pub worker_id: String,
    pub location_id: String,
    pub status: ShiftStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub estimated_end_time: DateTime<Utc>,
    /// Overrides the global check-in interval when set.
    pub check_in_interval_minutes: Option<u32>,
}

impl Shift {
    pub fn is_active(&self) -> bool {
        self.status == ShiftStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    pub id: String,
    pub shift_id: String,
    pub worker_id: String,
    pub scheduled_time: DateTime<Utc>,
    pub response_time: Option<DateTime<Utc>>,
    pub status: CheckInStatus,
    pub response_seconds: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    /// Unset only for emergencies raised outside an active shift.
    pub shift_id: Option<String>,
    pub worker_id: String,
    pub backup_contact_id: Option<String>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub status: AlertStatus,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    /// Index into the worker's backup-contact chain most recently notified.
    pub escalated_to_index: usize,
    pub last_escalated_at: Option<DateTime<Utc>>,
}

impl Alert {
    pub fn is_active(&self) -> bool {
        self.status == AlertStatus::Active
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub role: UserRole,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Escalation chain in priority order; the first entry is the primary contact.
    #[serde(default)]
    pub assigned_backup_contact_ids: Vec<String>,
    /// Workers this user is a backup contact for.
    #[serde(default)]
    pub assigned_worker_ids: Vec<String>,
}

impl User {
    /// Create a user with no contact details or assignments.
    pub fn new(
        id: impl Into<String>,
        role: UserRole,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone: None,
            email: None,
            assigned_backup_contact_ids: Vec::new(),
            assigned_worker_ids: Vec::new(),
        }
    }

    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub title: String,
    pub message: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub action_url: Option<String>,
}

/// Reported position of a worker raising an emergency
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Input Types (for creating entities)
// ─────────────────────────────────────────────────────────────────────────────

/// Input for starting a new shift
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewShift {
    pub worker_id: String,
    pub location_id: String,
    pub estimated_end_time: DateTime<Utc>,
    pub check_in_interval_minutes: Option<u32>,
}

/// Input for raising a new alert
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub shift_id: Option<String>,
    pub worker_id: String,
    /// Explicit single contact; validated when present.
    pub backup_contact_id: Option<String>,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
}
