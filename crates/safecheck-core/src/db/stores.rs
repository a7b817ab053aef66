//! Store trait implementations for [`Database`].

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use std::str::FromStr;

use super::Database;
use crate::clock::from_millis;
use crate::error::{Error, Result};
use crate::settings::SystemSettings;
use crate::store::{
    AlertStore, CheckInStore, NotificationStore, SettingsStore, ShiftStore, UserStore,
};
use crate::types::{
    Alert, AlertStatus, CheckIn, CheckInStatus, Notification, Shift, ShiftStatus, User,
};

// ─────────────────────────────────────────────────────────────────────────────
// Column helpers
// ─────────────────────────────────────────────────────────────────────────────

fn millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

fn enum_col<T: FromStr<Err = String>>(row: &Row, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn time_col(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    Ok(from_millis(row.get(idx)?))
}

fn opt_time_col(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    Ok(row.get::<_, Option<i64>>(idx)?.map(from_millis))
}

fn ids_col(row: &Row, idx: usize) -> rusqlite::Result<Vec<String>> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn ids_json(ids: &[String]) -> Result<String> {
    Ok(serde_json::to_string(ids)?)
}

const SHIFT_COLUMNS: &str = "id, worker_id, location_id, status, start_time, end_time,
     estimated_end_time, check_in_interval_minutes";

fn map_shift(row: &Row) -> rusqlite::Result<Shift> {
    Ok(Shift {
        id: row.get(0)?,
        worker_id: row.get(1)?,
        location_id: row.get(2)?,
        status: enum_col(row, 3)?,
        start_time: time_col(row, 4)?,
        end_time: opt_time_col(row, 5)?,
        estimated_end_time: time_col(row, 6)?,
        check_in_interval_minutes: row.get(7)?,
    })
}

const CHECK_IN_COLUMNS: &str =
    "id, shift_id, worker_id, scheduled_time, response_time, status, response_seconds";

fn map_check_in(row: &Row) -> rusqlite::Result<CheckIn> {
    Ok(CheckIn {
        id: row.get(0)?,
        shift_id: row.get(1)?,
        worker_id: row.get(2)?,
        scheduled_time: time_col(row, 3)?,
        response_time: opt_time_col(row, 4)?,
        status: enum_col(row, 5)?,
        response_seconds: row.get(6)?,
    })
}

const ALERT_COLUMNS: &str = "id, shift_id, worker_id, backup_contact_id, type, severity, status,
     message, created_at, acknowledged_at, acknowledged_by, resolved_at, resolved_by,
     escalated_to_index, last_escalated_at";

fn map_alert(row: &Row) -> rusqlite::Result<Alert> {
    let index: i64 = row.get(13)?;
    Ok(Alert {
        id: row.get(0)?,
        shift_id: row.get(1)?,
        worker_id: row.get(2)?,
        backup_contact_id: row.get(3)?,
        alert_type: enum_col(row, 4)?,
        severity: enum_col(row, 5)?,
        status: enum_col(row, 6)?,
        message: row.get(7)?,
        created_at: time_col(row, 8)?,
        acknowledged_at: opt_time_col(row, 9)?,
        acknowledged_by: row.get(10)?,
        resolved_at: opt_time_col(row, 11)?,
        resolved_by: row.get(12)?,
        escalated_to_index: usize::try_from(index).unwrap_or(0),
        last_escalated_at: opt_time_col(row, 14)?,
    })
}

const USER_COLUMNS: &str =
    "id, role, first_name, last_name, phone, email, backup_contact_ids, worker_ids";

fn map_user(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        role: enum_col(row, 1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        phone: row.get(4)?,
        email: row.get(5)?,
        assigned_backup_contact_ids: ids_col(row, 6)?,
        assigned_worker_ids: ids_col(row, 7)?,
    })
}

fn map_notification(row: &Row) -> rusqlite::Result<Notification> {
    Ok(Notification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        notification_type: enum_col(row, 2)?,
        title: row.get(3)?,
        message: row.get(4)?,
        is_read: row.get(5)?,
        created_at: time_col(row, 6)?,
        action_url: row.get(7)?,
    })
}

fn query_alerts(conn: &Connection, filter: &str, arg: &str) -> Result<Vec<Alert>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM alert WHERE {} = ?1 ORDER BY created_at",
        ALERT_COLUMNS, filter
    ))?;
    let alerts = stmt
        .query_map(params![arg], map_alert)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(alerts)
}

fn get_user(conn: &Connection, id: &str) -> Result<Option<User>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM app_user WHERE id = ?1", USER_COLUMNS),
            params![id],
            map_user,
        )
        .optional()?)
}

fn set_worker_ids(conn: &Connection, user_id: &str, worker_ids: &[String]) -> Result<()> {
    conn.execute(
        "UPDATE app_user SET worker_ids = ?1 WHERE id = ?2",
        params![ids_json(worker_ids)?, user_id],
    )?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Shifts
// ─────────────────────────────────────────────────────────────────────────────

impl ShiftStore for Database {
    fn insert_if_no_active(&self, shift: &Shift) -> Result<()> {
        let conn = self.lock()?;
        let existing: Option<String> = conn
            .query_row(
                "SELECT id FROM shift WHERE worker_id = ?1 AND status = 'active'",
                params![shift.worker_id],
                |row| row.get(0),
            )
            .optional()?;
        if existing.is_some() {
            return Err(Error::invalid_state(format!(
                "Worker {} already has an active shift",
                shift.worker_id
            )));
        }

        conn.execute(
            &format!(
                "INSERT INTO shift ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                SHIFT_COLUMNS
            ),
            params![
                shift.id,
                shift.worker_id,
                shift.location_id,
                shift.status.as_str(),
                millis(shift.start_time),
                shift.end_time.map(millis),
                millis(shift.estimated_end_time),
                shift.check_in_interval_minutes,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Shift>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM shift WHERE id = ?1", SHIFT_COLUMNS),
                params![id],
                map_shift,
            )
            .optional()?)
    }

    fn find_active_for_worker(&self, worker_id: &str) -> Result<Option<Shift>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!(
                    "SELECT {} FROM shift WHERE worker_id = ?1 AND status = 'active'",
                    SHIFT_COLUMNS
                ),
                params![worker_id],
                map_shift,
            )
            .optional()?)
    }

    fn finish(&self, id: &str, status: ShiftStatus, end_time: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE shift SET status = ?1, end_time = ?2 WHERE id = ?3 AND status = 'active'",
            params![status.as_str(), millis(end_time), id],
        )?;
        Ok(changed == 1)
    }

    fn set_estimated_end(&self, id: &str, estimated_end_time: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE shift SET estimated_end_time = ?1 WHERE id = ?2 AND status = 'active'",
            params![millis(estimated_end_time), id],
        )?;
        Ok(changed == 1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Check-ins
// ─────────────────────────────────────────────────────────────────────────────

impl CheckInStore for Database {
    fn insert(&self, check_in: &CheckIn) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO check_in ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                CHECK_IN_COLUMNS
            ),
            params![
                check_in.id,
                check_in.shift_id,
                check_in.worker_id,
                millis(check_in.scheduled_time),
                check_in.response_time.map(millis),
                check_in.status.as_str(),
                check_in.response_seconds,
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<CheckIn>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM check_in WHERE id = ?1", CHECK_IN_COLUMNS),
                params![id],
                map_check_in,
            )
            .optional()?)
    }

    fn list_pending(&self) -> Result<Vec<CheckIn>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM check_in WHERE status = 'pending' ORDER BY scheduled_time",
            CHECK_IN_COLUMNS
        ))?;
        let check_ins = stmt
            .query_map([], map_check_in)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(check_ins)
    }

    fn list_for_shift(&self, shift_id: &str) -> Result<Vec<CheckIn>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM check_in WHERE shift_id = ?1 ORDER BY scheduled_time",
            CHECK_IN_COLUMNS
        ))?;
        let check_ins = stmt
            .query_map(params![shift_id], map_check_in)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(check_ins)
    }

    fn complete(
        &self,
        id: &str,
        status: CheckInStatus,
        response_time: Option<DateTime<Utc>>,
        response_seconds: Option<i64>,
    ) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE check_in SET status = ?1, response_time = ?2, response_seconds = ?3
             WHERE id = ?4 AND status = 'pending'",
            params![
                status.as_str(),
                response_time.map(millis),
                response_seconds,
                id
            ],
        )?;
        Ok(changed == 1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Alerts
// ─────────────────────────────────────────────────────────────────────────────

impl AlertStore for Database {
    fn insert(&self, alert: &Alert) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT INTO alert ({})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
                ALERT_COLUMNS
            ),
            params![
                alert.id,
                alert.shift_id,
                alert.worker_id,
                alert.backup_contact_id,
                alert.alert_type.as_str(),
                alert.severity.as_str(),
                alert.status.as_str(),
                alert.message,
                millis(alert.created_at),
                alert.acknowledged_at.map(millis),
                alert.acknowledged_by,
                alert.resolved_at.map(millis),
                alert.resolved_by,
                alert.escalated_to_index as i64,
                alert.last_escalated_at.map(millis),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Alert>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                &format!("SELECT {} FROM alert WHERE id = ?1", ALERT_COLUMNS),
                params![id],
                map_alert,
            )
            .optional()?)
    }

    fn list_by_status(&self, status: AlertStatus) -> Result<Vec<Alert>> {
        let conn = self.lock()?;
        query_alerts(&conn, "status", status.as_str())
    }

    fn list_for_worker(&self, worker_id: &str) -> Result<Vec<Alert>> {
        let conn = self.lock()?;
        query_alerts(&conn, "worker_id", worker_id)
    }

    fn list_for_primary_contact(&self, contact_id: &str) -> Result<Vec<Alert>> {
        let conn = self.lock()?;
        query_alerts(&conn, "backup_contact_id", contact_id)
    }

    fn count_by_status(&self, status: AlertStatus) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM alert WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn acknowledge(&self, id: &str, by: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE alert SET status = 'acknowledged', acknowledged_by = ?1, acknowledged_at = ?2
             WHERE id = ?3 AND status = 'active'",
            params![by, millis(at), id],
        )?;
        Ok(changed == 1)
    }

    fn resolve(&self, id: &str, by: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE alert SET status = 'resolved', resolved_by = ?1, resolved_at = ?2
             WHERE id = ?3 AND status != 'resolved'",
            params![by, millis(at), id],
        )?;
        Ok(changed == 1)
    }

    fn advance_escalation(&self, id: &str, new_index: usize, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE alert SET escalated_to_index = ?1, last_escalated_at = ?2
             WHERE id = ?3 AND status != 'resolved' AND escalated_to_index < ?1",
            params![new_index as i64, millis(at), id],
        )?;
        Ok(changed == 1)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Users
// ─────────────────────────────────────────────────────────────────────────────

impl UserStore for Database {
    fn get(&self, id: &str) -> Result<Option<User>> {
        let conn = self.lock()?;
        get_user(&conn, id)
    }

    fn upsert(&self, user: &User) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO app_user ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                USER_COLUMNS
            ),
            params![
                user.id,
                user.role.as_str(),
                user.first_name,
                user.last_name,
                user.phone,
                user.email,
                ids_json(&user.assigned_backup_contact_ids)?,
                ids_json(&user.assigned_worker_ids)?,
            ],
        )?;
        Ok(())
    }

    fn find_workers_by_backup_contact(&self, contact_id: &str) -> Result<Vec<User>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM app_user
             WHERE EXISTS (SELECT 1 FROM json_each(app_user.backup_contact_ids) WHERE value = ?1)
             ORDER BY id",
            USER_COLUMNS
        ))?;
        let users = stmt
            .query_map(params![contact_id], map_user)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(users)
    }

    fn assign_backup_contacts(&self, worker_id: &str, contact_ids: &[String]) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let worker = get_user(&tx, worker_id)?.ok_or_else(|| Error::not_found("User", worker_id))?;
        let mut contacts = Vec::with_capacity(contact_ids.len());
        for id in contact_ids {
            contacts.push(get_user(&tx, id)?.ok_or_else(|| Error::not_found("User", id.clone()))?);
        }

        for old in worker
            .assigned_backup_contact_ids
            .iter()
            .filter(|id| !contact_ids.contains(id))
        {
            if let Some(mut contact) = get_user(&tx, old)? {
                contact.assigned_worker_ids.retain(|w| w != worker_id);
                set_worker_ids(&tx, old, &contact.assigned_worker_ids)?;
            }
        }
        for mut contact in contacts {
            if !contact.assigned_worker_ids.iter().any(|w| w == worker_id) {
                contact.assigned_worker_ids.push(worker_id.to_string());
                set_worker_ids(&tx, &contact.id, &contact.assigned_worker_ids)?;
            }
        }

        tx.execute(
            "UPDATE app_user SET backup_contact_ids = ?1 WHERE id = ?2",
            params![ids_json(contact_ids)?, worker_id],
        )?;
        tx.commit()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notifications
// ─────────────────────────────────────────────────────────────────────────────

impl NotificationStore for Database {
    fn insert(&self, notification: &Notification) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO notification
             (id, user_id, type, title, message, is_read, created_at, action_url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                notification.id,
                notification.user_id,
                notification.notification_type.as_str(),
                notification.title,
                notification.message,
                notification.is_read,
                millis(notification.created_at),
                notification.action_url,
            ],
        )?;
        Ok(())
    }

    fn list_for_user(&self, user_id: &str) -> Result<Vec<Notification>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, type, title, message, is_read, created_at, action_url
             FROM notification WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let notifications = stmt
            .query_map(params![user_id], map_notification)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(notifications)
    }

    fn mark_read(&self, id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE notification SET is_read = 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(changed == 1)
    }

    fn count_unread(&self, user_id: &str) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM notification WHERE user_id = ?1 AND is_read = 0",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Settings
// ─────────────────────────────────────────────────────────────────────────────

impl SettingsStore for Database {
    fn load(&self) -> Result<Option<SystemSettings>> {
        let conn = self.lock()?;
        Ok(conn
            .query_row(
                "SELECT check_in_interval_minutes, response_timeout_seconds,
                        escalation_delay_minutes, enable_sms_notifications,
                        enable_email_notifications, enable_push_notifications,
                        updated_at, updated_by
                 FROM system_settings WHERE id = 1",
                [],
                |row| {
                    Ok(SystemSettings {
                        check_in_interval_minutes: row.get(0)?,
                        response_timeout_seconds: row.get(1)?,
                        escalation_delay_minutes: row.get(2)?,
                        enable_sms_notifications: row.get(3)?,
                        enable_email_notifications: row.get(4)?,
                        enable_push_notifications: row.get(5)?,
                        updated_at: time_col(row, 6)?,
                        updated_by: row.get(7)?,
                    })
                },
            )
            .optional()?)
    }

    fn save(&self, settings: &SystemSettings) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO system_settings
             (id, check_in_interval_minutes, response_timeout_seconds, escalation_delay_minutes,
              enable_sms_notifications, enable_email_notifications, enable_push_notifications,
              updated_at, updated_by)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                settings.check_in_interval_minutes,
                settings.response_timeout_seconds,
                settings.escalation_delay_minutes,
                settings.enable_sms_notifications,
                settings.enable_email_notifications,
                settings.enable_push_notifications,
                millis(settings.updated_at),
                settings.updated_by,
            ],
        )?;
        Ok(())
    }
}
