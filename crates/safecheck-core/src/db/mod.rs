//! SQLite persistence for SafeCheck.
//!
//! [`Database`] implements every store trait over one connection, so a single
//! value can back a whole [`Stores`](crate::store::Stores) via
//! `Stores::from_backend`.
//!
//! Timestamps are stored as epoch milliseconds. Enums are stored as their
//! snake_case names. Backup-contact chains are JSON arrays of user ids.

mod schema;
mod stores;

use crate::error::{Error, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Database connection wrapper.
///
/// Thread-safe via internal Mutex. All database operations acquire the lock,
/// which also makes each conditional transition atomic.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the database file and apply the schema.
    pub fn open_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened SQLite database");
        Self::from_connection(conn)
    }

    /// Private in-memory database, mostly for tests and demo runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Create any missing tables and indexes.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(schema::SCHEMA)?;
        Ok(())
    }

    /// Check database connectivity
    pub fn ping(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch("SELECT 1")?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }
}
