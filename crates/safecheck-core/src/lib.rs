//! safecheck-core - Core library for SafeCheck
//!
//! Tracks lone workers through scheduled check-ins and escalates unanswered
//! alerts down each worker's ordered chain of backup contacts:
//!
//! - **shift**: shift lifecycle, one active shift per worker
//! - **checkin**: check-in scheduling, confirmation and the overdue sweep
//! - **alert**: alert creation and the acknowledge/resolve state machine
//! - **escalation**: background scheduler that notifies the next contact
//! - **notify**: in-app notifications plus SMS and email senders
//! - **settings**: admin-mutable timing and channel settings
//! - **contacts**: users and backup-contact chains
//! - **store**: persistence traits and the in-memory store
//! - **db**: SQLite-backed stores (feature `db`)
//! - **engine**: wires every service over one set of stores

pub mod alert;
pub mod checkin;
pub mod clock;
pub mod contacts;
#[cfg(feature = "db")]
pub mod db;
pub mod engine;
pub mod error;
pub mod escalation;
pub mod notify;
pub mod settings;
pub mod shift;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export commonly used types
#[cfg(feature = "db")]
pub use db::Database;
pub use engine::{Engine, EngineOptions};
pub use error::{Error, Result};
