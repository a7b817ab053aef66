//! Service layer for safecheck-server
//!
//! Background tasks hosted by the server process.

pub mod sweeper;

pub use sweeper::OverdueSweeper;
