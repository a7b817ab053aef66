//! Outbound notification channels and the alert dispatcher.
//!
//! - **sms**: `SmsSender` trait, phone normalization, console and Twilio senders
//! - **email**: `EmailSender` trait and console sender
//! - **dispatcher**: fans an alert out to one backup contact

mod dispatcher;
mod email;
mod sms;

pub use dispatcher::*;
pub use email::*;
pub use sms::*;

use serde::{Deserialize, Serialize};

/// Outcome of a single SMS or email send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    pub message_id: Option<String>,
    pub error: Option<String>,
}

impl SendResult {
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error: Some(error.into()),
        }
    }
}
