//! SMS delivery.

use async_trait::async_trait;
use tracing::info;

use super::SendResult;

#[async_trait]
pub trait SmsSender: Send + Sync {
    /// Send `message` to `to`. Implementations normalize the number first.
    async fn send(&self, to: &str, message: &str) -> SendResult;
}

/// Normalize a phone number to an E.164-like form.
///
/// Keeps a leading `+` and digits only. Ten-digit numbers are treated as North
/// American and get a `+1` prefix; eleven digits starting with `1` get `+`.
pub fn normalize_phone_number(raw: &str) -> String {
    let trimmed = raw.trim();
    let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();

    if trimmed.starts_with('+') {
        return format!("+{}", digits);
    }
    if let Some(rest) = digits.strip_prefix("00") {
        return format!("+{}", rest);
    }
    match digits.len() {
        10 => format!("+1{}", digits),
        11 if digits.starts_with('1') => format!("+{}", digits),
        _ => format!("+{}", digits),
    }
}

/// Logs messages instead of sending them. Used when no provider is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleSmsSender;

#[async_trait]
impl SmsSender for ConsoleSmsSender {
    async fn send(&self, to: &str, message: &str) -> SendResult {
        let to = normalize_phone_number(to);
        let message_id = format!("console-{}", uuid::Uuid::new_v4());
        info!(to = %to, message_id = %message_id, body = %message, "SMS (console)");
        SendResult::delivered(message_id)
    }
}

#[cfg(feature = "twilio")]
pub use twilio::{TwilioConfig, TwilioSmsSender};

#[cfg(feature = "twilio")]
mod twilio {
    use super::{normalize_phone_number, SendResult, SmsSender};
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::time::Duration;
    use tracing::{debug, warn};

    const TWILIO_API_BASE: &str = "https://api.twilio.com/2010-04-01";

    /// Twilio account credentials and sending number
    #[derive(Debug, Clone)]
    pub struct TwilioConfig {
        pub account_sid: String,
        pub auth_token: String,
        pub from_number: String,
    }

    #[derive(Deserialize)]
    struct MessageResponse {
        sid: Option<String>,
        message: Option<String>,
    }

    /// Sends SMS through the Twilio Messages REST API.
    #[derive(Clone)]
    pub struct TwilioSmsSender {
        config: TwilioConfig,
        base_url: String,
        client: reqwest::Client,
    }

    impl TwilioSmsSender {
        pub fn new(config: TwilioConfig) -> crate::Result<Self> {
            Self::with_base_url(config, TWILIO_API_BASE)
        }

        /// Point the sender at a different API host.
        pub fn with_base_url(config: TwilioConfig, base_url: impl Into<String>) -> crate::Result<Self> {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .map_err(|e| crate::Error::Transport(e.to_string()))?;
            Ok(Self {
                config,
                base_url: base_url.into(),
                client,
            })
        }

        fn messages_url(&self) -> String {
            format!(
                "{}/Accounts/{}/Messages.json",
                self.base_url.trim_end_matches('/'),
                self.config.account_sid
            )
        }
    }

    #[async_trait]
    impl SmsSender for TwilioSmsSender {
        async fn send(&self, to: &str, message: &str) -> SendResult {
            let to = normalize_phone_number(to);
            let form = [
                ("To", to.as_str()),
                ("From", self.config.from_number.as_str()),
                ("Body", message),
            ];

            let response = match self
                .client
                .post(self.messages_url())
                .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
                .form(&form[..])
                .send()
                .await
            {
                Ok(r) => r,
                Err(e) => {
                    warn!(to = %to, error = %e, "Twilio request failed");
                    return SendResult::failed(e.to_string());
                }
            };

            let status = response.status();
            let body: MessageResponse = match response.json().await {
                Ok(b) => b,
                Err(e) => return SendResult::failed(format!("HTTP {}: {}", status, e)),
            };

            if status.is_success() {
                let sid = body.sid.unwrap_or_default();
                debug!(to = %to, sid = %sid, "Twilio accepted message");
                SendResult::delivered(sid)
            } else {
                SendResult::failed(
                    body.message
                        .unwrap_or_else(|| format!("Twilio returned HTTP {}", status)),
                )
            }
        }
    }

}
