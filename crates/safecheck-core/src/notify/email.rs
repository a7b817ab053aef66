//! Email delivery.

use async_trait::async_trait;
use tracing::info;

use super::SendResult;

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, subject: &str, text: &str, html: Option<&str>) -> SendResult;
}

/// Logs emails instead of sending them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleEmailSender;

#[async_trait]
impl EmailSender for ConsoleEmailSender {
    async fn send(&self, to: &str, subject: &str, text: &str, html: Option<&str>) -> SendResult {
        let message_id = format!("console-{}", uuid::Uuid::new_v4());
        info!(
            to = %to,
            subject = %subject,
            message_id = %message_id,
            has_html = html.is_some(),
            body = %text,
            "Email (console)"
        );
        SendResult::delivered(message_id)
    }
}
