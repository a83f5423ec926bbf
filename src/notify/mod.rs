//! Notification delivery.

use crate::core::StagerResult;
use crate::di::{Notification, Notifier};
use async_trait::async_trait;

/// Writes notifications to the log instead of mailing them.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: Notification) -> StagerResult<()> {
        if notification.receiver.is_empty() {
            tracing::debug!(subject = %notification.subject, "notification has no receiver");
            return Ok(());
        }
        tracing::info!(
            sender = %notification.sender,
            receiver = %notification.receiver,
            subject = %notification.subject,
            attachments = notification.attachments.len(),
            "{}",
            notification.payload
        );
        Ok(())
    }
}
