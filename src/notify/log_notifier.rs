use super::{Notification, Notifier, Result};

/// Writes notifications to the log at warn level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        log::warn!(
            target: "restart notification",
            "{}: {}",
            notification.subject,
            notification.body
        );
        Ok(())
    }
}
