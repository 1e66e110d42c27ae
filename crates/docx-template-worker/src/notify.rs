use tracing::{info, warn};

/// A user-visible message about the outcome of an action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success(String),
    Error(String),
}

/// Where session notifications are shown (a toast area, a terminal, ...).
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Writes notifications to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl NotificationSink for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification {
            Notification::Success(message) => info!("{}", message),
            Notification::Error(message) => warn!("{}", message),
        }
    }
}
