//! User-facing notifications
//!
//! Every user action and every terminal training transition produces exactly
//! one [`Notification`]. Where it ends up is decided by the
//! [`NotificationSink`] the reconciler was built with.

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tuneboard_common::metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Error,
    Warning,
    Info,
}

impl NotificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationLevel::Success => "success",
            NotificationLevel::Error => "error",
            NotificationLevel::Warning => "warning",
            NotificationLevel::Info => "info",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub message: String,
}

impl Notification {
    pub fn new(level: NotificationLevel, title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Success, title, message)
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Error, title, message)
    }

    pub fn warning(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Warning, title, message)
    }

    pub fn info(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(NotificationLevel::Info, title, message)
    }
}

/// Destination for notifications
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Deliver through a sink and count it
pub(crate) fn emit(sink: &dyn NotificationSink, notification: Notification) {
    metrics::record_notification(notification.level.as_str());
    sink.notify(notification);
}

/// Writes notifications to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify(&self, n: Notification) {
        match n.level {
            NotificationLevel::Error => error!(title = %n.title, "{}", n.message),
            NotificationLevel::Warning => warn!(title = %n.title, "{}", n.message),
            NotificationLevel::Success | NotificationLevel::Info => {
                info!(level = n.level.as_str(), title = %n.title, "{}", n.message)
            }
        }
    }
}

/// Forwards notifications to a receiver, e.g. a terminal renderer
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn notify(&self, notification: Notification) {
        // Receiver gone means nobody is watching any more
        let _ = self.tx.send(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_delivers_in_order() {
        let (sink, mut rx) = ChannelSink::new();
        emit(&sink, Notification::info("A", "first"));
        emit(&sink, Notification::error("B", "second"));

        assert_eq!(rx.recv().await.unwrap().title, "A");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, NotificationLevel::Error);
        assert_eq!(second.message, "second");
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.notify(Notification::success("Done", "ok"));
    }

    #[test]
    fn test_level_serializes_lowercase() {
        let value = serde_json::to_value(Notification::warning("W", "m")).unwrap();
        assert_eq!(value["level"], "warning");
    }
}
