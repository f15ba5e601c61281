//! Fire-and-forget notification broadcast.
//!
//! A [`Notifier`] is a process-wide channel the session and API layers use to
//! surface user-facing notices (toasts) to whatever presentation layer is
//! listening. Emitting never blocks and never fails: if nobody is subscribed
//! the notice is dropped.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Default buffer size for the broadcast channel.
///
/// Slow subscribers that fall more than this far behind start losing the
/// oldest notices (`broadcast` lagging semantics), which is acceptable for
/// transient UI toasts.
pub const DEFAULT_CAPACITY: usize = 32;

/// Visual category of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Success,
    Error,
    Warning,
    Info,
}

/// A user-facing notice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Message text to display.
    pub message: String,
    /// Visual category.
    pub kind: NotificationKind,
    /// How long a visual representation should remain before auto-dismissal,
    /// in milliseconds. Absent (or zero) means "persist until manually
    /// dismissed".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Broadcast handle for emitting notifications.
///
/// Cheap to clone; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Notifier {
    /// Create a notifier with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit a notification to all current subscribers.
    ///
    /// `duration` is a display hint; `None` means the notice should persist
    /// until manually dismissed.
    pub fn emit(
        &self,
        message: impl Into<String>,
        kind: NotificationKind,
        duration: Option<Duration>,
    ) {
        let notification = Notification {
            message: message.into(),
            kind,
            duration_ms: duration.map(|d| d.as_millis() as u64),
        };

        if self.tx.send(notification).is_err() {
            tracing::debug!("notification emitted with no listeners");
        }
    }

    /// Subscribe to notifications emitted after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        notifier.emit("hello", NotificationKind::Info, None);

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.message, "hello");
        assert_eq!(notice.kind, NotificationKind::Info);
        assert_eq!(notice.duration_ms, None);
    }

    #[tokio::test]
    async fn test_emit_without_listeners_is_silent() {
        let notifier = Notifier::default();
        // No subscribers; must not panic or error.
        notifier.emit("dropped", NotificationKind::Error, None);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_duration_hint_in_millis() {
        let notifier = Notifier::default();
        let mut rx = notifier.subscribe();

        notifier.emit(
            "soon",
            NotificationKind::Warning,
            Some(Duration::from_secs(10)),
        );

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.duration_ms, Some(10_000));
    }

    #[tokio::test]
    async fn test_multiple_subscribers_each_receive() {
        let notifier = Notifier::default();
        let mut rx1 = notifier.subscribe();
        let mut rx2 = notifier.subscribe();

        notifier.emit("broadcast", NotificationKind::Success, None);

        assert_eq!(rx1.recv().await.unwrap().message, "broadcast");
        assert_eq!(rx2.recv().await.unwrap().message, "broadcast");
    }

    #[tokio::test]
    async fn test_clones_share_channel() {
        let notifier = Notifier::default();
        let clone = notifier.clone();
        let mut rx = notifier.subscribe();

        clone.emit("via clone", NotificationKind::Info, None);

        assert_eq!(rx.recv().await.unwrap().message, "via clone");
    }
}
