//! User-facing feedback emitted by the session.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: u64,
    pub message: String,
    pub severity: Severity,
    /// Game tick the notification was raised on.
    pub tick: u64,
}

/// Fire-and-forget receiver for notifications. Implementations must not block.
pub trait NotificationSink {
    fn notify(&mut self, message: String, severity: Severity, tick: u64);
}

/// Default sink: buffers notifications until the caller drains them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationQueue {
    pending: Vec<Notification>,
    next_id: u64,
}

impl NotificationQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn pending(&self) -> &[Notification] {
        &self.pending
    }

    /// Take every buffered notification, oldest first.
    pub fn drain(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.pending)
    }
}

impl NotificationSink for NotificationQueue {
    fn notify(&mut self, message: String, severity: Severity, tick: u64) {
        self.next_id += 1;
        self.pending.push(Notification {
            id: self.next_id,
            message,
            severity,
            tick,
        });
    }
}
