//! In-process broadcast of user-facing notices
//!
//! The guard and the interceptor publish "why this happened" text here; whatever
//! side panel or alert widget is mounted subscribes. Publishers never know who listens.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// A step page was blocked by the guard.
    AccessDenied,
    /// The flow was reset after the user confirmed leaving it.
    FlowReset,
    /// A previous session was interrupted and has been reset.
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowNotice {
    pub kind: NoticeKind,
    pub message: String,
}

impl FlowNotice {
    pub fn new(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Broadcast channel of notices. Cloning shares the channel.
#[derive(Debug, Clone)]
pub struct NoticeBus {
    sender: broadcast::Sender<FlowNotice>,
}

impl NoticeBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FlowNotice> {
        self.sender.subscribe()
    }

    /// Publish a notice. Having no subscribers is fine.
    pub fn publish(&self, notice: FlowNotice) {
        match self.sender.send(notice) {
            Ok(receivers) => tracing::debug!(receivers, "Notice published"),
            Err(broadcast::error::SendError(notice)) => {
                tracing::debug!(kind = ?notice.kind, "Notice dropped, no subscribers");
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NoticeBus {
    fn default() -> Self {
        Self::new(16)
    }
}
