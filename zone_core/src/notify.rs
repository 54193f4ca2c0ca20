//! Non-blocking notification queue for hosts implementing
//! [`WorldAccess::notify`](zone_runtime::WorldAccess::notify).
//!
//! The tick pushes messages without waiting; a host thread drains the
//! receiver and delivers them to players.

use crossbeam_channel::{unbounded, Receiver, Sender};
use zone_runtime::EntityId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub entity: EntityId,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct NotificationSender {
    sender: Sender<Notification>,
}

impl NotificationSender {
    /// Queues a message. Returns `false` once the receiving side is gone.
    pub fn send(&self, entity: EntityId, message: &str) -> bool {
        let queued = self
            .sender
            .send(Notification {
                entity,
                message: message.to_string(),
            })
            .is_ok();
        if !queued {
            tracing::debug!(target: "zones::effects", %entity, "notification.dropped");
        }
        queued
    }
}

pub fn notification_channel() -> (NotificationSender, Receiver<Notification>) {
    let (sender, receiver) = unbounded();
    (NotificationSender { sender }, receiver)
}

/// Everything queued so far, without blocking.
pub fn drain_notifications(receiver: &Receiver<Notification>) -> Vec<Notification> {
    receiver.try_iter().collect()
}
