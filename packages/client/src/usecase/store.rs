//! Snapshot store.
//!
//! Holds the current snapshot in a `watch` channel and fans the typed
//! notifications out over a `broadcast` channel. Messages are applied one at
//! a time in arrival order.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::{
    domain::{Notification, Snapshot},
    infrastructure::dto::websocket::InboundMessage,
};

use super::reducer::reduce;

pub const NOTIFICATION_CAPACITY: usize = 256;

pub struct SnapshotStore {
    snapshot_tx: watch::Sender<Arc<Snapshot>>,
    notification_tx: broadcast::Sender<Notification>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Snapshot::default()));
        let (notification_tx, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            snapshot_tx,
            notification_tx,
        }
    }

    /// Reduce one message into the store.
    ///
    /// Returns `true` when the snapshot changed. Snapshot watchers are only
    /// woken on change; notifications are sent either way.
    pub fn apply(&self, message: &InboundMessage) -> bool {
        let mut notifications = Vec::new();
        let changed = self.snapshot_tx.send_if_modified(|current| {
            let transition = reduce(current, message);
            notifications = transition.notifications;
            if Arc::ptr_eq(&transition.snapshot, current) {
                false
            } else {
                *current = transition.snapshot;
                true
            }
        });

        tracing::debug!(
            "Applied '{}' (changed: {}, notifications: {})",
            message.kind.as_str(),
            changed,
            notifications.len()
        );
        for notification in notifications {
            // no receivers is fine
            let _ = self.notification_tx.send(notification);
        }
        changed
    }

    pub fn current(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot_tx.borrow())
    }

    pub fn subscribe_snapshot(&self) -> watch::Receiver<Arc<Snapshot>> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.notification_tx.subscribe()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
