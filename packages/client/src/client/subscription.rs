//! Consumer handle returned by `ConnectionManager::attach`.

use std::sync::Arc;

use tokio::sync::{
    broadcast::{self, error::RecvError},
    watch,
};

use crate::domain::{Notification, Snapshot};

use super::manager::ConnectionManager;

/// Receives status, snapshot and notification updates.
///
/// Dropping the subscription detaches it; when the last one goes the
/// connection is closed normally.
pub struct Subscription {
    manager: ConnectionManager,
    status: watch::Receiver<bool>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    notifications: broadcast::Receiver<Notification>,
}

impl Subscription {
    pub(crate) fn new(
        manager: ConnectionManager,
        status: watch::Receiver<bool>,
        snapshots: watch::Receiver<Arc<Snapshot>>,
        notifications: broadcast::Receiver<Notification>,
    ) -> Self {
        Self {
            manager,
            status,
            snapshots,
            notifications,
        }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    /// Current connection status
    pub fn status(&self) -> bool {
        *self.status.borrow()
    }

    /// Wait for the next status change
    pub async fn status_changed(&mut self) -> Option<bool> {
        self.status.changed().await.ok()?;
        Some(*self.status.borrow_and_update())
    }

    /// Wait until the status equals `connected`
    pub async fn wait_for_status(&mut self, connected: bool) {
        let _ = self.status.wait_for(|status| *status == connected).await;
    }

    pub fn snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Wait for the next snapshot change
    pub async fn snapshot_changed(&mut self) -> Option<Arc<Snapshot>> {
        self.snapshots.changed().await.ok()?;
        Some(Arc::clone(&self.snapshots.borrow_and_update()))
    }

    /// Next notification. `None` once the manager is gone.
    pub async fn next_notification(&mut self) -> Option<Notification> {
        loop {
            match self.notifications.recv().await {
                Ok(notification) => return Some(notification),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Subscriber lagged behind, {} notifications skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.manager.detach();
    }
}
