//! In-process tab sync hub.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use crate::{EndpointId, Subscription, SyncChannel, TransportError};

/// Default number of frames buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 64;

/// A shared bus standing in for the browser's same-origin broadcast
/// channel. Every [`LocalChannel`] opened on one hub sees every frame sent
/// by any other.
#[derive(Clone)]
pub struct LocalHub {
    sender: broadcast::Sender<Vec<u8>>,
    next_id: Arc<AtomicU64>,
}

impl LocalHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Opens a new endpoint, one per simulated tab.
    pub fn open_tab(&self) -> LocalChannel {
        let id = EndpointId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (closed, _) = watch::channel(false);
        tracing::debug!(%id, "opened local sync endpoint");
        LocalChannel {
            id,
            sender: self.sender.clone(),
            closed,
        }
    }

    /// Number of live subscriptions across all endpoints.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// One tab's endpoint on a [`LocalHub`].
pub struct LocalChannel {
    id: EndpointId,
    sender: broadcast::Sender<Vec<u8>>,
    closed: watch::Sender<bool>,
}

impl LocalChannel {
    pub fn is_destroyed(&self) -> bool {
        *self.closed.borrow()
    }
}

impl SyncChannel for LocalChannel {
    fn id(&self) -> EndpointId {
        self.id
    }

    fn broadcast(&self, frame: &[u8]) -> Result<(), TransportError> {
        if self.is_destroyed() {
            return Err(TransportError::Closed);
        }
        // No receivers is not an error: a lone tab has nobody to tell.
        if self.sender.send(frame.to_vec()).is_err() {
            tracing::trace!(id = %self.id, "broadcast with no subscribers");
        }
        Ok(())
    }

    fn subscribe(&self) -> Subscription {
        Subscription::new(self.sender.subscribe(), self.closed.subscribe())
    }

    fn destroy(&self) {
        if self.closed.send_replace(true) {
            return;
        }
        tracing::debug!(id = %self.id, "destroyed local sync endpoint");
    }
}
