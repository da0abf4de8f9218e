//! Tab sync transport for forgeauth.
//!
//! Tabs of the same origin coordinate only by passing messages. This crate
//! provides the [`SyncChannel`] port those messages travel over, and a
//! [`LocalHub`] that connects several simulated tabs inside one process.
//!
//! The transport moves opaque byte frames. Encoding is the protocol
//! crate's job, and so is dropping a tab's own echoes: a broadcast is
//! delivered to every subscriber, including the sender's.
//!
//! # Feature Flags
//!
//! - `local` (default): in-process hub built on `tokio::sync::broadcast`

mod error;
#[cfg(feature = "local")]
mod local;

pub use error::TransportError;
#[cfg(feature = "local")]
pub use local::{LocalChannel, LocalHub};

use std::fmt;

use tokio::sync::{broadcast, watch};

/// Opaque identifier for one endpoint (one tab) on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointId(u64);

impl EndpointId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "endpoint-{}", self.0)
    }
}

/// A broadcast channel shared by every tab of one origin.
///
/// All methods are synchronous: broadcasting never waits for receivers,
/// and a slow receiver only hurts itself.
pub trait SyncChannel: Send + Sync + 'static {
    /// Identifier of this endpoint, for logging.
    fn id(&self) -> EndpointId;

    /// Sends a frame to every current subscriber, this endpoint included.
    ///
    /// # Errors
    /// [`TransportError::Closed`] once [`destroy`](Self::destroy) ran.
    fn broadcast(&self, frame: &[u8]) -> Result<(), TransportError>;

    /// Starts receiving frames. Dropping the subscription unsubscribes.
    fn subscribe(&self) -> Subscription;

    /// Closes this endpoint. Pending subscriptions end with `Ok(None)`.
    /// Calling it again is a no-op.
    fn destroy(&self);
}

/// A live subscription to a [`SyncChannel`].
pub struct Subscription {
    frames: broadcast::Receiver<Vec<u8>>,
    closed: watch::Receiver<bool>,
}

impl Subscription {
    /// Wraps a broadcast receiver and the endpoint's close signal.
    pub fn new(
        frames: broadcast::Receiver<Vec<u8>>,
        closed: watch::Receiver<bool>,
    ) -> Self {
        Self { frames, closed }
    }

    /// Waits for the next frame.
    ///
    /// Returns `Ok(None)` when the endpoint is destroyed or every sender
    /// is gone. A receiver that fell behind skips the frames it missed and
    /// keeps going; sync messages are merged by max, so a later frame
    /// supersedes the dropped ones.
    pub async fn recv(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        if *self.closed.borrow() {
            return Ok(None);
        }
        loop {
            tokio::select! {
                biased;
                _ = self.closed.wait_for(|closed| *closed) => return Ok(None),
                frame = self.frames.recv() => match frame {
                    Ok(frame) => return Ok(Some(frame)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "sync subscriber lagged, frames dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => return Ok(None),
                },
            }
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &*self.closed.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_id_display() {
        assert_eq!(EndpointId::new(7).to_string(), "endpoint-7");
    }

    #[test]
    fn test_endpoint_id_hash_works_as_map_key() {
        use std::collections::HashMap;
        let mut map = HashMap::new();
        map.insert(EndpointId::new(1), "tab-a");
        map.insert(EndpointId::new(2), "tab-b");
        assert_eq!(map[&EndpointId::new(1)], "tab-a");
        assert_eq!(EndpointId::new(2).into_inner(), 2);
    }

    #[tokio::test]
    async fn test_subscription_recv_after_close_returns_none() {
        let (tx, rx) = broadcast::channel::<Vec<u8>>(4);
        let (close_tx, close_rx) = watch::channel(false);
        let mut sub = Subscription::new(rx, close_rx);

        tx.send(b"one".to_vec()).unwrap();
        assert_eq!(sub.recv().await.unwrap(), Some(b"one".to_vec()));

        close_tx.send(true).unwrap();
        assert_eq!(sub.recv().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_subscription_lagged_skips_to_newest() {
        let (tx, rx) = broadcast::channel::<Vec<u8>>(2);
        let (_close_tx, close_rx) = watch::channel(false);
        let mut sub = Subscription::new(rx, close_rx);

        for i in 0..5u8 {
            tx.send(vec![i]).unwrap();
        }

        // Capacity 2: frames 0..=2 were overwritten.
        assert_eq!(sub.recv().await.unwrap(), Some(vec![3]));
        assert_eq!(sub.recv().await.unwrap(), Some(vec![4]));
    }
}
