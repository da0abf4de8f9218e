/// Errors that can occur in the tab sync transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The channel was destroyed; nothing can be sent on it anymore.
    #[error("sync channel closed")]
    Closed,

    /// Broadcasting a frame failed for a reason other than closure.
    #[error("broadcast failed: {0}")]
    BroadcastFailed(String),
}
