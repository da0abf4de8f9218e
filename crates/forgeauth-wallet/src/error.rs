//! Error types for the wallet layer.

/// Errors returned by [`WalletManager`](crate::WalletManager).
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// No connector is registered.
    #[error("no wallet connector registered")]
    ConnectorUnavailable,

    /// The provider refused, or answered without an account or chain.
    /// State was rolled back to what it was before `connect()`.
    #[error("wallet connection failed: {0}")]
    ConnectionFailed(String),

    /// The connector has no way to switch chains.
    #[error("wallet connector cannot switch networks")]
    SwitchUnsupported,

    #[error("network switch failed: {0}")]
    SwitchFailed(#[source] ConnectorError),

    #[error("no wallet connected")]
    NotConnected,

    /// A `disconnect()` or newer `connect()` ran while this one was
    /// waiting on the provider. The stale result was discarded.
    #[error("connection attempt superseded")]
    Superseded,
}

/// Errors reported by a [`WalletConnector`](crate::WalletConnector).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConnectorError {
    #[error("user rejected the request")]
    UserRejected,

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("operation not supported by this connector")]
    Unsupported,

    #[error("provider error: {0}")]
    Provider(String),
}
