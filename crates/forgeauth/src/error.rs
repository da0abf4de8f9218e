//! Unified error type for forgeauth.

use forgeauth_protocol::{CredentialError, ProtocolError};
use forgeauth_session::{SessionError, SignatureError, TokenError};
use forgeauth_transport::TransportError;
use forgeauth_wallet::{ConnectorError, WalletError};

/// Top-level error that wraps all crate-specific errors.
///
/// The `#[from]` conversions let `?` lift any sub-crate error.
#[derive(Debug, thiserror::Error)]
pub enum ForgeAuthError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Credential(#[from] CredentialError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Signature(#[from] SignatureError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error(transparent)]
    Connector(#[from] ConnectorError),

    /// Binding or serving the HTTP listener failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
