//! Error types for the session layer.

use forgeauth_protocol::UserId;

/// Errors returned by [`SessionManager`](crate::SessionManager).
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The token service could not start a session. No session exists
    /// afterwards.
    #[error("failed to initialize session: {0}")]
    InitializationFailed(#[source] TokenError),

    /// Refreshing the token failed. The session was ended before this
    /// error was returned.
    #[error("failed to refresh session: {0}")]
    RefreshFailed(#[source] TokenError),

    /// The identity hit the failed-attempt limit and is locked out until
    /// the block expires. Returned even for otherwise valid credentials.
    #[error("account {0} is temporarily blocked")]
    AccountBlocked(UserId),
}

/// Errors reported by a [`TokenService`](crate::TokenService).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// The backend could not be reached.
    #[error("token service unavailable: {0}")]
    Unavailable(String),

    /// The backend answered, and said no.
    #[error("token rejected: {0}")]
    Rejected(String),
}

/// Why a signature could not be turned into a signer address.
///
/// Only used for logging. [`verify_signature`](crate::verify_signature)
/// folds every variant into `false`.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("signature must be 0x-prefixed")]
    MissingPrefix,

    #[error("signature is not hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("signature must be 65 bytes, got {0}")]
    Length(usize),

    #[error("recovery id must be 0/1 or 27/28, got {0}")]
    RecoveryId(u8),

    #[error("malformed r/s values")]
    Malformed,

    #[error("public key recovery failed")]
    Recovery,
}

/// Failure inside a pluggable [`SignatureVerifier`](crate::SignatureVerifier)
/// backend, as opposed to a signature that simply doesn't match.
#[derive(Debug, thiserror::Error)]
#[error("signature verifier failed: {0}")]
pub struct VerifierError(pub String);
