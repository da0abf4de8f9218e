//! Error types for the protocol layer.
//!
//! Each forgeauth crate defines its own error enum. When you see a
//! `ProtocolError`, the problem is in the shape of some data (an envelope,
//! an address), not in networking, timers, or providers.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: a message from an incompatible tab build, a
    /// truncated frame, or a `type` outside the closed set.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A wallet address that isn't `0x` followed by 40 hex digits.
    #[error("invalid address: {0}")]
    InvalidAddress(String),
}

/// Why a bearer token failed to parse as `address:signature:timestamp`.
///
/// None of the variants carry the raw token. Rejection messages end up in
/// logs and HTTP bodies, and a credential must never be echoed there.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    /// The token did not split into exactly three `:`-delimited fields.
    #[error("expected 3 fields, found {0}")]
    FieldCount(usize),

    /// One of the three fields was empty.
    #[error("empty credential field")]
    EmptyField,

    /// The timestamp field is not a non-negative integer of milliseconds.
    #[error("timestamp is not a number")]
    InvalidTimestamp,
}
