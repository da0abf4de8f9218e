//! Codec trait and implementations for turning sync envelopes into bytes.
//!
//! The tab sync transport only moves byte frames. Managers only deal in
//! [`SyncMessage`](crate::SyncMessage)s. A [`Codec`] is the strategy that
//! sits between them, so a binary format can replace JSON later without
//! touching either side.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` because managers hold their codec inside an
/// `Arc` that is shared with background listener tasks.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// JSON keeps frames readable in browser DevTools and in logs, which is
/// what you want while debugging why two tabs disagree about a session.
///
/// ## Example
///
/// ```rust
/// use forgeauth_protocol::{
///     Codec, JsonCodec, SessionStatePayload, SyncMessage, SyncPayload, TabId,
/// };
///
/// let codec = JsonCodec;
/// let message = SyncMessage::new(
///     SyncPayload::SessionState(SessionStatePayload { last_activity: 5_000 }),
///     5_000,
///     TabId::random(),
/// );
///
/// let bytes = codec.encode(&message).unwrap();
/// let decoded: SyncMessage = codec.decode(&bytes).unwrap();
/// assert_eq!(message, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
