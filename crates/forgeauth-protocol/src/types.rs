//! Identity types and cross-tab sync envelopes.
//!
//! Everything in this module either travels between tabs (serialized by a
//! [`Codec`](crate::Codec)) or identifies who a piece of state belongs to.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::ProtocolError;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// Opaque identifier of an authenticated user.
///
/// The session layer never interprets it. It is the key for the
/// failed-attempt counter, so the same value must be used for every
/// sign-in attempt of one person (switching sessions must not reset the
/// counter).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UserId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for UserId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// A wallet identity is a user identity: signing in with a wallet uses the
/// lowercase address as the user id.
impl From<Address> for UserId {
    fn from(value: Address) -> Self {
        Self(value.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An EVM account address, always stored as lowercase `0x` + 40 hex digits.
///
/// Normalizing on construction means two addresses compare equal exactly
/// when they refer to the same account, regardless of checksum casing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Number of hex digits after the `0x` prefix.
    pub const HEX_LEN: usize = 40;

    /// Parses and lowercases an address.
    ///
    /// Accepts `0x` or `0X` prefixes and surrounding whitespace.
    ///
    /// # Errors
    /// [`ProtocolError::InvalidAddress`] if the prefix is missing, the
    /// length is wrong, or a digit isn't hex.
    pub fn parse(raw: &str) -> Result<Self, ProtocolError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| {
                ProtocolError::InvalidAddress("missing 0x prefix".into())
            })?;

        if digits.len() != Self::HEX_LEN {
            return Err(ProtocolError::InvalidAddress(format!(
                "expected {} hex digits, found {}",
                Self::HEX_LEN,
                digits.len()
            )));
        }
        if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ProtocolError::InvalidAddress(
                "non-hex digit".into(),
            ));
        }

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// Builds an address from the 20 raw bytes of an account.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        let hex: String = bytes.iter().map(|b| format!("{b:02x}")).collect();
        Self(format!("0x{hex}"))
    }

    /// The lowercase `0x…` form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an unparsed address string.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other.trim())
    }
}

impl TryFrom<String> for Address {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Random identifier of one browser tab.
///
/// Every envelope carries the sender's `TabId`, and every receiver drops
/// envelopes carrying its own. Broadcast channels deliver to the sender
/// too, so without this a tab would merge its own echoes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(String);

impl TabId {
    /// Generates a fresh 32-character hex identifier (128 bits).
    pub fn random() -> Self {
        let bytes: [u8; 16] = rand::rng().random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Borrow the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TabId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Peer-supplied, so not necessarily ASCII.
        let short: String = self.0.chars().take(8).collect();
        write!(f, "tab-{short}")
    }
}

// ---------------------------------------------------------------------------
// Sync payloads
// ---------------------------------------------------------------------------

/// The closed set of cross-tab message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncKind {
    AuthState,
    WalletState,
    SessionState,
}

impl fmt::Display for SyncKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AuthState => "AUTH_STATE",
            Self::WalletState => "WALLET_STATE",
            Self::SessionState => "SESSION_STATE",
        };
        f.write_str(name)
    }
}

/// A tab signed in or out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStatePayload {
    pub user: Option<UserId>,
    pub signed_in: bool,
}

/// A tab's wallet changed.
///
/// Carries the address and chain only. The provider connection itself is
/// owned by each tab and never leaves it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletStatePayload {
    pub is_connected: bool,
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
}

/// A tab saw user activity.
///
/// `last_activity` is the origin tab's own activity clock. Receivers merge
/// it with `max`, and never substitute the envelope timestamp for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatePayload {
    pub last_activity: u64,
}

/// Type-specific content of a [`SyncMessage`].
///
/// Adjacently tagged, so JSON looks like
/// `{"type": "SESSION_STATE", "data": {"last_activity": 123}}` and a
/// receiver can dispatch on `type` before touching `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncPayload {
    AuthState(AuthStatePayload),
    WalletState(WalletStatePayload),
    SessionState(SessionStatePayload),
}

impl SyncPayload {
    /// Which member of the closed set this payload is.
    pub fn kind(&self) -> SyncKind {
        match self {
            Self::AuthState(_) => SyncKind::AuthState,
            Self::WalletState(_) => SyncKind::WalletState,
            Self::SessionState(_) => SyncKind::SessionState,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncMessage
// ---------------------------------------------------------------------------

/// The cross-tab envelope.
///
/// ```text
/// ┌──────────────────────────────────────────┐
/// │ timestamp: 1700000000000                 │  ← sender clock at send
/// │ tab_id: "9f1c…"                          │  ← drop own echoes
/// │ ┌──────────────────────────────────────┐ │
/// │ │ payload: SESSION_STATE {…}           │ │  ← merged by receivers
/// │ └──────────────────────────────────────┘ │
/// └──────────────────────────────────────────┘
/// ```
///
/// Receivers must apply envelopes idempotently: delivering the same
/// envelope twice leaves the same state as delivering it once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMessage {
    pub payload: SyncPayload,
    pub timestamp: u64,
    pub tab_id: TabId,
}

impl SyncMessage {
    pub fn new(payload: SyncPayload, timestamp: u64, tab_id: TabId) -> Self {
        Self {
            payload,
            timestamp,
            tab_id,
        }
    }

    pub fn kind(&self) -> SyncKind {
        self.payload.kind()
    }

    /// `true` if this envelope was sent by the given tab.
    pub fn is_from(&self, tab_id: &TabId) -> bool {
        &self.tab_id == tab_id
    }
}

// =========================================================================
// Tests
// =========================================================================
