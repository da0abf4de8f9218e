//! Wire protocol for forgeauth.
//!
//! This crate defines everything that crosses a boundary as data:
//!
//! - **Identity types** ([`UserId`], [`Address`], [`TabId`]): the owner of
//!   a session, the wallet that signed, the tab that sent a message.
//! - **Sync envelopes** ([`SyncMessage`], [`SyncPayload`]): what tabs of
//!   the same origin tell each other over the tab sync channel.
//! - **Bearer credentials** ([`AuthCredential`]): the
//!   `address:signature:timestamp` token carried by API requests.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes become bytes.
//! - **Errors** ([`ProtocolError`], [`CredentialError`]).
//!
//! # Architecture
//!
//! The protocol layer sits between the tab sync transport (raw bytes) and
//! the managers that own session and wallet state. It knows nothing about
//! timers, tokens, or providers.
//!
//! ```text
//! Transport (bytes) → Protocol (SyncMessage) → Session / Wallet managers
//! ```

mod codec;
mod credential;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use credential::AuthCredential;
pub use error::{CredentialError, ProtocolError};
pub use types::{
    Address, AuthStatePayload, SessionStatePayload, SyncKind, SyncMessage,
    SyncPayload, TabId, UserId, WalletStatePayload,
};
