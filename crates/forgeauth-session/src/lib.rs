//! Session management for forgeauth.
//!
//! This crate keeps one tab's authenticated session alive:
//!
//! 1. **Signature verification**: proving a wallet signed a message
//!    ([`verify_signature`], [`SignatureVerifier`]).
//! 2. **Lockout**: counting failed validations per identity and blocking
//!    after too many ([`FailedAttemptTracker`]).
//! 3. **Session lifetime**: inactivity timeout, token refresh, health
//!    checks, and cross-tab merging of activity ([`SessionManager`]).
//!
//! # How it fits in the stack
//!
//! ```text
//! Tab runtime / HTTP middleware (above)
//!     ↕
//! Session layer (this crate)  ← owns the session, talks to the token service
//!     ↕
//! Protocol + transport + tick (below)  ← envelopes, sync channel, timers
//! ```

#![allow(async_fn_in_trait)]

mod auth;
mod error;
mod lockout;
mod manager;
mod services;
mod session;

pub use auth::{
    canonical_message, personal_message_hash, recover_address,
    verify_signature, EthereumVerifier, SignatureVerifier,
};
pub use error::{SessionError, SignatureError, TokenError, VerifierError};
pub use lockout::{AttemptOutcome, FailedAttemptTracker};
pub use manager::{SessionManager, SessionManagerBuilder};
pub use services::{Notifier, TokenService, TracingNotifier};
pub use session::{
    EndReason, SessionConfig, SessionSnapshot, SessionState, UserCapabilities,
};
