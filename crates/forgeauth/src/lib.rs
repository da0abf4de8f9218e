//! # forgeauth
//!
//! Session and wallet authentication for a token-creation dashboard.
//!
//! Browser side, each tab runs a [`TabRuntime`]: a session manager that
//! expires idle sessions and locks out repeated failures, and a wallet
//! manager that tracks the injected wallet. Tabs keep each other in step
//! over a broadcast channel. Server side, [`require_signature`] checks
//! that every API request carries a fresh wallet signature.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use axum::{routing::get, Extension, Router};
//! use forgeauth::prelude::*;
//!
//! async fn me(Extension(user): Extension<AuthenticatedUser>) -> String {
//!     user.address.to_string()
//! }
//!
//! # async fn run() -> Result<(), ForgeAuthError> {
//! let server = ApiServer::builder()
//!     .bind("0.0.0.0:3001")
//!     .build(Router::new().route("/api/me", get(me)))
//!     .await?;
//! server.run().await
//! # }
//! ```

mod error;
mod middleware;
mod server;
mod tab;

pub use error::ForgeAuthError;
pub use middleware::{
    protect, require_signature, AuthConfig, AuthRejection, AuthenticatedUser,
    RequestAuthenticator,
};
pub use server::{router, ApiServer, ApiServerBuilder};
pub use tab::{TabRuntime, TabRuntimeBuilder};

pub use forgeauth_protocol as protocol;
pub use forgeauth_session as session;
pub use forgeauth_tick as tick;
pub use forgeauth_transport as transport;
pub use forgeauth_wallet as wallet;

pub mod prelude {
    pub use crate::{
        ApiServer, AuthConfig, AuthenticatedUser, ForgeAuthError,
        RequestAuthenticator, TabRuntime,
    };
    pub use forgeauth_protocol::{Address, AuthCredential, TabId, UserId};
    pub use forgeauth_session::{
        EthereumVerifier, Notifier, SessionConfig, SessionManager,
        SessionState, SignatureVerifier, TokenService,
    };
    pub use forgeauth_tick::{Clock, SystemClock};
    pub use forgeauth_transport::{LocalHub, SyncChannel};
    pub use forgeauth_wallet::{
        WalletConfig, WalletConnector, WalletManager, WalletState,
    };
}
