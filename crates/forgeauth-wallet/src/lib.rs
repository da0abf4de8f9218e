//! Wallet connection management for forgeauth.
//!
//! [`WalletManager`] is the single source of truth for "is a wallet
//! connected, to which address and chain, and is that chain allowed".
//! The wallet itself is reached through the [`WalletConnector`] port.
//!
//! ```text
//! Disconnected ──connect()──→ Connecting ──ok──→ Connected { address, chain_id }
//!      ↑                          │ err (rolled back)        │
//!      └──────────────────────────┴──disconnect() / accounts emptied──┘
//! ```
//!
//! A chain outside the allow-list is still `Connected`; the derived
//! `is_correct_network` flag is `false`.

#![allow(async_fn_in_trait)]

mod connector;
mod error;
mod events;
mod manager;
mod network;
mod state;

pub use connector::{
    EventListener, ListenerId, ProviderEvent, ProviderSession, WalletConnector,
};
pub use error::{ConnectorError, WalletError};
pub use events::{LogReload, ReloadHandler, SecurityEvent};
pub use manager::{WalletConfig, WalletManager, WalletManagerBuilder};
pub use network::ChainAllowList;
pub use state::{
    DisconnectCause, PeerWalletState, ReloadReason, WalletNotice, WalletState,
    WalletStatus,
};
