//! Wallet state, derived snapshots, and the notices the manager emits.

use forgeauth_protocol::{Address, WalletStatePayload};
use serde::Serialize;

use crate::ChainAllowList;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletStatus {
    Disconnected,
    /// A `connect()` is waiting on the provider.
    Connecting,
    Connected { address: Address, chain_id: u64 },
}

impl WalletStatus {
    pub(crate) fn snapshot(&self, allowed: &ChainAllowList) -> WalletState {
        match self {
            Self::Disconnected => WalletState::default(),
            Self::Connecting => WalletState {
                is_connecting: true,
                ..WalletState::default()
            },
            Self::Connected { address, chain_id } => WalletState {
                is_connected: true,
                is_connecting: false,
                address: Some(address.clone()),
                chain_id: Some(*chain_id),
                is_correct_network: allowed.allows(*chain_id),
            },
        }
    }

    pub(crate) fn payload(&self) -> WalletStatePayload {
        match self {
            Self::Connected { address, chain_id } => WalletStatePayload {
                is_connected: true,
                address: Some(address.clone()),
                chain_id: Some(*chain_id),
            },
            Self::Disconnected | Self::Connecting => WalletStatePayload {
                is_connected: false,
                address: None,
                chain_id: None,
            },
        }
    }
}

/// Read-only view of the wallet.
///
/// `address` and `chain_id` are `Some` exactly when `is_connected`.
/// `is_correct_network` is recomputed against the allow-list on every
/// snapshot and is `false` while disconnected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WalletState {
    pub is_connected: bool,
    pub is_connecting: bool,
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
    pub is_correct_network: bool,
}

/// Last wallet state another tab reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerWalletState {
    pub state: WalletStatePayload,
    /// Send time of the message it came from.
    pub timestamp: u64,
}

// ---------------------------------------------------------------------------
// Notices
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectCause {
    /// `disconnect()` was called.
    UserRequested,
    /// The provider reported an empty account list.
    AccountsEmptied,
    /// The provider reported a different account.
    AccountSwitched,
    ProviderDisconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    AccountChanged,
    ChainChanged,
}

/// Broadcast to every subscriber of
/// [`WalletManager::subscribe_notices`](crate::WalletManager::subscribe_notices).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletNotice {
    Connected { address: Address, chain_id: u64 },
    Disconnected { cause: DisconnectCause },
    ReloadRequested { reason: ReloadReason },
}
