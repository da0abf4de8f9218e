//! Security audit events and page-reload requests.

use forgeauth_protocol::Address;
use tracing::{info, warn};

use crate::ReloadReason;

/// Wallet events recorded to the `forgeauth_wallet::security` log target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityEvent {
    ConnectionAttempt,
    ConnectionSuccess,
    ConnectionFailure,
    NetworkChange,
    AccountChange,
    Disconnect,
}

impl SecurityEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ConnectionAttempt => "wallet_connection_attempt",
            Self::ConnectionSuccess => "wallet_connection_success",
            Self::ConnectionFailure => "wallet_connection_failure",
            Self::NetworkChange => "wallet_network_change",
            Self::AccountChange => "wallet_account_change",
            Self::Disconnect => "wallet_disconnect",
        }
    }
}

pub(crate) fn record(
    event: SecurityEvent,
    address: Option<&Address>,
    chain_id: Option<u64>,
    detail: Option<&str>,
) {
    let address = address.map(Address::as_str);
    if event == SecurityEvent::ConnectionFailure {
        warn!(
            target: "forgeauth_wallet::security",
            event = event.as_str(),
            address,
            chain_id,
            detail,
            "wallet security event"
        );
    } else {
        info!(
            target: "forgeauth_wallet::security",
            event = event.as_str(),
            address,
            chain_id,
            detail,
            "wallet security event"
        );
    }
}

/// Reloads the page (or its equivalent) after an account or chain change.
///
/// Called once per change, after the manager has updated its state.
pub trait ReloadHandler: Send + Sync + 'static {
    fn request_reload(&self, reason: ReloadReason);
}

/// A [`ReloadHandler`] that only logs.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReload;

impl ReloadHandler for LogReload {
    fn request_reload(&self, reason: ReloadReason) {
        info!(?reason, "reload requested");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names_are_stable() {
        assert_eq!(SecurityEvent::ConnectionAttempt.as_str(), "wallet_connection_attempt");
        assert_eq!(SecurityEvent::NetworkChange.as_str(), "wallet_network_change");
        assert_eq!(SecurityEvent::Disconnect.as_str(), "wallet_disconnect");
    }
}
