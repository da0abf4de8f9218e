//! The port to an injected wallet provider.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::ConnectorError;

/// What the provider returned from a successful connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    /// Accounts exposed to the app, most relevant first. Raw strings as
    /// the provider sent them.
    pub accounts: Vec<String>,
    pub chain_id: Option<u64>,
}

/// Events the provider pushes after a connection exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// Empty when the user disconnected every account from the app.
    AccountsChanged(Vec<String>),
    ChainChanged(u64),
    Disconnect,
}

/// Callback registered with [`WalletConnector::on_event`].
pub type EventListener = Arc<dyn Fn(ProviderEvent) + Send + Sync>;

/// Handle for removing a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// An injected wallet (browser extension, WalletConnect bridge, ...).
///
/// The manager registers exactly one listener per connection and removes
/// it on every teardown path.
pub trait WalletConnector: Send + Sync + 'static {
    /// Asks the wallet to connect. May prompt the user.
    fn connect(
        &self,
    ) -> impl Future<Output = Result<ProviderSession, ConnectorError>> + Send;

    fn disconnect(&self) -> impl Future<Output = Result<(), ConnectorError>> + Send;

    /// Whether [`switch_chain`](Self::switch_chain) can work at all.
    fn supports_switch(&self) -> bool {
        false
    }

    /// Asks the wallet to move to `chain_id`. Returns the chain the wallet
    /// reports afterwards.
    fn switch_chain(
        &self,
        chain_id: u64,
    ) -> impl Future<Output = Result<u64, ConnectorError>> + Send {
        let _ = chain_id;
        async { Err(ConnectorError::Unsupported) }
    }

    /// `true` if the app is already authorized, so `connect` would not
    /// prompt. Silent reconnection only proceeds when this holds.
    fn is_authorized(&self) -> impl Future<Output = bool> + Send {
        async { true }
    }

    fn on_event(&self, listener: EventListener) -> ListenerId;

    fn remove_listener(&self, id: ListenerId);
}
