//! Composition root for one browser tab.

use std::sync::{Arc, Mutex, PoisonError};

use forgeauth_protocol::TabId;
use forgeauth_session::{
    EndReason, Notifier, SessionConfig, SessionManager, SessionState, TokenService,
    TracingNotifier,
};
use forgeauth_tick::{Clock, SystemClock};
use forgeauth_transport::SyncChannel;
use forgeauth_wallet::{
    LogReload, ReloadHandler, WalletConfig, WalletConnector, WalletManager, WalletNotice,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// The session and wallet managers of one tab, wired together.
///
/// Both managers share the tab id, so each ignores the other's echoes the
/// same way. Wallet notices drive the session:
///
/// - `Disconnected` ends the session (`EndReason::WalletDisconnected`)
/// - `Connected` counts as activity while a session is active
pub struct TabRuntime<T: TokenService, C: WalletConnector> {
    session: SessionManager<T>,
    wallet: WalletManager<C>,
    forwarder: Mutex<Option<JoinHandle<()>>>,
}

impl<T: TokenService, C: WalletConnector> TabRuntime<T, C> {
    /// `session_channel` and `wallet_channel` should be two endpoints of
    /// the same hub; each manager destroys its own on shutdown.
    pub fn builder(
        tokens: T,
        session_channel: Arc<dyn SyncChannel>,
        wallet_channel: Arc<dyn SyncChannel>,
    ) -> TabRuntimeBuilder<T, C> {
        TabRuntimeBuilder {
            tokens,
            connector: None,
            session_channel,
            wallet_channel,
            session_config: SessionConfig::default(),
            wallet_config: WalletConfig::default(),
            notifier: Arc::new(TracingNotifier),
            reload: Arc::new(LogReload),
            clock: Arc::new(SystemClock),
            tab_id: None,
        }
    }

    pub fn session(&self) -> &SessionManager<T> {
        &self.session
    }

    pub fn wallet(&self) -> &WalletManager<C> {
        &self.wallet
    }

    pub fn tab_id(&self) -> &TabId {
        self.session.tab_id()
    }

    /// Stops the notice forwarder and shuts both managers down. The
    /// session itself is not ended.
    pub fn shutdown(&self) {
        let forwarder = self
            .forwarder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        self.session.shutdown();
        self.wallet.shutdown();
        info!(tab = %self.tab_id(), "tab runtime shut down");
    }
}

impl<T: TokenService, C: WalletConnector> Drop for TabRuntime<T, C> {
    fn drop(&mut self) {
        let forwarder = self
            .forwarder
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
    }
}

fn spawn_forwarder<T: TokenService, C: WalletConnector>(
    session: SessionManager<T>,
    wallet: &WalletManager<C>,
) -> JoinHandle<()> {
    let mut notices = wallet.subscribe_notices();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(WalletNotice::Disconnected { cause }) => {
                    if session.state().is_live() {
                        debug!(?cause, "wallet gone, ending session");
                        session.end_with(EndReason::WalletDisconnected).await;
                    }
                }
                Ok(WalletNotice::Connected { .. }) => {
                    if session.state() == SessionState::Active {
                        session.update_activity();
                    }
                }
                Ok(WalletNotice::ReloadRequested { .. }) => {}
                Err(RecvError::Lagged(skipped)) => {
                    debug!(skipped, "wallet notice forwarder lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`TabRuntime`]. See [`TabRuntime::builder`].
pub struct TabRuntimeBuilder<T, C> {
    tokens: T,
    connector: Option<C>,
    session_channel: Arc<dyn SyncChannel>,
    wallet_channel: Arc<dyn SyncChannel>,
    session_config: SessionConfig,
    wallet_config: WalletConfig,
    notifier: Arc<dyn Notifier>,
    reload: Arc<dyn ReloadHandler>,
    clock: Arc<dyn Clock>,
    tab_id: Option<TabId>,
}

impl<T: TokenService, C: WalletConnector> TabRuntimeBuilder<T, C> {
    pub fn connector(mut self, connector: C) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.session_config = config;
        self
    }

    pub fn wallet_config(mut self, config: WalletConfig) -> Self {
        self.wallet_config = config;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn reload_handler(mut self, reload: Arc<dyn ReloadHandler>) -> Self {
        self.reload = reload;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn tab_id(mut self, tab_id: TabId) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    /// Builds both managers and starts their background tasks.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn start(self) -> TabRuntime<T, C> {
        let tab_id = self.tab_id.unwrap_or_else(TabId::random);

        let session = SessionManager::builder(self.tokens, self.session_channel)
            .config(self.session_config)
            .notifier(self.notifier)
            .clock(Arc::clone(&self.clock))
            .tab_id(tab_id.clone())
            .build();

        let mut wallet = WalletManager::builder()
            .config(self.wallet_config)
            .reload_handler(self.reload)
            .sync_channel(self.wallet_channel)
            .clock(self.clock)
            .tab_id(tab_id.clone());
        if let Some(connector) = self.connector {
            wallet = wallet.connector(connector);
        }
        let wallet = wallet.build();

        session.spawn_sync_listener();
        wallet.spawn_sync_listener();
        let forwarder = spawn_forwarder(session.clone(), &wallet);
        info!(tab = %tab_id, "tab runtime started");

        TabRuntime {
            session,
            wallet,
            forwarder: Mutex::new(Some(forwarder)),
        }
    }
}
