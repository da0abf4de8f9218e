//! The wallet manager: one tab's view of the injected wallet.
//!
//! Every `connect()` and every teardown bumps an epoch. A provider answer
//! or provider event carrying an older epoch belongs to a connection that
//! no longer exists and is dropped, so a slow `connect()` can never
//! overwrite a `disconnect()` that happened while it was waiting. A
//! failed `connect()` that nothing raced with hands the epoch back along
//! with the status, so the previous connection keeps receiving its events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use forgeauth_protocol::{Address, Codec, JsonCodec, SyncMessage, SyncPayload, TabId};
use forgeauth_tick::{Clock, SystemClock};
use forgeauth_transport::SyncChannel;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::events::{self, LogReload, ReloadHandler, SecurityEvent};
use crate::{
    ChainAllowList, DisconnectCause, EventListener, ListenerId, PeerWalletState,
    ProviderEvent, ProviderSession, ReloadReason, WalletConnector, WalletError,
    WalletNotice, WalletState, WalletStatus,
};

const NOTICE_CAPACITY: usize = 32;

// ---------------------------------------------------------------------------
// WalletConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WalletConfig {
    pub allowed_chains: ChainAllowList,
    /// Connect attempts made by [`WalletManager::attempt_reconnection`].
    pub reconnect_attempts: u32,
    /// Delay after the first failed attempt. Doubles after each failure.
    pub reconnect_base_delay: Duration,
    pub reconnect_max_delay: Duration,
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            allowed_chains: ChainAllowList::default(),
            reconnect_attempts: 3,
            reconnect_base_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(5),
        }
    }
}

impl WalletConfig {
    pub fn validated(mut self) -> Self {
        if self.reconnect_attempts == 0 {
            warn!("reconnect_attempts of 0 would never reconnect, using 1");
            self.reconnect_attempts = 1;
        }
        if self.reconnect_max_delay < self.reconnect_base_delay {
            warn!(
                base_ms = self.reconnect_base_delay.as_millis() as u64,
                max_ms = self.reconnect_max_delay.as_millis() as u64,
                "reconnect max delay below base delay, raising it"
            );
            self.reconnect_max_delay = self.reconnect_base_delay;
        }
        self
    }

    /// Wait after failed attempt number `attempt` (1-based).
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.reconnect_base_delay
            .saturating_mul(factor)
            .min(self.reconnect_max_delay)
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

type EpochEvent = (u64, ProviderEvent);

struct Core<C> {
    status: WalletStatus,
    epoch: u64,
    connector: Option<Arc<C>>,
    /// Registered while, and only while, a connection exists.
    listener: Option<ListenerId>,
    allowed: ChainAllowList,
    peers: HashMap<TabId, PeerWalletState>,
    events_rx: Option<mpsc::UnboundedReceiver<EpochEvent>>,
    pump: Option<JoinHandle<()>>,
    sync_listener: Option<JoinHandle<()>>,
}

struct Shared<C> {
    config: WalletConfig,
    reload: Arc<dyn ReloadHandler>,
    notices: broadcast::Sender<WalletNotice>,
    channel: Option<Arc<dyn SyncChannel>>,
    clock: Arc<dyn Clock>,
    codec: JsonCodec,
    tab_id: TabId,
    reconnecting: AtomicBool,
    events_tx: mpsc::UnboundedSender<EpochEvent>,
    core: Mutex<Core<C>>,
}

/// Manages the wallet connection of a single tab.
///
/// A cheap `Clone` handle. Provider events are queued by the listener and
/// applied on a background task that holds only a weak reference.
pub struct WalletManager<C: WalletConnector> {
    shared: Arc<Shared<C>>,
}

impl<C: WalletConnector> Clone for WalletManager<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Clears the reconnection flag however the attempt ends.
struct ReconnectGuard<'a>(&'a AtomicBool);

impl Drop for ReconnectGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C: WalletConnector> WalletManager<C> {
    pub fn builder() -> WalletManagerBuilder<C> {
        WalletManagerBuilder {
            connector: None,
            config: WalletConfig::default(),
            reload: Arc::new(LogReload),
            channel: None,
            clock: Arc::new(SystemClock),
            tab_id: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core<C>> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn connector(&self) -> Option<Arc<C>> {
        self.lock().connector.clone()
    }

    // -----------------------------------------------------------------------
    // Connection lifecycle
    // -----------------------------------------------------------------------

    /// Replaces the connector. Any connection through the old one is torn
    /// down first.
    pub fn register_connector(&self, connector: C) {
        self.teardown(DisconnectCause::ProviderDisconnected);
        self.lock().connector = Some(Arc::new(connector));
        debug!("wallet connector registered");
    }

    /// Connects through the registered connector.
    ///
    /// # Errors
    /// - [`WalletError::ConnectorUnavailable`] without a connector
    /// - [`WalletError::ConnectionFailed`] if the provider refuses or
    ///   returns no account or chain; the previous state is restored
    /// - [`WalletError::Superseded`] if a disconnect or another connect
    ///   ran meanwhile; the provider's answer is discarded
    pub async fn connect(&self) -> Result<WalletState, WalletError> {
        let connector = self.connector().ok_or(WalletError::ConnectorUnavailable)?;
        let (epoch, previous) = {
            let mut core = self.lock();
            let previous_epoch = core.epoch;
            core.epoch += 1;
            let previous_status = std::mem::replace(&mut core.status, WalletStatus::Connecting);
            (core.epoch, (previous_epoch, previous_status))
        };
        events::record(SecurityEvent::ConnectionAttempt, None, None, None);

        let outcome = match connector.connect().await {
            Ok(session) => parse_session(session),
            Err(e) => Err(e.to_string()),
        };
        let (address, chain_id) = match outcome {
            Ok(connected) => connected,
            Err(reason) => {
                {
                    let mut core = self.lock();
                    // The listener of a connection we fall back to is
                    // tagged with its own epoch.
                    if core.epoch == epoch {
                        (core.epoch, core.status) = previous;
                    }
                }
                events::record(SecurityEvent::ConnectionFailure, None, None, Some(reason.as_str()));
                return Err(WalletError::ConnectionFailed(reason));
            }
        };

        let listener_id = connector.on_event(self.event_listener(epoch));
        let (stale_listener, superseded) = {
            let mut core = self.lock();
            if core.epoch == epoch {
                core.status = WalletStatus::Connected {
                    address: address.clone(),
                    chain_id,
                };
                (core.listener.replace(listener_id), false)
            } else {
                (Some(listener_id), true)
            }
        };
        if let Some(id) = stale_listener {
            connector.remove_listener(id);
        }
        if superseded {
            debug!(epoch, "connect superseded, discarding provider session");
            // Undo only when the newer operation was a disconnect.
            let undo = self.lock().status == WalletStatus::Disconnected;
            if undo {
                if let Err(e) = connector.disconnect().await {
                    debug!(error = %e, "undoing superseded connect failed");
                }
            }
            return Err(WalletError::Superseded);
        }
        self.ensure_event_pump();

        info!(
            %address,
            chain_id,
            family = ChainAllowList::family(chain_id),
            "wallet connected"
        );
        events::record(SecurityEvent::ConnectionSuccess, Some(&address), Some(chain_id), None);
        let _ = self
            .shared
            .notices
            .send(WalletNotice::Connected { address, chain_id });
        self.broadcast_state();
        Ok(self.state())
    }

    /// Disconnects. The local state is reset before the provider is asked,
    /// so this ends `Disconnected` even when the provider call fails.
    pub async fn disconnect(&self) {
        let connector = self.connector();
        self.teardown(DisconnectCause::UserRequested);
        if let Some(connector) = connector {
            if let Err(e) = connector.disconnect().await {
                warn!(error = %e, "provider disconnect failed");
            }
        }
    }

    /// Asks the wallet to move to `chain_id`.
    ///
    /// # Errors
    /// [`WalletError::SwitchUnsupported`] when the connector cannot switch,
    /// [`WalletError::NotConnected`] without a connection,
    /// [`WalletError::SwitchFailed`] when the provider refuses.
    pub async fn switch_network(&self, chain_id: u64) -> Result<WalletState, WalletError> {
        let connector = self.connector().ok_or(WalletError::ConnectorUnavailable)?;
        if !connector.supports_switch() {
            return Err(WalletError::SwitchUnsupported);
        }
        let epoch = {
            let core = self.lock();
            if !matches!(core.status, WalletStatus::Connected { .. }) {
                return Err(WalletError::NotConnected);
            }
            core.epoch
        };

        let reported = connector.switch_chain(chain_id).await.map_err(|e| {
            warn!(chain_id, error = %e, "network switch failed");
            WalletError::SwitchFailed(e)
        })?;

        let updated = {
            let mut core = self.lock();
            let current = core.epoch == epoch;
            match &mut core.status {
                WalletStatus::Connected { chain_id: slot, .. } if current => {
                    *slot = reported;
                    true
                }
                _ => false,
            }
        };
        if !updated {
            return Err(WalletError::Superseded);
        }

        events::record(
            SecurityEvent::NetworkChange,
            None,
            Some(reported),
            ChainAllowList::family(reported),
        );
        self.broadcast_state();
        Ok(self.state())
    }

    /// Silently restores a connection the user already authorized.
    ///
    /// Makes up to `reconnect_attempts` attempts with exponential backoff.
    /// Never fails: returns whether a connection exists afterwards. A call
    /// made while another is running returns `false` at once.
    pub async fn attempt_reconnection(&self) -> bool {
        if self.shared.reconnecting.swap(true, Ordering::AcqRel) {
            debug!("reconnection already in progress");
            return false;
        }
        let _guard = ReconnectGuard(&self.shared.reconnecting);

        if self.state().is_connected {
            return true;
        }
        let Some(connector) = self.connector() else {
            return false;
        };
        if !connector.is_authorized().await {
            debug!("wallet not authorized, skipping silent reconnect");
            return false;
        }

        let attempts = self.shared.config.reconnect_attempts;
        for attempt in 1..=attempts {
            match self.connect().await {
                Ok(_) => {
                    info!(attempt, "wallet reconnected");
                    return true;
                }
                Err(WalletError::Superseded) => return false,
                Err(e) => {
                    debug!(attempt, error = %e, "reconnection attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.shared.config.reconnect_delay(attempt)).await;
                    }
                }
            }
        }
        warn!(attempts, "wallet reconnection gave up");
        false
    }

    pub fn is_reconnecting(&self) -> bool {
        self.shared.reconnecting.load(Ordering::Acquire)
    }

    // -----------------------------------------------------------------------
    // Provider events
    // -----------------------------------------------------------------------

    /// Applies a provider event to the current connection.
    ///
    /// - `AccountsChanged([])` and `Disconnect` end the connection.
    /// - A different account ends it and requests a reload.
    /// - `ChainChanged` updates the chain and always requests a reload.
    pub fn handle_provider_event(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::AccountsChanged(accounts) => match accounts.first() {
                None => {
                    self.teardown(DisconnectCause::AccountsEmptied);
                }
                Some(account) => self.on_account_changed(account),
            },
            ProviderEvent::ChainChanged(chain_id) => self.on_chain_changed(chain_id),
            ProviderEvent::Disconnect => {
                self.teardown(DisconnectCause::ProviderDisconnected);
            }
        }
    }

    fn on_account_changed(&self, account: &str) {
        let current = match &self.lock().status {
            WalletStatus::Connected { address, .. } => Some(address.clone()),
            _ => None,
        };
        let Some(current) = current else {
            debug!("account change while not connected, ignoring");
            return;
        };
        if current.matches(account) {
            return;
        }

        let next = Address::parse(account).ok();
        events::record(SecurityEvent::AccountChange, next.as_ref(), None, None);
        self.teardown(DisconnectCause::AccountSwitched);
        self.request_reload(ReloadReason::AccountChanged);
    }

    fn on_chain_changed(&self, chain_id: u64) {
        let updated = {
            let mut core = self.lock();
            match &mut core.status {
                WalletStatus::Connected { chain_id: current, .. } => {
                    *current = chain_id;
                    true
                }
                _ => false,
            }
        };
        events::record(
            SecurityEvent::NetworkChange,
            None,
            Some(chain_id),
            ChainAllowList::family(chain_id),
        );
        if updated {
            self.broadcast_state();
        }
        self.request_reload(ReloadReason::ChainChanged);
    }

    fn request_reload(&self, reason: ReloadReason) {
        let _ = self
            .shared
            .notices
            .send(WalletNotice::ReloadRequested { reason });
        self.shared.reload.request_reload(reason);
    }

    /// Resets to `Disconnected` and unregisters the provider listener.
    /// Returns whether a connection existed.
    fn teardown(&self, cause: DisconnectCause) -> bool {
        let (previous, listener, connector) = {
            let mut core = self.lock();
            core.epoch += 1;
            let previous = std::mem::replace(&mut core.status, WalletStatus::Disconnected);
            (previous, core.listener.take(), core.connector.clone())
        };
        if let (Some(id), Some(connector)) = (listener, connector) {
            connector.remove_listener(id);
        }

        let address = match &previous {
            WalletStatus::Connected { address, .. } => Some(address.clone()),
            _ => None,
        };
        if previous != WalletStatus::Disconnected {
            self.broadcast_state();
        }
        if address.is_none() {
            return false;
        }

        info!(?cause, "wallet disconnected");
        events::record(
            SecurityEvent::Disconnect,
            address.as_ref(),
            None,
            Some(cause_label(cause)),
        );
        let _ = self
            .shared
            .notices
            .send(WalletNotice::Disconnected { cause });
        true
    }

    fn event_listener(&self, epoch: u64) -> EventListener {
        let tx = self.shared.events_tx.clone();
        Arc::new(move |event| {
            // The pump is gone once the manager is dropped.
            let _ = tx.send((epoch, event));
        })
    }

    fn ensure_event_pump(&self) {
        let Some(mut rx) = self.lock().events_rx.take() else {
            return;
        };
        let weak = Arc::downgrade(&self.shared);

        let pump = tokio::spawn(async move {
            while let Some((epoch, event)) = rx.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let manager = WalletManager { shared };
                if manager.lock().epoch != epoch {
                    debug!(?event, "dropping event from a closed connection");
                    continue;
                }
                manager.handle_provider_event(event);
            }
            debug!("wallet event pump stopped");
        });
        self.lock().pump = Some(pump);
    }

    // -----------------------------------------------------------------------
    // Network allow-list
    // -----------------------------------------------------------------------

    /// Returns `true` if the chain was newly allowed.
    pub fn allow_network(&self, chain_id: u64) -> bool {
        self.lock().allowed.allow(chain_id)
    }

    /// Returns `true` if the chain was allowed before.
    pub fn disallow_network(&self, chain_id: u64) -> bool {
        self.lock().allowed.disallow(chain_id)
    }

    pub fn allowed_networks(&self) -> ChainAllowList {
        self.lock().allowed.clone()
    }

    // -----------------------------------------------------------------------
    // Cross-tab sync
    // -----------------------------------------------------------------------

    /// Records another tab's wallet state. Own echoes and other message
    /// types are ignored. Per tab, the newest message wins.
    pub fn apply_sync_message(&self, message: &SyncMessage) {
        if message.is_from(&self.shared.tab_id) {
            return;
        }
        let SyncPayload::WalletState(payload) = &message.payload else {
            return;
        };

        let mut core = self.lock();
        let newer = core
            .peers
            .get(&message.tab_id)
            .is_none_or(|known| message.timestamp >= known.timestamp);
        if newer {
            core.peers.insert(
                message.tab_id.clone(),
                PeerWalletState {
                    state: payload.clone(),
                    timestamp: message.timestamp,
                },
            );
        }
    }

    /// Starts applying peer wallet messages in the background. Does
    /// nothing without a sync channel.
    pub fn spawn_sync_listener(&self) {
        let Some(channel) = &self.shared.channel else {
            debug!("no sync channel, wallet state stays local");
            return;
        };
        let mut subscription = channel.subscribe();
        let weak = Arc::downgrade(&self.shared);

        let listener = tokio::spawn(async move {
            loop {
                let frame = match subscription.recv().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "wallet sync subscription failed");
                        break;
                    }
                };
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let manager = WalletManager { shared };
                match manager.shared.codec.decode::<SyncMessage>(&frame) {
                    Ok(message) => manager.apply_sync_message(&message),
                    Err(e) => debug!(error = %e, "dropping undecodable sync frame"),
                }
            }
            debug!("wallet sync listener stopped");
        });

        if let Some(previous) = self.lock().sync_listener.replace(listener) {
            previous.abort();
        }
    }

    fn broadcast_state(&self) {
        let Some(channel) = &self.shared.channel else {
            return;
        };
        let payload = self.lock().status.payload();
        let message = SyncMessage::new(
            SyncPayload::WalletState(payload),
            self.shared.clock.now_millis(),
            self.shared.tab_id.clone(),
        );
        match self.shared.codec.encode(&message) {
            Ok(frame) => {
                if let Err(e) = channel.broadcast(&frame) {
                    warn!(error = %e, "failed to broadcast wallet state");
                }
            }
            Err(e) => warn!(error = %e, "failed to encode wallet state"),
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn state(&self) -> WalletState {
        let core = self.lock();
        core.status.snapshot(&core.allowed)
    }

    pub fn status(&self) -> WalletStatus {
        self.lock().status.clone()
    }

    /// Wallet states reported by other tabs, newest per tab.
    pub fn peer_states(&self) -> Vec<(TabId, PeerWalletState)> {
        self.lock()
            .peers
            .iter()
            .map(|(tab, state)| (tab.clone(), state.clone()))
            .collect()
    }

    /// The most recent state any other tab reported.
    pub fn latest_peer_state(&self) -> Option<PeerWalletState> {
        self.lock()
            .peers
            .values()
            .max_by_key(|peer| peer.timestamp)
            .cloned()
    }

    pub fn subscribe_notices(&self) -> broadcast::Receiver<WalletNotice> {
        self.shared.notices.subscribe()
    }

    pub fn tab_id(&self) -> &TabId {
        &self.shared.tab_id
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Unregisters the provider listener, stops background tasks and
    /// destroys the sync channel. The wallet state is left as it is.
    pub fn shutdown(&self) {
        let (listener, connector, pump, sync_listener) = {
            let mut core = self.lock();
            core.epoch += 1;
            (
                core.listener.take(),
                core.connector.clone(),
                core.pump.take(),
                core.sync_listener.take(),
            )
        };
        if let (Some(id), Some(connector)) = (listener, connector) {
            connector.remove_listener(id);
        }
        for task in [pump, sync_listener].into_iter().flatten() {
            task.abort();
        }
        if let Some(channel) = &self.shared.channel {
            channel.destroy();
        }
        info!(tab = %self.shared.tab_id, "wallet manager shut down");
    }
}

fn parse_session(session: ProviderSession) -> Result<(Address, u64), String> {
    let account = session
        .accounts
        .first()
        .ok_or_else(|| "provider returned no account".to_string())?;
    let chain_id = session
        .chain_id
        .ok_or_else(|| "provider returned no chain id".to_string())?;
    let address = Address::parse(account).map_err(|e| e.to_string())?;
    Ok((address, chain_id))
}

fn cause_label(cause: DisconnectCause) -> &'static str {
    match cause {
        DisconnectCause::UserRequested => "user_requested",
        DisconnectCause::AccountsEmptied => "accounts_emptied",
        DisconnectCause::AccountSwitched => "account_switched",
        DisconnectCause::ProviderDisconnected => "provider_disconnected",
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`WalletManager`]. See [`WalletManager::builder`].
pub struct WalletManagerBuilder<C> {
    connector: Option<C>,
    config: WalletConfig,
    reload: Arc<dyn ReloadHandler>,
    channel: Option<Arc<dyn SyncChannel>>,
    clock: Arc<dyn Clock>,
    tab_id: Option<TabId>,
}

impl<C: WalletConnector> WalletManagerBuilder<C> {
    pub fn connector(mut self, connector: C) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn config(mut self, config: WalletConfig) -> Self {
        self.config = config;
        self
    }

    pub fn reload_handler(mut self, reload: Arc<dyn ReloadHandler>) -> Self {
        self.reload = reload;
        self
    }

    /// Publish wallet state to, and collect it from, other tabs.
    pub fn sync_channel(mut self, channel: Arc<dyn SyncChannel>) -> Self {
        self.channel = Some(channel);
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

    pub fn build(self) -> WalletManager<C> {
        let config = self.config.validated();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(NOTICE_CAPACITY);

        WalletManager {
            shared: Arc::new(Shared {
                reload: self.reload,
                notices,
                channel: self.channel,
                clock: self.clock,
                codec: JsonCodec,
                tab_id: self.tab_id.unwrap_or_else(TabId::random),
                reconnecting: AtomicBool::new(false),
                events_tx,
                core: Mutex::new(Core {
                    status: WalletStatus::Disconnected,
                    epoch: 0,
                    connector: self.connector.map(Arc::new),
                    listener: None,
                    allowed: config.allowed_chains.clone(),
                    peers: HashMap::new(),
                    events_rx: Some(events_rx),
                    pump: None,
                    sync_listener: None,
                }),
                config,
            }),
        }
    }
}
