//! The session manager: one tab's authenticated session.
//!
//! Responsibilities:
//! - Starting a session once the token service accepts the user
//! - Ending it after 30 minutes without activity, on a failed token
//!   refresh, on a failed health check, or on sign-out in any tab
//! - Counting failed validations per identity and locking out after 3
//! - Sharing activity with the other tabs so that using the app in one
//!   tab keeps every tab's session alive
//!
//! # Concurrency
//!
//! `SessionManager` is a cheap handle (`Clone`) over shared state behind a
//! `std::sync::Mutex`. The lock is only taken for short, synchronous
//! updates and is never held across an `.await`. The monitor runs on its
//! own task (see [`forgeauth_tick::spawn_periodic`]) and calls back
//! through a weak reference, so the manager is freed once every handle is
//! dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use forgeauth_protocol::{
    AuthStatePayload, Codec, JsonCodec, SessionStatePayload, SyncMessage,
    SyncPayload, TabId, UserId,
};
use forgeauth_tick::{spawn_periodic, Clock, SystemClock, TaskHandle, TickConfig};
use forgeauth_transport::SyncChannel;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::{
    AttemptOutcome, EndReason, FailedAttemptTracker, Notifier, SessionConfig,
    SessionError, SessionSnapshot, SessionState, TokenService, TracingNotifier,
    UserCapabilities,
};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

struct Core {
    state: SessionState,
    user: Option<UserId>,
    /// Milliseconds. Only ever moves forward.
    last_activity: u64,
    end_reason: Option<EndReason>,
    monitor: Option<TaskHandle>,
    listener: Option<JoinHandle<()>>,
    lockout: FailedAttemptTracker,
}

struct Shared<T> {
    config: SessionConfig,
    tokens: T,
    notifier: Arc<dyn Notifier>,
    channel: Arc<dyn SyncChannel>,
    clock: Arc<dyn Clock>,
    codec: JsonCodec,
    tab_id: TabId,
    core: Mutex<Core>,
}

/// Manages the session of a single tab.
///
/// ## Lifecycle
///
/// ```text
/// init_session() ──→ [Active] ──(monitor tick, every 60 s)──┐
///                      ↑  │                                  │
///     update_activity()┘  │  idle > 30 min ──→ [Expired]     │
///     SESSION_STATE ──────┘  token expired ──→ refresh ──────┤
///                            health failed ──→ [Blocked]     │
///                            sign_out() ─────→ [Ended] ◀─────┘
/// ```
pub struct SessionManager<T: TokenService> {
    shared: Arc<Shared<T>>,
}

impl<T: TokenService> Clone for SessionManager<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: TokenService> SessionManager<T> {
    /// Starts building a manager around a token service and the tab's
    /// sync channel.
    pub fn builder(
        tokens: T,
        channel: Arc<dyn SyncChannel>,
    ) -> SessionManagerBuilder<T> {
        SessionManagerBuilder {
            tokens,
            channel,
            config: SessionConfig::default(),
            notifier: Arc::new(TracingNotifier),
            clock: Arc::new(SystemClock),
            tab_id: None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Core> {
        self.shared
            .core
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn now(&self) -> u64 {
        self.shared.clock.now_millis()
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Starts a session for `user`.
    ///
    /// Initializes the token service, starts the monitor and marks the
    /// session `Active`. Re-initializing an active session restarts its
    /// monitor.
    ///
    /// # Errors
    /// [`SessionError::InitializationFailed`] if the token service refuses.
    /// No session exists afterwards.
    pub async fn init_session(&self, user: UserId) -> Result<(), SessionError> {
        if let Err(e) = self.shared.tokens.initialize(&user).await {
            let stale_monitor = {
                let mut core = self.lock();
                core.user = None;
                if core.state.is_live() {
                    core.state = SessionState::Uninitialized;
                }
                core.monitor.take()
            };
            drop(stale_monitor);
            warn!(%user, error = %e, "session initialization failed");
            self.shared.notifier.error("Failed to initialize session");
            return Err(SessionError::InitializationFailed(e));
        }

        let now = self.now();
        let monitor = self.start_monitor();
        let replaced = {
            let mut core = self.lock();
            core.state = SessionState::Active;
            core.user = Some(user.clone());
            core.last_activity = core.last_activity.max(now);
            core.end_reason = None;
            core.monitor.replace(monitor)
        };
        drop(replaced);

        info!(%user, tab = %self.shared.tab_id, "session initialized");
        self.shared.notifier.success("Session initialized");
        self.broadcast(SyncPayload::AuthState(AuthStatePayload {
            user: Some(user),
            signed_in: true,
        }));
        Ok(())
    }

    /// Records user activity now and tells the other tabs.
    pub fn update_activity(&self) {
        let now = self.now();
        let last_activity = {
            let mut core = self.lock();
            core.last_activity = core.last_activity.max(now);
            core.last_activity
        };
        debug!(last_activity, "activity recorded");
        self.broadcast(SyncPayload::SessionState(SessionStatePayload {
            last_activity,
        }));
    }

    /// One monitor pass: idle check, then token expiry, then health.
    ///
    /// Called by the monitor task every `check_interval`. The three checks
    /// run in sequence and stop at the first one that ends the session.
    pub async fn monitor_tick(&self) {
        let now = self.now();
        let (state, idle_for) = {
            let mut core = self.lock();
            core.lockout.purge_expired(now);
            (core.state, now.saturating_sub(core.last_activity))
        };
        if state != SessionState::Active {
            return;
        }

        if idle_for > self.shared.config.idle_timeout.as_millis() as u64 {
            info!(idle_ms = idle_for, "session idle too long");
            self.end_with(EndReason::IdleTimeout).await;
            self.shared
                .notifier
                .warning("Session expired due to inactivity");
            return;
        }

        if self.shared.tokens.is_token_expired() {
            if let Err(e) = self.refresh_session().await {
                debug!(error = %e, "monitor refresh ended the session");
                return;
            }
        }

        self.validate_session_health().await;
    }

    /// Refreshes the token.
    ///
    /// # Errors
    /// [`SessionError::RefreshFailed`]. The session is ended first.
    pub async fn refresh_session(&self) -> Result<(), SessionError> {
        {
            let mut core = self.lock();
            if core.state == SessionState::Active {
                core.state = SessionState::Refreshing;
            }
        }

        match self.shared.tokens.refresh_token().await {
            Ok(()) => {
                {
                    let mut core = self.lock();
                    // An end that raced the refresh wins.
                    if core.state == SessionState::Refreshing {
                        core.state = SessionState::Active;
                    }
                }
                debug!("session refreshed");
                self.shared.notifier.info("Session refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                self.end_with(EndReason::RefreshFailed).await;
                self.shared.notifier.error("Failed to refresh session");
                Err(SessionError::RefreshFailed(e))
            }
        }
    }

    /// Checks `identity` against the lockout and the token service.
    ///
    /// Returns `Ok(true)` when a token is present (the failure counter is
    /// cleared), `Ok(false)` when it isn't (the failure is counted, and
    /// the identity is locked out when the count reaches the limit).
    ///
    /// # Errors
    /// [`SessionError::AccountBlocked`] while `identity` is locked out,
    /// whatever the token service would say.
    pub async fn validate_session(
        &self,
        identity: &UserId,
    ) -> Result<bool, SessionError> {
        if self.lock().lockout.is_blocked(identity, self.now()) {
            debug!(user = %identity, "validation rejected, account blocked");
            return Err(SessionError::AccountBlocked(identity.clone()));
        }

        let valid = match self.shared.tokens.get_token().await {
            Ok(token) => token.is_some(),
            Err(e) => {
                warn!(user = %identity, error = %e, "token lookup failed, counting as failure");
                false
            }
        };

        if valid {
            self.lock().lockout.record_success(identity);
            return Ok(true);
        }

        let outcome = self.lock().lockout.record_failure(identity, self.now());
        match outcome {
            AttemptOutcome::Counted(attempts) => {
                debug!(user = %identity, attempts, "failed validation counted");
            }
            AttemptOutcome::Blocked { until } => {
                warn!(user = %identity, until, "account blocked after repeated failures");
                self.shared.notifier.warning(
                    "Account temporarily blocked due to multiple failed attempts",
                );
            }
        }
        Ok(false)
    }

    /// Validates the current user, ending the session if that fails.
    ///
    /// Returns `true` when there is no user or the user is healthy.
    pub async fn validate_session_health(&self) -> bool {
        let Some(user) = self.lock().user.clone() else {
            return true;
        };

        let healthy = matches!(self.validate_session(&user).await, Ok(true));
        if !healthy {
            warn!(%user, "session health check failed");
            self.end_with(EndReason::SecurityAnomaly).await;
            self.shared
                .notifier
                .warning("Session ended due to security concerns");
        }
        healthy
    }

    /// Ends the session. Idempotent and infallible.
    pub async fn end_session(&self) {
        self.end_with(EndReason::Explicit).await;
    }

    /// Ends the session for `reason`.
    ///
    /// Always stops the monitor, cleans up the token service and drops
    /// the user, even when there was no session. State, reason and the
    /// "Session ended" notification only change on the live → ended
    /// transition. Returns whether that transition happened.
    pub async fn end_with(&self, reason: EndReason) -> bool {
        let (monitor, was_live, user) = {
            let mut core = self.lock();
            let was_live = core.state.is_live() || core.user.is_some();
            let user = core.user.take();
            if was_live {
                core.state = reason.terminal_state();
                core.end_reason = Some(reason);
            }
            (core.monitor.take(), was_live, user)
        };
        if let Some(monitor) = monitor {
            monitor.cancel();
        }

        if let Err(e) = self.shared.tokens.cleanup().await {
            warn!(error = %e, "token cleanup failed");
        }

        if was_live {
            info!(user = ?user, ?reason, "session ended");
            self.shared.notifier.info("Session ended");
        }
        was_live
    }

    /// Ends the session here and tells every other tab to do the same.
    pub async fn sign_out(&self) {
        let user = self.lock().user.clone();
        self.end_with(EndReason::SignOut).await;
        self.broadcast(SyncPayload::AuthState(AuthStatePayload {
            user,
            signed_in: false,
        }));
    }

    // -----------------------------------------------------------------------
    // Cross-tab sync
    // -----------------------------------------------------------------------

    /// Merges a message from another tab.
    ///
    /// Own echoes are ignored. Applying the same message twice has the
    /// same effect as applying it once.
    pub async fn apply_sync_message(&self, message: &SyncMessage) {
        if message.is_from(&self.shared.tab_id) {
            return;
        }

        match &message.payload {
            SyncPayload::SessionState(payload) => {
                let mut core = self.lock();
                // The envelope timestamp is the send time, not activity.
                if payload.last_activity > core.last_activity {
                    core.last_activity = payload.last_activity;
                    debug!(
                        last_activity = payload.last_activity,
                        from = %message.tab_id,
                        "merged peer activity"
                    );
                }
            }
            SyncPayload::AuthState(payload) if !payload.signed_in => {
                let current = self.lock().user.clone();
                let same_user = match (&payload.user, &current) {
                    (Some(theirs), Some(ours)) => theirs == ours,
                    _ => true,
                };
                if current.is_some() && same_user {
                    info!(from = %message.tab_id, "peer signed out");
                    self.end_with(EndReason::RemoteSignOut).await;
                }
            }
            SyncPayload::AuthState(payload) => {
                debug!(user = ?payload.user, from = %message.tab_id, "peer signed in");
            }
            SyncPayload::WalletState(_) => {}
        }
    }

    /// Starts applying messages from the sync channel in the background.
    ///
    /// Replaces a listener started earlier. Stops on [`shutdown`](Self::shutdown),
    /// when the channel is destroyed, or when the manager is dropped.
    pub fn spawn_sync_listener(&self) {
        let mut subscription = self.shared.channel.subscribe();
        let weak = Arc::downgrade(&self.shared);

        let listener = tokio::spawn(async move {
            loop {
                let frame = match subscription.recv().await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "session sync subscription failed");
                        break;
                    }
                };
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let manager = SessionManager { shared };
                match manager.shared.codec.decode::<SyncMessage>(&frame) {
                    Ok(message) => manager.apply_sync_message(&message).await,
                    Err(e) => debug!(error = %e, "dropping undecodable sync frame"),
                }
            }
            debug!("session sync listener stopped");
        });

        if let Some(previous) = self.lock().listener.replace(listener) {
            previous.abort();
        }
    }

    fn broadcast(&self, payload: SyncPayload) {
        let kind = payload.kind();
        let message =
            SyncMessage::new(payload, self.now(), self.shared.tab_id.clone());
        let frame = match self.shared.codec.encode(&message) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%kind, error = %e, "failed to encode sync message");
                return;
            }
        };
        if let Err(e) = self.shared.channel.broadcast(&frame) {
            warn!(%kind, error = %e, "failed to broadcast sync message");
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// Capabilities of `identity`, or `None` while it is locked out.
    pub fn get_user_session(&self, identity: &UserId) -> Option<UserCapabilities> {
        let now = self.now();
        if self.lock().lockout.is_blocked(identity, now) {
            return None;
        }
        Some(UserCapabilities {
            is_admin: self.shared.config.admins.contains(identity),
            can_create_token: true,
            can_use_services: true,
        })
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let core = self.lock();
        SessionSnapshot {
            state: core.state,
            user: core.user.clone(),
            last_activity: core.last_activity,
            end_reason: core.end_reason,
            monitor_active: core.monitor.as_ref().is_some_and(TaskHandle::is_active),
        }
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    pub fn current_user(&self) -> Option<UserId> {
        self.lock().user.clone()
    }

    pub fn last_activity(&self) -> u64 {
        self.lock().last_activity
    }

    /// `true` while the monitor task is scheduled.
    pub fn monitor_active(&self) -> bool {
        self.lock()
            .monitor
            .as_ref()
            .is_some_and(TaskHandle::is_active)
    }

    pub fn failed_attempts(&self, identity: &UserId) -> u32 {
        self.lock().lockout.attempts(identity)
    }

    pub fn tab_id(&self) -> &TabId {
        &self.shared.tab_id
    }

    pub fn tokens(&self) -> &T {
        &self.shared.tokens
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Stops the monitor and the sync listener and destroys the channel.
    ///
    /// Does not end the session: another tab may still be using it.
    pub fn shutdown(&self) {
        let (monitor, listener) = {
            let mut core = self.lock();
            (core.monitor.take(), core.listener.take())
        };
        if let Some(monitor) = monitor {
            monitor.cancel();
        }
        if let Some(listener) = listener {
            listener.abort();
        }
        self.shared.channel.destroy();
        info!(tab = %self.shared.tab_id, "session manager shut down");
    }

    fn start_monitor(&self) -> TaskHandle {
        let weak = Arc::downgrade(&self.shared);
        let config = TickConfig::every(self.shared.config.check_interval);
        spawn_periodic(config, move |_tick| {
            let weak = weak.clone();
            async move {
                if let Some(shared) = weak.upgrade() {
                    SessionManager { shared }.monitor_tick().await;
                }
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for [`SessionManager`]. See [`SessionManager::builder`].
pub struct SessionManagerBuilder<T> {
    tokens: T,
    channel: Arc<dyn SyncChannel>,
    config: SessionConfig,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    tab_id: Option<TabId>,
}

impl<T: TokenService> SessionManagerBuilder<T> {
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Share a tab id with the wallet manager of the same tab.
    pub fn tab_id(mut self, tab_id: TabId) -> Self {
        self.tab_id = Some(tab_id);
        self
    }

    pub fn build(self) -> SessionManager<T> {
        let config = self.config.validated();
        let lockout =
            FailedAttemptTracker::new(config.max_failed_attempts, config.block_duration);
        let last_activity = self.clock.now_millis();

        SessionManager {
            shared: Arc::new(Shared {
                config,
                tokens: self.tokens,
                notifier: self.notifier,
                channel: self.channel,
                clock: self.clock,
                codec: JsonCodec,
                tab_id: self.tab_id.unwrap_or_else(TabId::random),
                core: Mutex::new(Core {
                    state: SessionState::Uninitialized,
                    user: None,
                    last_activity,
                    end_reason: None,
                    monitor: None,
                    listener: None,
                    lockout,
                }),
            }),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! Unit tests for `SessionManager`.
    //!
    //! Time comes from a `ManualClock`, and monitor passes are driven by
    //! calling `monitor_tick()` directly, so no test waits for a real
    //! interval.

    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use forgeauth_tick::ManualClock;
    use forgeauth_transport::LocalHub;

    use super::*;
    use crate::TokenError;

    const T0: u64 = 1_700_000_000_000;
    const MINUTE: Duration = Duration::from_secs(60);

    // -- Helpers ----------------------------------------------------------

    #[derive(Default)]
    struct MockTokens {
        token: Mutex<Option<String>>,
        expired: AtomicBool,
        fail_init: AtomicBool,
        fail_refresh: AtomicBool,
        refreshes: AtomicU32,
        cleanups: AtomicU32,
    }

    impl MockTokens {
        fn set_token(&self, token: Option<&str>) {
            *self.token.lock().unwrap() = token.map(str::to_string);
        }
    }

    impl TokenService for MockTokens {
        async fn initialize(&self, _user: &UserId) -> Result<(), TokenError> {
            if self.fail_init.load(Ordering::SeqCst) {
                return Err(TokenError::Unavailable("backend down".into()));
            }
            self.set_token(Some("token-1"));
            Ok(())
        }

        async fn refresh_token(&self) -> Result<(), TokenError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            if self.fail_refresh.load(Ordering::SeqCst) {
                return Err(TokenError::Rejected("refresh token revoked".into()));
            }
            self.expired.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn get_token(&self) -> Result<Option<String>, TokenError> {
            Ok(self.token.lock().unwrap().clone())
        }

        fn is_token_expired(&self) -> bool {
            self.expired.load(Ordering::SeqCst)
        }

        async fn cleanup(&self) -> Result<(), TokenError> {
            self.cleanups.fetch_add(1, Ordering::SeqCst);
            self.set_token(None);
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        seen: Mutex<Vec<(&'static str, String)>>,
    }

    impl RecordingNotifier {
        fn has(&self, kind: &str, message: &str) -> bool {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .any(|(k, m)| *k == kind && m == message)
        }
    }

    impl Notifier for RecordingNotifier {
        fn success(&self, message: &str) {
            self.seen.lock().unwrap().push(("success", message.into()));
        }
        fn error(&self, message: &str) {
            self.seen.lock().unwrap().push(("error", message.into()));
        }
        fn warning(&self, message: &str) {
            self.seen.lock().unwrap().push(("warning", message.into()));
        }
        fn info(&self, message: &str) {
            self.seen.lock().unwrap().push(("info", message.into()));
        }
    }

    struct Fixture {
        manager: SessionManager<MockTokens>,
        clock: Arc<ManualClock>,
        notifier: Arc<RecordingNotifier>,
        hub: LocalHub,
    }

    fn fixture() -> Fixture {
        let hub = LocalHub::default();
        let clock = Arc::new(ManualClock::new(T0));
        let notifier = Arc::new(RecordingNotifier::default());
        let manager = SessionManager::builder(MockTokens::default(), Arc::new(hub.open_tab()))
            .clock(clock.clone())
            .notifier(notifier.clone())
            .build();
        Fixture {
            manager,
            clock,
            notifier,
            hub,
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::from(s)
    }

    fn peer_activity(last_activity: u64) -> SyncMessage {
        SyncMessage::new(
            SyncPayload::SessionState(SessionStatePayload { last_activity }),
            T0,
            TabId::random(),
        )
    }

    // =====================================================================
    // init_session()
    // =====================================================================

    #[tokio::test]
    async fn test_init_session_success_is_active_with_monitor() {
        let f = fixture();

        f.manager.init_session(uid("alice")).await.unwrap();

        assert_eq!(f.manager.state(), SessionState::Active);
        assert_eq!(f.manager.current_user(), Some(uid("alice")));
        assert!(f.manager.monitor_active());
        assert!(f.notifier.has("success", "Session initialized"));
    }

    #[tokio::test]
    async fn test_init_session_token_failure_leaves_no_session() {
        let f = fixture();
        f.manager.tokens().fail_init.store(true, Ordering::SeqCst);

        let result = f.manager.init_session(uid("alice")).await;

        assert!(matches!(result, Err(SessionError::InitializationFailed(_))));
        assert_eq!(f.manager.current_user(), None);
        assert!(!f.manager.state().is_live());
        assert!(!f.manager.monitor_active());
    }

    #[tokio::test]
    async fn test_init_session_broadcasts_signed_in() {
        let f = fixture();
        let peer = f.hub.open_tab();
        let mut sub = forgeauth_transport::SyncChannel::subscribe(&peer);

        f.manager.init_session(uid("alice")).await.unwrap();

        let frame = sub.recv().await.unwrap().unwrap();
        let message: SyncMessage = JsonCodec.decode(&frame).unwrap();
        assert!(message.is_from(f.manager.tab_id()));
        assert_eq!(
            message.payload,
            SyncPayload::AuthState(AuthStatePayload {
                user: Some(uid("alice")),
                signed_in: true,
            })
        );
    }

    // =====================================================================
    // update_activity() / apply_sync_message()
    // =====================================================================

    #[test]
    fn test_update_activity_moves_to_now() {
        let f = fixture();
        f.clock.advance(MINUTE);

        f.manager.update_activity();

        assert_eq!(f.manager.last_activity(), T0 + 60_000);
    }

    #[test]
    fn test_update_activity_never_moves_backward() {
        let f = fixture();
        f.manager.update_activity();
        f.clock.set(T0 - 5_000);

        f.manager.update_activity();

        assert_eq!(f.manager.last_activity(), T0);
    }

    #[tokio::test]
    async fn test_apply_newer_peer_activity_advances() {
        let f = fixture();

        f.manager.apply_sync_message(&peer_activity(T0 + 10_000)).await;

        assert_eq!(f.manager.last_activity(), T0 + 10_000);
    }

    #[tokio::test]
    async fn test_apply_older_peer_activity_is_ignored() {
        let f = fixture();
        f.clock.advance(MINUTE);
        f.manager.update_activity();

        f.manager.apply_sync_message(&peer_activity(T0)).await;

        assert_eq!(f.manager.last_activity(), T0 + 60_000);
    }

    #[tokio::test]
    async fn test_apply_same_message_twice_equals_once() {
        let f = fixture();
        let message = peer_activity(T0 + 42);

        f.manager.apply_sync_message(&message).await;
        let once = f.manager.snapshot();
        f.manager.apply_sync_message(&message).await;

        assert_eq!(f.manager.snapshot(), once);
    }

    #[tokio::test]
    async fn test_apply_uses_payload_not_envelope_timestamp() {
        let f = fixture();
        let message = SyncMessage::new(
            SyncPayload::SessionState(SessionStatePayload { last_activity: T0 - 1 }),
            T0 + 999_999,
            TabId::random(),
        );

        f.manager.apply_sync_message(&message).await;

        assert_eq!(f.manager.last_activity(), T0);
    }

    #[tokio::test]
    async fn test_apply_own_echo_is_ignored() {
        let f = fixture();
        let echo = SyncMessage::new(
            SyncPayload::SessionState(SessionStatePayload { last_activity: T0 + 5 }),
            T0,
            f.manager.tab_id().clone(),
        );

        f.manager.apply_sync_message(&echo).await;

        assert_eq!(f.manager.last_activity(), T0);
    }

    #[tokio::test]
    async fn test_apply_remote_sign_out_ends_session() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        let sign_out = SyncMessage::new(
            SyncPayload::AuthState(AuthStatePayload {
                user: Some(uid("alice")),
                signed_in: false,
            }),
            T0,
            TabId::random(),
        );

        f.manager.apply_sync_message(&sign_out).await;

        let snap = f.manager.snapshot();
        assert_eq!(snap.state, SessionState::Ended);
        assert_eq!(snap.end_reason, Some(EndReason::RemoteSignOut));
        assert!(!snap.monitor_active);
    }

    #[tokio::test]
    async fn test_apply_remote_sign_out_of_other_user_is_ignored() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        let sign_out = SyncMessage::new(
            SyncPayload::AuthState(AuthStatePayload {
                user: Some(uid("bob")),
                signed_in: false,
            }),
            T0,
            TabId::random(),
        );

        f.manager.apply_sync_message(&sign_out).await;

        assert_eq!(f.manager.state(), SessionState::Active);
    }

    // =====================================================================
    // monitor_tick()
    // =====================================================================

    #[tokio::test]
    async fn test_monitor_tick_idle_over_timeout_expires() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        f.clock.advance(31 * MINUTE);

        f.manager.monitor_tick().await;

        let snap = f.manager.snapshot();
        assert_eq!(snap.state, SessionState::Expired);
        assert_eq!(snap.end_reason, Some(EndReason::IdleTimeout));
        assert!(!snap.monitor_active);
        assert!(f.notifier.has("warning", "Session expired due to inactivity"));
    }

    #[tokio::test]
    async fn test_monitor_tick_idle_exactly_timeout_stays_active() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        f.clock.advance(30 * MINUTE);

        f.manager.monitor_tick().await;

        assert_eq!(f.manager.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_monitor_tick_peer_activity_prevents_expiry() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        f.clock.advance(31 * MINUTE);
        f.manager
            .apply_sync_message(&peer_activity(T0 + 20 * 60_000))
            .await;

        f.manager.monitor_tick().await;

        assert_eq!(f.manager.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn test_monitor_tick_expired_token_refreshes() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        f.manager.tokens().expired.store(true, Ordering::SeqCst);

        f.manager.monitor_tick().await;

        assert_eq!(f.manager.tokens().refreshes.load(Ordering::SeqCst), 1);
        assert_eq!(f.manager.state(), SessionState::Active);
        assert!(f.notifier.has("info", "Session refreshed"));
    }

    #[tokio::test]
    async fn test_monitor_tick_unhealthy_session_ends_with_security_warning() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        f.manager.tokens().set_token(None);

        f.manager.monitor_tick().await;

        let snap = f.manager.snapshot();
        assert_eq!(snap.state, SessionState::Blocked);
        assert_eq!(snap.end_reason, Some(EndReason::SecurityAnomaly));
        assert!(f.notifier.has("warning", "Session ended due to security concerns"));
        assert_eq!(f.manager.failed_attempts(&uid("alice")), 1);
    }

    #[tokio::test]
    async fn test_monitor_tick_without_session_does_nothing() {
        let f = fixture();

        f.manager.monitor_tick().await;

        assert_eq!(f.manager.state(), SessionState::Uninitialized);
        assert_eq!(f.manager.tokens().cleanups.load(Ordering::SeqCst), 0);
    }

    // =====================================================================
    // refresh_session()
    // =====================================================================

    #[tokio::test]
    async fn test_refresh_session_failure_ends_and_returns_error() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        f.manager.tokens().fail_refresh.store(true, Ordering::SeqCst);

        let result = f.manager.refresh_session().await;

        assert!(matches!(result, Err(SessionError::RefreshFailed(_))));
        assert_eq!(f.manager.state(), SessionState::Expired);
        assert_eq!(f.manager.current_user(), None);
        assert!(!f.manager.monitor_active());
    }

    // =====================================================================
    // validate_session()
    // =====================================================================

    #[tokio::test]
    async fn test_validate_session_with_token_is_true() {
        let f = fixture();
        f.manager.tokens().set_token(Some("t"));

        assert!(f.manager.validate_session(&uid("alice")).await.unwrap());
    }

    #[tokio::test]
    async fn test_validate_session_three_failures_then_blocked_even_if_valid() {
        let f = fixture();
        let alice = uid("alice");

        for _ in 0..3 {
            assert!(!f.manager.validate_session(&alice).await.unwrap());
        }
        assert!(f
            .notifier
            .has("warning", "Account temporarily blocked due to multiple failed attempts"));

        f.manager.tokens().set_token(Some("now-valid"));
        let result = f.manager.validate_session(&alice).await;

        assert!(matches!(result, Err(SessionError::AccountBlocked(u)) if u == alice));
    }

    #[tokio::test]
    async fn test_validate_session_after_block_expires_succeeds_and_resets() {
        let f = fixture();
        let alice = uid("alice");
        for _ in 0..3 {
            f.manager.validate_session(&alice).await.unwrap();
        }
        f.manager.tokens().set_token(Some("valid"));

        f.clock.advance(15 * MINUTE);
        let result = f.manager.validate_session(&alice).await;

        assert!(matches!(result, Ok(true)));
        assert_eq!(f.manager.failed_attempts(&alice), 0);
    }

    #[tokio::test]
    async fn test_validate_session_success_resets_counter() {
        let f = fixture();
        let alice = uid("alice");
        f.manager.validate_session(&alice).await.unwrap();
        f.manager.validate_session(&alice).await.unwrap();
        assert_eq!(f.manager.failed_attempts(&alice), 2);

        f.manager.tokens().set_token(Some("t"));
        f.manager.validate_session(&alice).await.unwrap();

        assert_eq!(f.manager.failed_attempts(&alice), 0);
    }

    #[tokio::test]
    async fn test_validate_session_lockout_is_per_identity() {
        let f = fixture();
        for _ in 0..3 {
            f.manager.validate_session(&uid("alice")).await.unwrap();
        }
        f.manager.tokens().set_token(Some("t"));

        assert!(f.manager.validate_session(&uid("bob")).await.unwrap());
    }

    // =====================================================================
    // end_session() / sign_out()
    // =====================================================================

    #[tokio::test]
    async fn test_end_session_twice_is_harmless_and_timer_cleared() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();

        f.manager.end_session().await;
        f.manager.end_session().await;

        assert!(!f.manager.monitor_active());
        assert_eq!(f.manager.state(), SessionState::Ended);
        assert_eq!(f.manager.current_user(), None);
        assert_eq!(f.manager.tokens().cleanups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_end_session_without_session_still_cleans_up() {
        let f = fixture();

        assert!(!f.manager.end_with(EndReason::Explicit).await);

        assert_eq!(f.manager.state(), SessionState::Uninitialized);
        assert_eq!(f.manager.tokens().cleanups.load(Ordering::SeqCst), 1);
        assert!(!f.notifier.has("info", "Session ended"));
    }

    #[tokio::test]
    async fn test_sign_out_broadcasts_signed_out() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        let peer = f.hub.open_tab();
        let mut sub = forgeauth_transport::SyncChannel::subscribe(&peer);

        f.manager.sign_out().await;

        let frame = sub.recv().await.unwrap().unwrap();
        let message: SyncMessage = JsonCodec.decode(&frame).unwrap();
        assert_eq!(
            message.payload,
            SyncPayload::AuthState(AuthStatePayload {
                user: Some(uid("alice")),
                signed_in: false,
            })
        );
        assert_eq!(f.manager.snapshot().end_reason, Some(EndReason::SignOut));
    }

    // =====================================================================
    // get_user_session()
    // =====================================================================

    #[tokio::test]
    async fn test_get_user_session_default_capabilities() {
        let f = fixture();

        let caps = f.manager.get_user_session(&uid("alice")).unwrap();

        assert!(!caps.is_admin);
        assert!(caps.can_create_token);
        assert!(caps.can_use_services);
    }

    #[test]
    fn test_get_user_session_admin_from_config() {
        let hub = LocalHub::default();
        let config = SessionConfig {
            admins: [uid("root")].into_iter().collect(),
            ..Default::default()
        };
        let manager = SessionManager::builder(MockTokens::default(), Arc::new(hub.open_tab()))
            .config(config)
            .build();

        assert!(manager.get_user_session(&uid("root")).unwrap().is_admin);
    }

    #[tokio::test]
    async fn test_get_user_session_none_while_blocked() {
        let f = fixture();
        for _ in 0..3 {
            f.manager.validate_session(&uid("alice")).await.unwrap();
        }

        assert_eq!(f.manager.get_user_session(&uid("alice")), None);
    }

    // =====================================================================
    // shutdown()
    // =====================================================================

    #[tokio::test]
    async fn test_shutdown_stops_monitor_and_destroys_channel() {
        let f = fixture();
        f.manager.init_session(uid("alice")).await.unwrap();
        f.manager.spawn_sync_listener();

        f.manager.shutdown();

        assert!(!f.manager.monitor_active());
        // The session itself survives; other tabs may still use it.
        assert_eq!(f.manager.state(), SessionState::Active);
        // Broadcasting on a destroyed channel is logged, not raised.
        f.manager.update_activity();
    }
}
