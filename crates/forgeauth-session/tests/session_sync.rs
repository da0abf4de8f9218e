//! Integration tests: several tabs sharing one session over a `LocalHub`.
//!
//! Each tab gets its own `SessionManager` and its own endpoint on the hub,
//! exactly like separate browser tabs on the same origin.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use forgeauth_protocol::{
    AuthStatePayload, Codec, JsonCodec, SyncMessage, SyncPayload, UserId,
};
use forgeauth_session::{
    EndReason, SessionConfig, SessionManager, SessionState, TokenError,
    TokenService,
};
use forgeauth_tick::{Clock, ManualClock, TokioClock};
use forgeauth_transport::{LocalHub, SyncChannel};

// =========================================================================
// Helpers
// =========================================================================

/// Token service that always has a token once initialized.
#[derive(Default)]
struct HappyTokens {
    token: Mutex<Option<String>>,
}

impl TokenService for HappyTokens {
    async fn initialize(&self, user: &UserId) -> Result<(), TokenError> {
        *self.token.lock().unwrap() = Some(format!("token-for-{user}"));
        Ok(())
    }

    async fn refresh_token(&self) -> Result<(), TokenError> {
        Ok(())
    }

    async fn get_token(&self) -> Result<Option<String>, TokenError> {
        Ok(self.token.lock().unwrap().clone())
    }

    fn is_token_expired(&self) -> bool {
        false
    }

    async fn cleanup(&self) -> Result<(), TokenError> {
        *self.token.lock().unwrap() = None;
        Ok(())
    }
}

fn tab(hub: &LocalHub, clock: Arc<dyn Clock>) -> SessionManager<HappyTokens> {
    let manager = SessionManager::builder(HappyTokens::default(), Arc::new(hub.open_tab()))
        .clock(clock)
        .build();
    manager.spawn_sync_listener();
    manager
}

/// Polls `condition` until it holds, yielding to the listener tasks.
async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition never became true");
}

// =========================================================================
// Activity propagation
// =========================================================================

#[tokio::test]
async fn test_activity_in_one_tab_reaches_the_other() {
    let hub = LocalHub::default();
    let clock = Arc::new(ManualClock::new(1_000_000));
    let tab_a = tab(&hub, clock.clone());
    let tab_b = tab(&hub, clock.clone());

    clock.advance(Duration::from_secs(120));
    tab_a.update_activity();

    eventually(|| tab_b.last_activity() == 1_120_000).await;
}

#[tokio::test]
async fn test_stale_activity_from_peer_is_not_adopted() {
    let hub = LocalHub::default();
    let clock_a = Arc::new(ManualClock::new(1_000_000));
    let clock_b = Arc::new(ManualClock::new(2_000_000));
    let tab_a = tab(&hub, clock_a.clone());
    let tab_b = tab(&hub, clock_b.clone());
    tab_b.update_activity();

    tab_a.update_activity();
    // tab_a sees tab_b's newer activity; tab_b never moves backward.
    eventually(|| tab_a.last_activity() == 2_000_000).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(tab_b.last_activity(), 2_000_000);
}

// =========================================================================
// Sign-out propagation
// =========================================================================

#[tokio::test]
async fn test_sign_out_in_one_tab_ends_every_tab() {
    let hub = LocalHub::default();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000_000));
    let tab_a = tab(&hub, clock.clone());
    let tab_b = tab(&hub, clock.clone());
    let tab_c = tab(&hub, clock);
    let alice = UserId::from("alice");
    for t in [&tab_a, &tab_b, &tab_c] {
        t.init_session(alice.clone()).await.unwrap();
    }

    tab_a.sign_out().await;

    eventually(|| {
        tab_b.state() == SessionState::Ended && tab_c.state() == SessionState::Ended
    })
    .await;
    assert_eq!(tab_b.snapshot().end_reason, Some(EndReason::RemoteSignOut));
    assert!(!tab_b.monitor_active());
    assert_eq!(tab_a.snapshot().end_reason, Some(EndReason::SignOut));
}

#[tokio::test]
async fn test_remote_sign_out_is_not_rebroadcast() {
    let hub = LocalHub::default();
    let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(1_000_000));
    let tab_a = tab(&hub, clock.clone());
    let tab_b = tab(&hub, clock);
    let alice = UserId::from("alice");
    tab_a.init_session(alice.clone()).await.unwrap();
    tab_b.init_session(alice.clone()).await.unwrap();
    let observer = hub.open_tab();
    let mut frames = observer.subscribe();

    tab_a.sign_out().await;
    eventually(|| tab_b.state() == SessionState::Ended).await;

    let mut sign_outs = 0;
    while let Ok(Ok(Some(frame))) =
        tokio::time::timeout(Duration::from_millis(50), frames.recv()).await
    {
        let message: SyncMessage = JsonCodec.decode(&frame).unwrap();
        if matches!(
            message.payload,
            SyncPayload::AuthState(AuthStatePayload { signed_in: false, .. })
        ) {
            sign_outs += 1;
        }
    }
    assert_eq!(sign_outs, 1);
}

#[tokio::test]
async fn test_shutdown_stops_receiving() {
    let hub = LocalHub::default();
    let clock = Arc::new(ManualClock::new(1_000_000));
    let tab_a = tab(&hub, clock.clone());
    let tab_b = tab(&hub, clock.clone());

    tab_b.shutdown();
    clock.advance(Duration::from_secs(60));
    tab_a.update_activity();

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(tab_b.last_activity(), 1_000_000);
}

// =========================================================================
// Monitor driven by real timers (paused Tokio clock)
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_idle_session_expires_on_its_own() {
    let hub = LocalHub::default();
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new(1_000_000));
    let manager = SessionManager::builder(HappyTokens::default(), Arc::new(hub.open_tab()))
        .clock(clock)
        .config(SessionConfig::default())
        .build();
    manager.init_session(UserId::from("alice")).await.unwrap();

    tokio::time::sleep(Duration::from_secs(29 * 60)).await;
    assert_eq!(manager.state(), SessionState::Active);

    tokio::time::sleep(Duration::from_secs(3 * 60)).await;
    assert_eq!(manager.state(), SessionState::Expired);
    assert!(!manager.monitor_active());
}

#[tokio::test(start_paused = true)]
async fn test_activity_keeps_session_alive_past_timeout() {
    let hub = LocalHub::default();
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::new(1_000_000));
    let manager = SessionManager::builder(HappyTokens::default(), Arc::new(hub.open_tab()))
        .clock(clock)
        .build();
    manager.init_session(UserId::from("alice")).await.unwrap();

    for _ in 0..4 {
        tokio::time::sleep(Duration::from_secs(20 * 60)).await;
        manager.update_activity();
    }

    assert_eq!(manager.state(), SessionState::Active);
    assert!(manager.monitor_active());
}
