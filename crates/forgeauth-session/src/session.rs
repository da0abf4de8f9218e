//! Session types: configuration, lifecycle state, and what a session
//! grants.

use std::collections::HashSet;
use std::time::Duration;

use forgeauth_protocol::UserId;
use serde::Serialize;
use tracing::warn;

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Timeouts and limits for one tab's session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often the monitor checks for idleness, token expiry and health.
    pub check_interval: Duration,
    /// A session with no activity for longer than this is ended.
    pub idle_timeout: Duration,
    /// Failed validations before an identity is locked out.
    pub max_failed_attempts: u32,
    /// How long a lockout lasts.
    pub block_duration: Duration,
    /// Identities granted admin capabilities.
    pub admins: HashSet<UserId>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(30 * 60),
            max_failed_attempts: 3,
            block_duration: Duration::from_secs(15 * 60),
            admins: HashSet::new(),
        }
    }
}

impl SessionConfig {
    pub const MIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

    /// Clamp out-of-range values.
    ///
    /// - `check_interval` at least [`Self::MIN_CHECK_INTERVAL`].
    /// - `idle_timeout` at least one `check_interval`.
    /// - `max_failed_attempts` at least 1.
    pub fn validated(mut self) -> Self {
        if self.check_interval < Self::MIN_CHECK_INTERVAL {
            warn!(
                check_interval_ms = self.check_interval.as_millis() as u64,
                "session check interval too short, clamping"
            );
            self.check_interval = Self::MIN_CHECK_INTERVAL;
        }
        if self.idle_timeout < self.check_interval {
            warn!(
                idle_timeout_ms = self.idle_timeout.as_millis() as u64,
                "idle timeout shorter than check interval, clamping"
            );
            self.idle_timeout = self.check_interval;
        }
        if self.max_failed_attempts == 0 {
            warn!("max_failed_attempts of 0 would block everyone, using 1");
            self.max_failed_attempts = 1;
        }
        self
    }
}

// ---------------------------------------------------------------------------
// SessionState
// ---------------------------------------------------------------------------

/// Lifecycle of one tab's session.
///
/// ```text
///   Uninitialized ──(init_session)──→ Active ⇄ Refreshing
///                                       │
///              ┌────────────────────────┼─────────────────────┐
///              ▼                        ▼                     ▼
///          Expired                   Blocked                Ended
///   (idle / refresh failed)    (health check failed)   (sign-out, explicit)
/// ```
///
/// The three terminal states all mean "no session". `init_session` starts
/// over from any of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Uninitialized,
    Active,
    Refreshing,
    Blocked,
    Expired,
    Ended,
}

impl SessionState {
    /// `Active` or `Refreshing`.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Active | Self::Refreshing)
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    SignOut,
    IdleTimeout,
    RefreshFailed,
    SecurityAnomaly,
    /// Another tab signed out.
    RemoteSignOut,
    WalletDisconnected,
    Explicit,
}

impl EndReason {
    pub fn terminal_state(self) -> SessionState {
        match self {
            Self::IdleTimeout | Self::RefreshFailed => SessionState::Expired,
            Self::SecurityAnomaly => SessionState::Blocked,
            Self::SignOut
            | Self::RemoteSignOut
            | Self::WalletDisconnected
            | Self::Explicit => SessionState::Ended,
        }
    }
}

// ---------------------------------------------------------------------------
// Capabilities and snapshots
// ---------------------------------------------------------------------------

/// What an authenticated identity may do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UserCapabilities {
    pub is_admin: bool,
    pub can_create_token: bool,
    pub can_use_services: bool,
}

/// Point-in-time copy of a manager's session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub user: Option<UserId>,
    pub last_activity: u64,
    pub end_reason: Option<EndReason>,
    pub monitor_active: bool,
}
