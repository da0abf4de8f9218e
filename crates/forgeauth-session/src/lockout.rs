//! Per-identity failed-attempt counting and temporary lockout.

use std::collections::HashMap;
use std::time::Duration;

use forgeauth_protocol::UserId;

/// What happened when a failure was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Failure counted; the identity is not blocked yet.
    Counted(u32),
    /// This failure reached the limit. Blocked until the given time (ms).
    Blocked { until: u64 },
}

/// Counts failed validations per identity and blocks an identity once the
/// count reaches `max_attempts`.
///
/// Blocks expire lazily: the first check at or after `until` removes both
/// the block and the counter. A counter that never reached the limit is
/// forgotten once its last failure is a full `block_duration` old. Nothing
/// is scheduled, so there is no timer to leak when the owner goes away.
#[derive(Debug)]
pub struct FailedAttemptTracker {
    max_attempts: u32,
    block_duration: Duration,
    /// Count and time (ms) of the latest failure.
    attempts: HashMap<UserId, (u32, u64)>,
    blocked_until: HashMap<UserId, u64>,
}

impl FailedAttemptTracker {
    pub fn new(max_attempts: u32, block_duration: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            block_duration,
            attempts: HashMap::new(),
            blocked_until: HashMap::new(),
        }
    }

    /// `true` if `id` is blocked at `now`. Clears an expired block.
    pub fn is_blocked(&mut self, id: &UserId, now: u64) -> bool {
        match self.blocked_until.get(id) {
            Some(&until) if now < until => true,
            Some(_) => {
                self.blocked_until.remove(id);
                self.attempts.remove(id);
                tracing::info!(user = %id, "lockout expired");
                false
            }
            None => false,
        }
    }

    fn window_ms(&self) -> u64 {
        self.block_duration.as_millis() as u64
    }

    pub fn record_failure(&mut self, id: &UserId, now: u64) -> AttemptOutcome {
        let window = self.window_ms();
        let entry = self.attempts.entry(id.clone()).or_insert((0, now));
        if now.saturating_sub(entry.1) >= window {
            entry.0 = 0;
        }
        *entry = (entry.0 + 1, now);
        let count = entry.0;

        if count >= self.max_attempts {
            let until = now + window;
            self.blocked_until.insert(id.clone(), until);
            AttemptOutcome::Blocked { until }
        } else {
            AttemptOutcome::Counted(count)
        }
    }

    pub fn record_success(&mut self, id: &UserId) {
        self.attempts.remove(id);
    }

    pub fn attempts(&self, id: &UserId) -> u32 {
        self.attempts.get(id).map_or(0, |&(count, _)| count)
    }

    pub fn blocked_until(&self, id: &UserId) -> Option<u64> {
        self.blocked_until.get(id).copied()
    }

    /// Drops every block that expired at or before `now`, with its counter,
    /// and every unblocked counter whose last failure is a window old.
    pub fn purge_expired(&mut self, now: u64) {
        let attempts = &mut self.attempts;
        self.blocked_until.retain(|id, until| {
            if now >= *until {
                attempts.remove(id);
                false
            } else {
                true
            }
        });

        let window = self.window_ms();
        let blocked = &self.blocked_until;
        self.attempts.retain(|id, &mut (_, last)| {
            blocked.contains_key(id) || now.saturating_sub(last) < window
        });
    }
}
