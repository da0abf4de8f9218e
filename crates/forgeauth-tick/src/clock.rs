use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::time::Instant as TokioInstant;

/// Source of wall-clock milliseconds since the Unix epoch.
///
/// Session activity, sync envelopes and credential timestamps are all in
/// this unit, so every component that needs "now" takes a `Clock`.
pub trait Clock: Send + Sync + 'static {
    fn now_millis(&self) -> u64;
}

/// The operating system's wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: AtomicU64::new(start_millis),
        }
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Wall-clock milliseconds derived from Tokio's clock.
///
/// Anchored at construction, then advanced by Tokio's elapsed time. Under
/// a paused runtime (`start_paused = true`) it moves exactly as far as
/// `tokio::time` does, which keeps timers and timestamps in step.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor_millis: u64,
    anchor: TokioInstant,
}

impl TokioClock {
    pub fn new(anchor_millis: u64) -> Self {
        Self {
            anchor_millis,
            anchor: TokioInstant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_millis(&self) -> u64 {
        self.anchor_millis + self.anchor.elapsed().as_millis() as u64
    }
}
