//! Fixed-interval tick scheduler.
//!
//! One scheduler drives one periodic job. When a tick fires late (the
//! runtime was busy, or the previous callback ran long), the missed ticks
//! are skipped and the cadence restarts from now. A session monitor has no
//! use for a burst of back-to-back catch-up checks.

use std::time::Duration;

use tokio::time::{self, Instant};
use tracing::{debug, trace, warn};

#[derive(Debug, Clone)]
pub struct TickConfig {
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
        }
    }
}

impl TickConfig {
    /// Shortest interval the scheduler accepts.
    pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

    pub fn every(interval: Duration) -> Self {
        Self { interval }
    }

    /// Called by [`TickScheduler::new`].
    pub fn validated(mut self) -> Self {
        if self.interval < Self::MIN_INTERVAL {
            warn!(
                interval_ms = self.interval.as_millis() as u64,
                min_ms = Self::MIN_INTERVAL.as_millis() as u64,
                "tick interval below minimum, clamping"
            );
            self.interval = Self::MIN_INTERVAL;
        }
        self
    }
}

/// Returned by [`TickScheduler::wait_for_tick`].
#[derive(Debug, Clone)]
pub struct TickInfo {
    /// Starts at 1.
    pub tick: u64,
    /// Whole intervals missed because this tick fired late.
    pub ticks_skipped: u64,
}

pub struct TickScheduler {
    interval: Duration,
    tick_count: u64,
    next_tick: Instant,
}

impl TickScheduler {
    pub fn new(config: TickConfig) -> Self {
        let interval = config.validated().interval;
        debug!(interval_ms = interval.as_millis() as u64, "tick scheduler created");

        Self {
            interval,
            tick_count: 0,
            next_tick: Instant::now() + interval,
        }
    }

    /// Waits until the next tick is due.
    pub async fn wait_for_tick(&mut self) -> TickInfo {
        let due = self.next_tick;
        time::sleep_until(due).await;

        let now = Instant::now();
        self.tick_count += 1;

        let late_by = now.saturating_duration_since(due);
        let ticks_skipped =
            (late_by.as_nanos() / self.interval.as_nanos().max(1)) as u64;
        if ticks_skipped > 0 {
            warn!(
                tick = self.tick_count,
                skipped = ticks_skipped,
                late_ms = late_by.as_millis() as u64,
                "tick overrun, skipping ahead"
            );
        }

        // Always from now, never from the missed deadline.
        self.next_tick = now + self.interval;
        trace!(tick = self.tick_count, "tick fired");

        TickInfo {
            tick: self.tick_count,
            ticks_skipped,
        }
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}
