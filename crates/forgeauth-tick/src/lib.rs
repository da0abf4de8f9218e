//! Time for forgeauth.
//!
//! Session expiry is polled, not pushed: every tab re-checks its session
//! on a fixed interval. This crate owns everything about that:
//!
//! - [`Clock`]: where "now" comes from. [`SystemClock`] in production,
//!   [`ManualClock`] and [`TokioClock`] in tests.
//! - [`TickScheduler`]: a fixed-interval scheduler that skips missed
//!   ticks instead of bursting.
//! - [`spawn_periodic`]: runs a callback on every tick of a scheduler in a
//!   Tokio task and hands back a [`TaskHandle`]. Cancelling or dropping the
//!   handle stops the task, so a timer never outlives its owner.
//!
//! # Integration
//!
//! ```ignore
//! let handle = spawn_periodic(TickConfig::every(Duration::from_secs(60)), move |_tick| {
//!     let manager = weak.clone();
//!     async move {
//!         if let Some(manager) = manager.upgrade() {
//!             manager.monitor_tick().await;
//!         }
//!     }
//! });
//! // later
//! handle.cancel();
//! ```

mod clock;
mod scheduler;
mod task;

pub use clock::{Clock, ManualClock, SystemClock, TokioClock};
pub use scheduler::{TickConfig, TickInfo, TickScheduler};
pub use task::{spawn_periodic, TaskHandle};
