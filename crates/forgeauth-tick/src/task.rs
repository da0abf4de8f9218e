//! Periodic tasks with an owned, cancellable handle.

use std::future::Future;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::{TickConfig, TickInfo, TickScheduler};

/// Runs `on_tick` on every tick of a new [`TickScheduler`].
///
/// Callbacks run one at a time on a single task: a slow callback delays
/// the next tick, it never overlaps with it.
///
/// Must be called from within a Tokio runtime.
pub fn spawn_periodic<F, Fut>(config: TickConfig, mut on_tick: F) -> TaskHandle
where
    F: FnMut(TickInfo) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (cancel, mut cancelled) = watch::channel(false);

    let join = tokio::spawn(async move {
        let mut scheduler = TickScheduler::new(config);
        loop {
            tokio::select! {
                biased;
                () = cancellation(&mut cancelled) => break,
                info = scheduler.wait_for_tick() => on_tick(info).await,
            }
        }
        debug!(ticks = scheduler.tick_count(), "periodic task stopped");
    });

    TaskHandle {
        cancel,
        join: Some(join),
    }
}

/// Resolves once cancel is requested or the handle is gone. The read guard
/// from `wait_for` is dropped here, never held across a tick.
async fn cancellation(cancelled: &mut watch::Receiver<bool>) {
    let _ = cancelled.wait_for(|c| *c).await;
}

/// Owner of a task started by [`spawn_periodic`].
///
/// Cancellation is cooperative: a callback already running finishes, and
/// no further tick starts. Dropping the handle cancels.
#[derive(Debug)]
pub struct TaskHandle {
    cancel: watch::Sender<bool>,
    join: Option<JoinHandle<()>>,
}

impl TaskHandle {
    /// Stops the task after its current tick, if any. Idempotent.
    pub fn cancel(&self) {
        self.cancel.send_replace(true);
    }

    /// `true` until the task was cancelled or has exited.
    pub fn is_active(&self) -> bool {
        !*self.cancel.borrow()
            && self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Cancels and waits for the task to exit.
    pub async fn stop(mut self) {
        self.cancel();
        if let Some(join) = self.join.take() {
            // A panicked callback was already reported by the runtime.
            let _ = join.await;
        }
    }
}

impl Drop for TaskHandle {
    fn drop(&mut self) {
        self.cancel.send_replace(true);
    }
}
