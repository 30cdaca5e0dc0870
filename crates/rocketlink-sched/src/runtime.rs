//! [`Scheduler`] backed by the Tokio runtime.

use std::time::Duration;

use tokio::runtime::Handle;

use crate::{ScheduledTask, Scheduler, Task};

/// Spawns one Tokio task per scheduled callback.
///
/// Callbacks run on a runtime worker thread, never on the caller's.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Creates a scheduler that spawns onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Creates a scheduler for the runtime the caller is running in.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Scheduler for TokioScheduler {
    fn next_tick(&self, task: Task) -> ScheduledTask {
        let scheduled = ScheduledTask::new();
        let guard = scheduled.clone();
        let join = self.handle.spawn(async move {
            tokio::task::yield_now().await;
            if guard.claim() {
                task();
            }
        });
        scheduled.attach(join.abort_handle());
        scheduled
    }

    fn after(&self, delay: Duration, task: Task) -> ScheduledTask {
        let scheduled = ScheduledTask::new();
        let guard = scheduled.clone();
        let join = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if guard.claim() {
                tracing::trace!(
                    delay_ms = delay.as_millis() as u64,
                    "delayed task fired"
                );
                task();
            }
        });
        scheduled.attach(join.abort_handle());
        scheduled
    }
}
