//! Cancellable task scheduling for Rocketlink.
//!
//! The client core never sleeps or spawns timers itself. It asks a
//! [`Scheduler`] to run a callback either on the next tick (yield first,
//! then run) or after a delay, and keeps the returned [`ScheduledTask`] so
//! it can cancel the callback later.
//!
//! Two implementations are provided:
//!
//! - [`TokioScheduler`] — spawns a Tokio task per callback.
//! - [`ManualScheduler`] — records callbacks and runs them only when told
//!   to, for deterministic tests and simulations.
//!
//! # Cancellation guarantee
//!
//! A task runs at most once, and never after [`ScheduledTask::cancel`] has
//! returned, even if its timer already elapsed and the callback is queued
//! on a worker thread. Whichever of "fire" and "cancel" claims the task
//! first wins.

mod manual;
mod runtime;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::task::AbortHandle;

/// A callback handed to a [`Scheduler`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs callbacks soon or later.
pub trait Scheduler: Send + Sync + 'static {
    /// Runs `task` on the next tick: after the caller has yielded, but
    /// without any deliberate delay.
    fn next_tick(&self, task: Task) -> ScheduledTask;

    /// Runs `task` once `delay` has elapsed.
    fn after(&self, delay: Duration, task: Task) -> ScheduledTask;
}

/// When a task was asked to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum When {
    /// On the next scheduler tick.
    NextTick,
    /// After the given delay.
    After(Duration),
}

impl fmt::Display for When {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NextTick => f.write_str("next tick"),
            Self::After(delay) => write!(f, "after {}ms", delay.as_millis()),
        }
    }
}

// ---------------------------------------------------------------------------
// ScheduledTask
// ---------------------------------------------------------------------------

const PENDING: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

struct TaskState {
    status: AtomicU8,
    abort: OnceLock<AbortHandle>,
}

/// Handle to a callback that has been scheduled but may not have run yet.
///
/// Cloning the handle shares the same underlying task.
#[derive(Clone)]
pub struct ScheduledTask {
    state: Arc<TaskState>,
}

impl ScheduledTask {
    pub(crate) fn new() -> Self {
        Self {
            state: Arc::new(TaskState {
                status: AtomicU8::new(PENDING),
                abort: OnceLock::new(),
            }),
        }
    }

    /// Attaches the Tokio task backing this handle so cancelling can
    /// also free the sleeping timer.
    pub(crate) fn attach(&self, abort: AbortHandle) {
        let _ = self.state.abort.set(abort);
        if self.is_cancelled() {
            if let Some(abort) = self.state.abort.get() {
                abort.abort();
            }
        }
    }

    /// Claims the task for execution. Returns `false` if it was cancelled
    /// or already ran.
    pub(crate) fn claim(&self) -> bool {
        self.state
            .status
            .compare_exchange(PENDING, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Cancels the task.
    ///
    /// Returns `true` only for the call that actually stopped a pending
    /// task; later calls, or calls after the task ran, return `false`.
    pub fn cancel(&self) -> bool {
        let stopped = self
            .state
            .status
            .compare_exchange(
                PENDING,
                CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if stopped {
            if let Some(abort) = self.state.abort.get() {
                abort.abort();
            }
            tracing::trace!("scheduled task cancelled");
        }
        stopped
    }

    /// Whether [`cancel`](Self::cancel) stopped this task.
    pub fn is_cancelled(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == CANCELLED
    }

    /// Whether the callback has been claimed to run.
    pub fn is_finished(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == FIRED
    }

    /// Whether the task is still waiting to run.
    pub fn is_pending(&self) -> bool {
        self.state.status.load(Ordering::Acquire) == PENDING
    }
}

impl fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match self.state.status.load(Ordering::Acquire) {
            PENDING => "pending",
            FIRED => "finished",
            _ => "cancelled",
        };
        f.debug_struct("ScheduledTask")
            .field("status", &status)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_idempotent() {
        let task = ScheduledTask::new();
        assert!(task.is_pending());
        assert!(task.cancel());
        assert!(!task.cancel());
        assert!(task.is_cancelled());
    }

    #[test]
    fn test_cancelled_task_cannot_be_claimed() {
        let task = ScheduledTask::new();
        task.cancel();
        assert!(!task.claim());
        assert!(!task.is_finished());
    }

    #[test]
    fn test_claimed_task_cannot_be_cancelled() {
        let task = ScheduledTask::new();
        assert!(task.claim());
        assert!(!task.cancel());
        assert!(task.is_finished());
        assert!(!task.claim(), "a task runs at most once");
    }

    #[test]
    fn test_clones_share_state() {
        let task = ScheduledTask::new();
        let other = task.clone();
        task.cancel();
        assert!(other.is_cancelled());
    }

    #[test]
    fn test_when_display() {
        assert_eq!(When::NextTick.to_string(), "next tick");
        assert_eq!(
            When::After(Duration::from_secs(15)).to_string(),
            "after 15000ms"
        );
    }
}
