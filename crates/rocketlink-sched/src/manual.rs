//! A [`Scheduler`] driven entirely by the caller.
//!
//! Nothing runs until the test (or simulation) calls [`ManualScheduler::advance`],
//! [`ManualScheduler::run_due`] or [`ManualScheduler::run_next`]. Time is a
//! virtual clock that only moves when advanced.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::{ScheduledTask, Scheduler, Task, When};

struct Entry {
    seq: u64,
    due: Duration,
    handle: ScheduledTask,
    task: Task,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    entries: Vec<Entry>,
    history: Vec<When>,
}

/// Deterministic scheduler for tests and simulations.
///
/// Cheap to clone; clones share the same queue and clock.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Arc<Mutex<ManualState>>,
}

impl ManualScheduler {
    /// Creates an empty scheduler with the clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ManualState> {
        // A panicking test callback must not wedge every later assertion.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn push(&self, when: When, task: Task) -> ScheduledTask {
        let handle = ScheduledTask::new();
        let mut state = self.lock();
        let due = match when {
            When::NextTick => state.now,
            When::After(delay) => state.now + delay,
        };
        let seq = state.next_seq;
        state.next_seq += 1;
        state.history.push(when);
        state.entries.push(Entry {
            seq,
            due,
            handle: handle.clone(),
            task,
        });
        handle
    }

    /// The virtual time elapsed so far.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    /// Every scheduling request made so far, in order, including ones
    /// that were later cancelled or already ran.
    pub fn history(&self) -> Vec<When> {
        self.lock().history.clone()
    }

    /// The most recent scheduling request, if any.
    pub fn last_scheduled(&self) -> Option<When> {
        self.lock().history.last().copied()
    }

    /// Number of tasks still waiting to run (cancelled ones excluded).
    pub fn pending(&self) -> usize {
        self.lock()
            .entries
            .iter()
            .filter(|e| e.handle.is_pending())
            .count()
    }

    /// Removes and returns the earliest entry due at or before `limit`.
    fn pop_due(&self, limit: Option<Duration>) -> Option<Entry> {
        let mut state = self.lock();
        // Cancelled entries stay queued so `force_run_all` can still reach
        // them; they are simply never picked here.
        let index = state
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.handle.is_pending())
            .filter(|(_, e)| limit.is_none_or(|limit| e.due <= limit))
            .min_by_key(|(_, e)| (e.due, e.seq))
            .map(|(i, _)| i)?;
        let entry = state.entries.remove(index);
        if entry.due > state.now {
            state.now = entry.due;
        }
        Some(entry)
    }

    fn run(entry: Entry) -> bool {
        if entry.handle.claim() {
            (entry.task)();
            true
        } else {
            false
        }
    }

    /// Runs the earliest pending task, moving the clock forward to its due
    /// time. Returns `false` if nothing was pending.
    pub fn run_next(&self) -> bool {
        self.pop_due(None).is_some_and(Self::run)
    }

    /// Runs every task that is due at the current virtual time, including
    /// tasks those tasks schedule for the next tick. Returns how many ran.
    pub fn run_due(&self) -> usize {
        self.advance(Duration::ZERO)
    }

    /// Moves the clock forward by `by` and runs everything that falls due,
    /// in due order. Returns how many tasks ran.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = 0;
        while let Some(entry) = self.pop_due(Some(target)) {
            if Self::run(entry) {
                ran += 1;
            }
        }
        self.lock().now = target;
        ran
    }

    /// Runs every stored callback, bypassing cancellation, as if each
    /// timer had fired just before it was cancelled. Used to check that
    /// callbacks themselves tolerate losing that race.
    pub fn force_run_all(&self) -> usize {
        let entries = std::mem::take(&mut self.lock().entries);
        let count = entries.len();
        for entry in entries {
            (entry.task)();
        }
        count
    }
}

impl Scheduler for ManualScheduler {
    fn next_tick(&self, task: Task) -> ScheduledTask {
        self.push(When::NextTick, task)
    }

    fn after(&self, delay: Duration, task: Task) -> ScheduledTask {
        self.push(When::After(delay), task)
    }
}
