//! Keep-alive watchdog for the live connection.
//!
//! While a connection is open the monitor sends a `Ping` every
//! `interval`. A beat that finds the previous ping still unanswered counts
//! as a miss; `max_missed` consecutive misses mean the peer is gone, and
//! the monitor reports it through [`HeartbeatOutlet::timed_out`] so the
//! socket can run its normal error path.
//!
//! Every `start`/`stop` bumps a generation counter. A beat scheduled for
//! an older generation does nothing when it fires, so a timer that loses
//! the race with `stop` is harmless.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use rand::Rng;
use rocketlink_sched::{ScheduledTask, Scheduler};
use rocketlink_transport::ConnectionId;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::HeartbeatConfig;

/// Where the monitor sends pings and reports timeouts.
pub(crate) trait HeartbeatOutlet: Send + Sync + 'static {
    /// Sends a ping on `conn`. Returns `false` if `conn` is no longer the
    /// live connection.
    fn send_ping(&self, conn: ConnectionId) -> bool;

    /// `conn` missed `missed` consecutive heartbeats.
    fn timed_out(&self, conn: ConnectionId, missed: u32);
}

#[derive(Default)]
struct HeartbeatState {
    conn: Option<ConnectionId>,
    generation: u64,
    awaiting_ack: bool,
    missed: u32,
    timer: Option<ScheduledTask>,
    last_ping: Option<Instant>,
    latency: Option<Duration>,
    destroyed: bool,
}

struct HeartbeatInner {
    config: HeartbeatConfig,
    scheduler: Arc<dyn Scheduler>,
    outlet: Weak<dyn HeartbeatOutlet>,
    state: Mutex<HeartbeatState>,
}

enum Beat {
    Ping(ConnectionId),
    TimedOut(ConnectionId, u32),
}

/// Periodic ping sender and acknowledgement tracker. Cheap to clone.
#[derive(Clone)]
pub(crate) struct HeartbeatMonitor {
    inner: Arc<HeartbeatInner>,
}

impl HeartbeatMonitor {
    pub(crate) fn new(
        config: HeartbeatConfig,
        scheduler: Arc<dyn Scheduler>,
        outlet: Weak<dyn HeartbeatOutlet>,
    ) -> Self {
        Self {
            inner: Arc::new(HeartbeatInner {
                config,
                scheduler,
                outlet,
                state: Mutex::new(HeartbeatState::default()),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HeartbeatState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Starts beating for `conn`, replacing any previous connection.
    ///
    /// The first ping goes out after `interval` plus a random jitter.
    pub fn start(&self, conn: ConnectionId) {
        let mut state = self.lock();
        if state.destroyed {
            return;
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.generation += 1;
        state.conn = Some(conn);
        state.awaiting_ack = false;
        state.missed = 0;
        state.last_ping = None;

        let jitter_ms = self.inner.config.initial_jitter.as_millis() as u64;
        let jitter = if jitter_ms > 0 {
            Duration::from_millis(rand::rng().random_range(0..jitter_ms))
        } else {
            Duration::ZERO
        };
        let first = self.inner.config.interval + jitter;
        debug!(%conn, first_ms = first.as_millis() as u64, "heartbeat started");
        state.timer = Some(self.schedule(first, state.generation));
    }

    /// Stops beating. A no-op when not running.
    pub fn stop(&self) {
        let mut state = self.lock();
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        if let Some(conn) = state.conn.take() {
            state.generation += 1;
            debug!(%conn, "heartbeat stopped");
        }
    }

    /// Stops beating for good. Later `start` calls are ignored.
    pub fn destroy(&self) {
        self.stop();
        self.lock().destroyed = true;
    }

    /// Records a `Pong` on `conn`.
    pub fn ack(&self, conn: ConnectionId) {
        let mut state = self.lock();
        if state.conn != Some(conn) {
            return;
        }
        state.awaiting_ack = false;
        state.missed = 0;
        if let Some(sent) = state.last_ping.take() {
            let rtt = sent.elapsed();
            state.latency = Some(rtt);
            trace!(%conn, rtt_ms = rtt.as_millis() as u64, "heartbeat acknowledged");
        }
    }

    /// Round trip of the last acknowledged ping.
    pub fn latency(&self) -> Option<Duration> {
        self.lock().latency
    }

    /// Whether a connection is being watched.
    pub fn is_running(&self) -> bool {
        self.lock().conn.is_some()
    }

    /// Consecutive unanswered pings so far.
    pub fn missed(&self) -> u32 {
        self.lock().missed
    }

    fn schedule(&self, delay: Duration, generation: u64) -> ScheduledTask {
        let weak = Arc::downgrade(&self.inner);
        self.inner.scheduler.after(
            delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    HeartbeatMonitor { inner }.beat(generation);
                }
            }),
        )
    }

    fn beat(&self, generation: u64) {
        let beat = {
            let mut state = self.lock();
            if state.destroyed || state.generation != generation {
                return;
            }
            let Some(conn) = state.conn else { return };
            state.timer = None;
            if state.awaiting_ack {
                state.missed += 1;
                warn!(%conn, missed = state.missed, "heartbeat not acknowledged");
            }
            if state.missed >= self.inner.config.max_missed {
                state.conn = None;
                state.generation += 1;
                Beat::TimedOut(conn, state.missed)
            } else {
                Beat::Ping(conn)
            }
        };

        let Some(outlet) = self.inner.outlet.upgrade() else {
            return;
        };
        match beat {
            Beat::TimedOut(conn, missed) => outlet.timed_out(conn, missed),
            Beat::Ping(conn) => {
                let sent = outlet.send_ping(conn);
                let mut state = self.lock();
                if state.generation != generation {
                    return;
                }
                if !sent {
                    debug!(%conn, "heartbeat target gone");
                    state.conn = None;
                    state.generation += 1;
                    return;
                }
                state.awaiting_ack = true;
                state.last_ping.get_or_insert_with(Instant::now);
                state.timer =
                    Some(self.schedule(self.inner.config.interval, generation));
            }
        }
    }
}
