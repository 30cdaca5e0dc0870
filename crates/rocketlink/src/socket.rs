//! The connection state machine.
//!
//! [`Socket`] owns the connection state, the handle to the live transport
//! driver, the retry counter and the pending reconnect timer, all behind
//! one mutex. The mutex is never held across an `.await`, and never while
//! calling into the heartbeat monitor or an observer.
//!
//! ```text
//! caller ──connect()──→ Socket ──spawn──→ Driver ──events──→ Listener
//!                         ↑                                     │
//!                         └──────── state transitions ──────────┘
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use rocketlink_protocol::{
    Codec, DispatcherBuilder, EventPayload, InboundEvent, JsonCodec,
    OutboundEvent, ProtocolError,
};
use rocketlink_sched::{ScheduledTask, Scheduler, Task, TokioScheduler};
use rocketlink_transport::{
    CloseFrame, ConnectionId, Connector, TransportError, WebSocketConnector,
};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{Instrument, Level, Span, debug, info, trace, warn};

use crate::driver::{Driver, Outbound};
use crate::heartbeat::{HeartbeatMonitor, HeartbeatOutlet};
use crate::listener::{Listener, ListenerEvent, TransportEvent};
use crate::{ConnectionState, SocketConfig, SocketError, SocketObserver};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// The socket's end of a driver's outbound queue.
struct TransportHandle {
    id: ConnectionId,
    outbound: mpsc::UnboundedSender<Outbound>,
}

#[derive(Default)]
struct Core {
    state: ConnectionState,
    /// Present only while `Connecting` or `Connected`.
    transport: Option<TransportHandle>,
    retries: u32,
    reconnect_timer: Option<ScheduledTask>,
    requested_reconnect: bool,
    should_attempt_resume: bool,
    protocol_version: Option<i32>,
    shut_down: bool,
}

pub(crate) struct SocketInner<C: Connector> {
    config: SocketConfig,
    connector: Arc<C>,
    scheduler: Arc<dyn Scheduler>,
    runtime: Handle,
    codec: JsonCodec,
    span: Span,
    core: Mutex<Core>,
    pub(crate) heartbeat: HeartbeatMonitor,
    events: mpsc::UnboundedSender<ListenerEvent>,
}

impl<C: Connector> SocketInner<C> {
    fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn config(&self) -> &SocketConfig {
        &self.config
    }

    pub(crate) fn is_current_socket(&self, id: ConnectionId) -> bool {
        self.lock().transport.as_ref().is_some_and(|t| t.id == id)
    }

    /// `Connecting` → `Connected` for `id`. Returns `false` if `id` was
    /// replaced in the meantime.
    pub(crate) fn mark_opened(&self, id: ConnectionId) -> bool {
        let mut core = self.lock();
        if !core.transport.as_ref().is_some_and(|t| t.id == id) {
            return false;
        }
        core.state = ConnectionState::Connected;
        true
    }

    /// Releases `id` after the peer closed it. Returns the consumed
    /// `requested_reconnect` flag, or `None` if `id` is not current.
    pub(crate) fn mark_closed(&self, id: ConnectionId) -> Option<bool> {
        let mut core = self.lock();
        if !core.transport.as_ref().is_some_and(|t| t.id == id) {
            return None;
        }
        core.transport = None;
        core.state = ConnectionState::Disconnected;
        Some(std::mem::take(&mut core.requested_reconnect))
    }

    #[cfg(test)]
    pub(crate) fn set_requested_reconnect(&self, requested: bool) {
        self.lock().requested_reconnect = requested;
    }

    pub(crate) fn initialized(&self, version: i32) {
        let mut core = self.lock();
        core.protocol_version = Some(version);
        core.retries = 0;
    }

    fn connect(self: &Arc<Self>) -> Result<(), SocketError> {
        let mut core = self.lock();
        self.begin_connect(&mut core)
    }

    /// Starts a connection attempt. Runs with the state lock held so a
    /// concurrent `disconnect`/`shutdown` can't slip in between the state
    /// check and the transition.
    fn begin_connect(
        self: &Arc<Self>,
        core: &mut Core,
    ) -> Result<(), SocketError> {
        let settings = &self.config.settings;
        if settings.url.trim().is_empty() {
            return Err(SocketError::InvalidArgument(
                "url must not be empty".into(),
            ));
        }
        if core.shut_down {
            return Err(SocketError::ShutDown);
        }
        if !core.state.can_connect() {
            return Err(SocketError::IllegalState(core.state));
        }

        if let Some(timer) = core.reconnect_timer.take() {
            timer.cancel();
        }
        core.requested_reconnect = false;
        core.should_attempt_resume = false;

        let id = ConnectionId::next();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        core.transport = Some(TransportHandle { id, outbound });
        core.state = ConnectionState::Connecting;
        info!(%id, url = %settings.url, retry = core.retries, "connecting");

        let driver = Driver {
            id,
            connector: Arc::clone(&self.connector),
            url: settings.url.clone(),
            token: settings.token().map(str::to_owned),
            outbound: outbound_rx,
            events: self.events.clone(),
        };
        self.runtime.spawn(driver.run().instrument(self.span.clone()));
        Ok(())
    }

    pub(crate) fn disconnect(
        self: &Arc<Self>,
        attempt_reconnect: bool,
        should_resume: bool,
        requested: bool,
    ) {
        self.release(None, attempt_reconnect, should_resume, requested, false);
    }

    /// Disconnects only while `id` is still the live connection. The check
    /// and the teardown share one critical section, so a connection opened
    /// in the meantime is never torn down on behalf of its predecessor.
    pub(crate) fn disconnect_if_current(
        self: &Arc<Self>,
        id: ConnectionId,
        attempt_reconnect: bool,
        should_resume: bool,
    ) -> bool {
        self.release(Some(id), attempt_reconnect, should_resume, false, false)
    }

    fn release(
        self: &Arc<Self>,
        only: Option<ConnectionId>,
        attempt_reconnect: bool,
        should_resume: bool,
        requested: bool,
        shut_down: bool,
    ) -> bool {
        {
            let mut core = self.lock();
            let current = core.transport.as_ref().map(|t| t.id);
            if only.is_some_and(|id| current != Some(id)) {
                return false;
            }
            core.should_attempt_resume = should_resume;
            core.requested_reconnect = attempt_reconnect;
            if shut_down {
                core.shut_down = true;
            }
            if let Some(timer) = core.reconnect_timer.take() {
                timer.cancel();
            }

            if core.state == ConnectionState::Disconnected {
                // Nothing to close; just make sure the handle is gone.
                core.transport = None;
            } else {
                if let Some(transport) = core.transport.take() {
                    let frame = if requested {
                        CloseFrame::reconnect_requested()
                    } else {
                        CloseFrame::normal()
                    };
                    debug!(id = %transport.id, code = frame.code, "disconnecting");
                    // Fails only if the driver already exited.
                    let _ = transport.outbound.send(Outbound::Close(frame));
                }
                core.state = ConnectionState::Disconnected;
            }
        }
        self.heartbeat.stop();

        if attempt_reconnect {
            self.reconnect();
        }
        true
    }

    pub(crate) fn reconnect(self: &Arc<Self>) {
        let mut core = self.lock();
        if core.shut_down || core.state != ConnectionState::Disconnected {
            debug!(state = %core.state, "reconnect skipped");
            return;
        }
        core.state = ConnectionState::PendingReconnect;
        core.retries += 1;
        let retry = core.retries;

        let weak = Arc::downgrade(self);
        let task: Task = Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.fire_reconnect();
            }
        });
        let timer = match self.config.reconnect.delay_for(retry) {
            None => {
                debug!(retry, "reconnecting on next tick");
                self.scheduler.next_tick(task)
            }
            Some(delay) => {
                warn!(
                    retry,
                    delay_ms = delay.as_millis() as u64,
                    "attempting to reconnect"
                );
                self.scheduler.after(delay, task)
            }
        };
        core.reconnect_timer = Some(timer);
    }

    fn fire_reconnect(self: &Arc<Self>) {
        let _enter = self.span.enter();
        let mut core = self.lock();
        if core.shut_down || core.state != ConnectionState::PendingReconnect {
            trace!(state = %core.state, "stale reconnect timer");
            return;
        }
        core.reconnect_timer = None;
        if let Err(e) = self.begin_connect(&mut core) {
            // Back to a state from which `reconnect` can try again.
            core.state = ConnectionState::Disconnected;
            warn!(error = %e, "reconnect attempt failed");
        }
    }

    /// Queues `bytes` for the current transport, or only for `conn` when
    /// given.
    fn send_raw(&self, conn: Option<ConnectionId>, bytes: Vec<u8>) -> bool {
        let core = self.lock();
        match &core.transport {
            Some(t) if conn.is_none_or(|c| c == t.id) => {
                t.outbound.send(Outbound::Frame(bytes)).is_ok()
            }
            _ => false,
        }
    }

    fn encode(&self, payload: &EventPayload<OutboundEvent>) -> Option<Vec<u8>> {
        match self.codec.encode(payload) {
            Ok(bytes) => {
                if tracing::enabled!(Level::TRACE) {
                    trace!(payload = %String::from_utf8_lossy(&bytes), "sending");
                }
                Some(bytes)
            }
            Err(e) => {
                warn!(event = %payload.event, error = %e, "failed to encode");
                None
            }
        }
    }
}

impl<C: Connector> HeartbeatOutlet for SocketInner<C> {
    fn send_ping(&self, conn: ConnectionId) -> bool {
        let _enter = self.span.enter();
        self.encode(&EventPayload::new(OutboundEvent::Ping))
            .is_some_and(|bytes| self.send_raw(Some(conn), bytes))
    }

    fn timed_out(&self, conn: ConnectionId, missed: u32) {
        let _enter = self.span.enter();
        warn!(%conn, missed, "peer stopped answering heartbeats");
        let _ = self.events.send(ListenerEvent::Transport(
            TransportEvent::Errored {
                id: conn,
                error: TransportError::Unresponsive { missed },
            },
        ));
    }
}

// ---------------------------------------------------------------------------
// Socket
// ---------------------------------------------------------------------------

/// A resilient client connection.
///
/// Cheap to clone; clones share the same connection. See
/// [`ConnectionState`] for the lifecycle.
///
/// # Example
///
/// ```rust,no_run
/// use rocketlink::prelude::*;
///
/// # async fn run() -> Result<(), SocketError> {
/// let config = SocketConfig::new(SocketSettings::new("wss://gateway.example", "token"));
/// let socket = Socket::builder(config)
///     .on(InboundEvent::Unknown(2000), |payload| {
///         println!("got {:?}", payload.data);
///         Ok(())
///     })
///     .build();
/// socket.connect()?;
/// # Ok(())
/// # }
/// ```
pub struct Socket<C: Connector = WebSocketConnector> {
    pub(crate) inner: Arc<SocketInner<C>>,
}

impl<C: Connector> Clone for Socket<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Socket<WebSocketConnector> {
    /// Starts building a WebSocket-backed socket.
    pub fn builder(config: SocketConfig) -> SocketBuilder<WebSocketConnector> {
        SocketBuilder::new(config)
    }
}

impl<C: Connector> Socket<C> {
    /// Opens a new transport.
    ///
    /// Returns once the attempt has started; the outcome arrives through
    /// the observer.
    ///
    /// # Errors
    /// - [`SocketError::InvalidArgument`] if the URL is empty.
    /// - [`SocketError::IllegalState`] if already connecting or connected.
    /// - [`SocketError::ShutDown`] after [`shutdown`](Self::shutdown).
    pub fn connect(&self) -> Result<(), SocketError> {
        let _enter = self.inner.span.enter();
        self.inner.connect()
    }

    /// Closes the transport with a normal closure.
    ///
    /// Cancels any pending reconnect. `attempt_reconnect` is recorded as
    /// [`requested_reconnect`](Self::requested_reconnect), and when set a
    /// new reconnect cycle starts right away.
    pub fn disconnect(&self, attempt_reconnect: bool, should_resume: bool) {
        let _enter = self.inner.span.enter();
        self.inner.disconnect(attempt_reconnect, should_resume, false);
    }

    /// Like [`disconnect`](Self::disconnect), but closes with `4199`
    /// ("server requested").
    pub fn disconnect_requested(
        &self,
        attempt_reconnect: bool,
        should_resume: bool,
    ) {
        let _enter = self.inner.span.enter();
        self.inner.disconnect(attempt_reconnect, should_resume, true);
    }

    /// Schedules a reconnect according to the backoff policy. A no-op
    /// unless the socket is `Disconnected`.
    pub fn reconnect(&self) {
        let _enter = self.inner.span.enter();
        self.inner.reconnect();
    }

    /// Encodes and queues `payload` on the current transport.
    ///
    /// Returns `false` when there is no transport (or encoding failed);
    /// never errors.
    pub fn send(&self, payload: &EventPayload<OutboundEvent>) -> bool {
        let _enter = self.inner.span.enter();
        self.inner
            .encode(payload)
            .is_some_and(|bytes| self.inner.send_raw(None, bytes))
    }

    /// Sends `event` with `data` as its payload.
    ///
    /// # Errors
    /// Returns [`SocketError::Protocol`] if `data` can't be encoded.
    pub fn send_event<D: Serialize>(
        &self,
        event: OutboundEvent,
        data: &D,
    ) -> Result<bool, SocketError> {
        let payload = EventPayload::with_data(event, data)?;
        Ok(self.send(&payload))
    }

    /// Stops everything for good: closes the transport, cancels timers,
    /// stops the heartbeat and the listener worker.
    pub fn shutdown(&self) {
        let _enter = self.inner.span.enter();
        self.inner.release(None, false, false, false, true);
        self.inner.heartbeat.destroy();
        let _ = self.inner.events.send(ListenerEvent::Shutdown);
        info!("socket shut down");
    }

    /// Whether `id` is the transport this socket currently owns.
    pub fn is_current_socket(&self, id: ConnectionId) -> bool {
        self.inner.is_current_socket(id)
    }

    /// The id of the transport this socket currently owns.
    pub fn current_connection(&self) -> Option<ConnectionId> {
        self.inner.lock().transport.as_ref().map(|t| t.id)
    }

    /// Resets the backoff to its first tier.
    pub fn reset_retries(&self) {
        self.inner.lock().retries = 0;
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.state() == ConnectionState::Connecting
    }

    pub fn is_pending_reconnect(&self) -> bool {
        self.state() == ConnectionState::PendingReconnect
    }

    pub fn is_disconnected(&self) -> bool {
        self.state() == ConnectionState::Disconnected
    }

    /// Reconnect attempts since the last reset.
    pub fn retries(&self) -> u32 {
        self.inner.lock().retries
    }

    /// Protocol version from the last `Init`.
    pub fn protocol_version(&self) -> Option<i32> {
        self.inner.lock().protocol_version
    }

    /// The reconnect intent carried by the last disconnect. Cleared when
    /// the next connection attempt starts.
    pub fn requested_reconnect(&self) -> bool {
        self.inner.lock().requested_reconnect
    }

    pub fn should_attempt_resume(&self) -> bool {
        self.inner.lock().should_attempt_resume
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.lock().shut_down
    }

    /// Last heartbeat round trip.
    pub fn latency(&self) -> Option<Duration> {
        self.inner.heartbeat.latency()
    }

    /// Pings sent since the last `Pong` that went unanswered.
    pub fn missed_heartbeats(&self) -> u32 {
        self.inner.heartbeat.missed()
    }

    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }
}

impl<C: Connector> fmt::Debug for Socket<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let heartbeat = self.inner.heartbeat.is_running();
        let core = self.inner.lock();
        f.debug_struct("Socket")
            .field("url", &self.inner.config.settings.url)
            .field("state", &core.state)
            .field("retries", &core.retries)
            .field("heartbeat", &heartbeat)
            .field("shut_down", &core.shut_down)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SocketBuilder
// ---------------------------------------------------------------------------

/// Configures and builds a [`Socket`].
pub struct SocketBuilder<C: Connector = WebSocketConnector> {
    config: SocketConfig,
    connector: C,
    scheduler: Option<Arc<dyn Scheduler>>,
    observer: Arc<dyn SocketObserver>,
    span: Option<Span>,
    runtime: Option<Handle>,
    handlers: DispatcherBuilder,
}

impl SocketBuilder<WebSocketConnector> {
    /// Creates a builder with the WebSocket connector, the Tokio
    /// scheduler and no observer.
    pub fn new(config: SocketConfig) -> Self {
        Self {
            config,
            connector: WebSocketConnector::new(),
            scheduler: None,
            observer: Arc::new(()),
            span: None,
            runtime: None,
            handlers: DispatcherBuilder::default(),
        }
    }
}

impl<C: Connector> SocketBuilder<C> {
    /// Replaces the transport.
    pub fn connector<D: Connector>(self, connector: D) -> SocketBuilder<D> {
        SocketBuilder {
            config: self.config,
            connector,
            scheduler: self.scheduler,
            observer: self.observer,
            span: self.span,
            runtime: self.runtime,
            handlers: self.handlers,
        }
    }

    /// Replaces the scheduler used for reconnect and heartbeat timers.
    pub fn scheduler(mut self, scheduler: impl Scheduler) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Sets the lifecycle observer.
    pub fn observer(mut self, observer: impl SocketObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    /// Sets the span every log line of this socket is recorded in.
    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    /// Sets the runtime drivers and the listener are spawned on.
    pub fn runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Registers a handler for an inbound event code.
    pub fn on<F>(mut self, event: InboundEvent, handler: F) -> Self
    where
        F: Fn(&EventPayload<InboundEvent>) -> Result<(), ProtocolError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers = self.handlers.on(event, handler);
        self
    }

    /// Builds the socket and its listener without starting the listener.
    pub(crate) fn build_parts(
        self,
    ) -> (
        Socket<C>,
        Listener<C>,
        mpsc::UnboundedReceiver<ListenerEvent>,
    ) {
        let config = self.config.validated();
        let runtime = self.runtime.unwrap_or_else(Handle::current);
        let scheduler = self.scheduler.unwrap_or_else(|| {
            Arc::new(TokioScheduler::new(runtime.clone())) as Arc<dyn Scheduler>
        });
        let span = self.span.unwrap_or_else(|| {
            tracing::info_span!("socket", url = %config.settings.url)
        });
        let (events, events_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(self.connector);

        let inner = Arc::new_cyclic(|weak: &Weak<SocketInner<C>>| {
            let outlet: Weak<dyn HeartbeatOutlet> = weak.clone();
            SocketInner {
                heartbeat: HeartbeatMonitor::new(
                    config.heartbeat.clone(),
                    Arc::clone(&scheduler),
                    outlet,
                ),
                config,
                connector,
                scheduler,
                runtime,
                codec: JsonCodec,
                span,
                core: Mutex::new(Core::default()),
                events,
            }
        });
        let listener = Listener::new(
            Arc::downgrade(&inner),
            self.handlers.build(),
            self.observer,
        );
        (Socket { inner }, listener, events_rx)
    }

    /// Builds the socket and starts its listener worker.
    ///
    /// # Panics
    /// Panics when called outside a Tokio runtime and no
    /// [`runtime`](Self::runtime) was set.
    pub fn build(self) -> Socket<C> {
        let (socket, listener, events) = self.build_parts();
        let inner = &socket.inner;
        inner
            .runtime
            .spawn(listener.run(events).instrument(inner.span.clone()));
        socket
    }
}

#[cfg(test)]
mod tests {
    use rocketlink_sched::{ManualScheduler, When};
    use tokio::sync::mpsc::error::TryRecvError;

    use super::*;
    use crate::SocketEvent;
    use crate::mock::{Harness, MockConnector, MockMode};

    #[tokio::test]
    async fn test_connect_then_opened_becomes_connected() {
        let h = Harness::new(MockMode::Hang);
        h.socket.connect().unwrap();
        assert_eq!(h.socket.state(), ConnectionState::Connecting);
        assert!(h.socket.is_connecting());

        h.inject(TransportEvent::Opened { id: h.current() });
        assert_eq!(h.socket.state(), ConnectionState::Connected);
        assert!(h.socket.is_connected());
    }

    #[tokio::test]
    async fn test_error_while_connected_schedules_immediate_reconnect() {
        let mut h = Harness::new(MockMode::Hang);
        let id = h.open();
        let _ = h.observed.try_recv();

        h.inject(TransportEvent::Errored {
            id,
            error: TransportError::ConnectionClosed("reset".into()),
        });

        assert_eq!(h.socket.state(), ConnectionState::PendingReconnect);
        assert_eq!(h.socket.retries(), 1);
        assert_eq!(h.sched.last_scheduled(), Some(When::NextTick));
        assert!(h.socket.current_connection().is_none());
        assert!(!h.socket.inner.heartbeat.is_running());
        assert!(matches!(
            h.observed.try_recv().unwrap(),
            SocketEvent::Errored(msg) if msg.contains("reset")
        ));
    }

    #[tokio::test]
    async fn test_reconnect_timer_fires_connect() {
        let h = Harness::new(MockMode::Hang);
        let first = h.open();
        h.inject(TransportEvent::Errored {
            id: first,
            error: TransportError::Shutdown,
        });

        assert_eq!(h.sched.run_due(), 1);
        assert_eq!(h.socket.state(), ConnectionState::Connecting);
        assert_ne!(h.current(), first);
    }

    #[tokio::test]
    async fn test_backoff_tiers_fourth_retry_waits_long_delay() {
        let h = Harness::new(MockMode::Hang);
        h.socket.connect().unwrap();

        for _ in 0..4 {
            h.inject(TransportEvent::Errored {
                id: h.current(),
                error: TransportError::ConnectFailed("refused".into()),
            });
            assert!(h.sched.run_next());
        }

        assert_eq!(
            h.sched.history(),
            vec![
                When::NextTick,
                When::After(Duration::from_millis(1000)),
                When::After(Duration::from_millis(1000)),
                When::After(Duration::from_millis(15000)),
            ]
        );
        assert_eq!(h.socket.retries(), 4);
    }

    #[tokio::test]
    async fn test_reset_retries_restarts_backoff_at_next_tick() {
        let h = Harness::new(MockMode::Hang);
        h.socket.connect().unwrap();
        for _ in 0..2 {
            h.inject(TransportEvent::Errored {
                id: h.current(),
                error: TransportError::ConnectFailed("refused".into()),
            });
            assert!(h.sched.run_next());
        }
        assert_eq!(h.socket.retries(), 2);

        h.socket.reset_retries();
        assert_eq!(h.socket.retries(), 0);

        h.inject(TransportEvent::Errored {
            id: h.current(),
            error: TransportError::ConnectFailed("refused".into()),
        });
        assert_eq!(h.socket.retries(), 1);
        assert_eq!(h.sched.last_scheduled(), Some(When::NextTick));
    }

    #[tokio::test]
    async fn test_connect_failures_through_driver_back_off() {
        let mut h = Harness::new(MockMode::Fail);
        h.socket.connect().unwrap();

        for expected in [
            When::NextTick,
            When::After(Duration::from_secs(1)),
            When::After(Duration::from_secs(1)),
            When::After(Duration::from_secs(15)),
        ] {
            h.pump().await;
            assert_eq!(h.sched.last_scheduled(), Some(expected));
            assert!(h.sched.run_next());
        }
        assert_eq!(h.connector.attempts(), 5);
    }

    #[tokio::test]
    async fn test_shutdown_while_pending_reconnect_cancels_timer() {
        let h = Harness::new(MockMode::Hang);
        let id = h.open();
        h.inject(TransportEvent::Errored {
            id,
            error: TransportError::Shutdown,
        });
        assert!(h.socket.is_pending_reconnect());

        h.socket.shutdown();
        assert_eq!(h.sched.pending(), 0);

        // Even a timer that lost the race with cancel must do nothing.
        h.sched.force_run_all();
        assert!(h.socket.is_disconnected());
        assert!(h.socket.current_connection().is_none());
        assert!(h.socket.is_shut_down());
        assert!(matches!(h.socket.connect(), Err(SocketError::ShutDown)));
    }

    #[tokio::test]
    async fn test_events_after_shutdown_never_reconnect() {
        let h = Harness::new(MockMode::Hang);
        let id = h.open();
        h.socket.shutdown();

        h.inject(TransportEvent::Closed {
            id,
            frame: Some(CloseFrame::new(4000, "bye")),
        });
        h.inject(TransportEvent::Errored {
            id,
            error: TransportError::Shutdown,
        });
        h.socket.reconnect();

        assert!(h.socket.is_disconnected());
        assert_eq!(h.sched.pending(), 0);
    }

    #[tokio::test]
    async fn test_connect_while_connecting_is_illegal_state() {
        let h = Harness::new(MockMode::Hang);
        h.socket.connect().unwrap();
        let id = h.current();

        let err = h.socket.connect().unwrap_err();
        assert!(matches!(
            err,
            SocketError::IllegalState(ConnectionState::Connecting)
        ));
        assert_eq!(h.socket.state(), ConnectionState::Connecting);
        assert_eq!(h.current(), id);

        h.inject(TransportEvent::Opened { id });
        assert!(matches!(
            h.socket.connect(),
            Err(SocketError::IllegalState(ConnectionState::Connected))
        ));
        assert_eq!(h.current(), id);
    }

    #[tokio::test]
    async fn test_connect_with_empty_url_is_invalid_argument() {
        let sched = ManualScheduler::new();
        let (socket, _listener, _events) =
            SocketBuilder::new(SocketConfig::default())
                .connector(MockConnector::new(MockMode::Hang))
                .scheduler(sched)
                .build_parts();
        assert!(matches!(
            socket.connect(),
            Err(SocketError::InvalidArgument(_))
        ));
        assert!(socket.is_disconnected());
    }

    #[tokio::test]
    async fn test_connect_from_pending_reconnect_cancels_timer() {
        let h = Harness::new(MockMode::Hang);
        let id = h.open();
        h.inject(TransportEvent::Errored {
            id,
            error: TransportError::Shutdown,
        });
        assert_eq!(h.sched.pending(), 1);

        h.socket.connect().unwrap();
        assert_eq!(h.sched.pending(), 0);
        assert!(h.socket.is_connecting());
    }

    #[tokio::test]
    async fn test_disconnect_when_disconnected_is_idempotent() {
        let mut h = Harness::new(MockMode::Open);
        h.socket.connect().unwrap();
        h.pump().await;
        assert!(h.socket.is_connected());

        h.socket.disconnect(false, false);
        let remote = h.connector.remote(0);
        assert_eq!(remote.next_close().await, CloseFrame::normal());

        h.socket.disconnect(false, false);
        h.socket.disconnect(false, true);
        assert!(h.socket.is_disconnected());
        assert!(h.socket.should_attempt_resume());
        tokio::task::yield_now().await;
        assert_eq!(remote.try_next_close(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_disconnect_requested_sends_4199() {
        let mut h = Harness::new(MockMode::Open);
        h.socket.connect().unwrap();
        h.pump().await;

        h.socket.disconnect_requested(false, true);
        assert!(!h.socket.requested_reconnect());
        assert!(h.socket.should_attempt_resume());
        let close = h.connector.remote(0).next_close().await;
        assert_eq!(close, CloseFrame::reconnect_requested());
    }

    #[tokio::test]
    async fn test_requested_reconnect_follows_attempt_reconnect() {
        let h = Harness::new(MockMode::Hang);
        h.open();

        h.socket.disconnect(true, false);
        assert!(h.socket.requested_reconnect());
        assert!(h.socket.is_pending_reconnect());

        assert!(h.sched.run_next());
        assert!(h.socket.is_connecting());
        assert!(!h.socket.requested_reconnect());

        h.socket.disconnect(false, false);
        assert!(!h.socket.requested_reconnect());
    }

    #[tokio::test]
    async fn test_failed_reconnect_attempt_returns_to_disconnected() {
        let sched = ManualScheduler::new();
        let (socket, _listener, _events) =
            SocketBuilder::new(SocketConfig::default())
                .connector(MockConnector::new(MockMode::Hang))
                .scheduler(sched.clone())
                .build_parts();

        socket.disconnect(true, false);
        assert!(socket.is_pending_reconnect());
        assert!(sched.run_next());
        assert!(socket.is_disconnected());
        assert_eq!(sched.pending(), 0);

        socket.reconnect();
        assert!(socket.is_pending_reconnect());
        assert_eq!(socket.retries(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_cancels_pending_reconnect() {
        let h = Harness::new(MockMode::Hang);
        let id = h.open();
        h.inject(TransportEvent::Errored {
            id,
            error: TransportError::Shutdown,
        });
        h.socket.disconnect(false, false);
        assert!(h.socket.is_disconnected());
        assert_eq!(h.sched.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_without_transport_returns_false() {
        let h = Harness::new(MockMode::Hang);
        assert!(!h.socket.send(&EventPayload::new(OutboundEvent::Ping)));
        h.socket.connect().unwrap();
        assert!(h.socket.send(&EventPayload::new(OutboundEvent::Ping)));
    }

    #[tokio::test]
    async fn test_send_reaches_transport() {
        let mut h = Harness::new(MockMode::Open);
        h.socket.connect().unwrap();
        h.pump().await;

        assert!(h.socket.send(&EventPayload::new(OutboundEvent::Ping)));
        assert!(
            h.socket
                .send_event(OutboundEvent::Ping, &serde_json::json!({"n": 1}))
                .unwrap()
        );
        let remote = h.connector.remote(0);
        assert_eq!(remote.next_sent().await, br#"{"ev":1}"#.to_vec());
        assert_eq!(remote.next_sent().await, br#"{"ev":1,"d":{"n":1}}"#.to_vec());
    }
}
