//! The event bridge between transport drivers and the socket.
//!
//! Drivers never touch socket state. They post [`TransportEvent`]s into a
//! single ordered queue, and one listener worker turns each event into
//! state transitions, heartbeat bookkeeping, observer notifications and
//! dispatcher calls. Every event carries the id of the connection that
//! produced it; events from a connection that is no longer current are
//! dropped before anything else happens.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use rocketlink_protocol::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, Codec, Dispatcher, EventPayload, InboundEvent,
    InitEvent, JsonCodec, PROTOCOL_VERSION, is_expected_close,
};
use rocketlink_transport::{
    CloseFrame, ConnectionId, Connector, TransportError,
};
use tokio::sync::mpsc;
use tracing::{Level, debug, error, info, trace, warn};

use crate::socket::SocketInner;
use crate::{CloseInfo, SocketObserver};

/// What a driver observed on its connection.
#[derive(Debug)]
pub(crate) enum TransportEvent {
    Opened {
        id: ConnectionId,
    },
    Closed {
        id: ConnectionId,
        frame: Option<CloseFrame>,
    },
    Errored {
        id: ConnectionId,
        error: TransportError,
    },
    Message {
        id: ConnectionId,
        data: Vec<u8>,
    },
}

impl TransportEvent {
    fn id(&self) -> ConnectionId {
        match self {
            Self::Opened { id }
            | Self::Closed { id, .. }
            | Self::Errored { id, .. }
            | Self::Message { id, .. } => *id,
        }
    }
}

/// An item in the listener queue.
#[derive(Debug)]
pub(crate) enum ListenerEvent {
    Transport(TransportEvent),
    /// The socket shut down; the worker exits.
    Shutdown,
}

pub(crate) struct Listener<C: Connector> {
    socket: Weak<SocketInner<C>>,
    dispatcher: Dispatcher,
    observer: Arc<dyn SocketObserver>,
    codec: JsonCodec,
}

impl<C: Connector> Listener<C> {
    pub(crate) fn new(
        socket: Weak<SocketInner<C>>,
        dispatcher: Dispatcher,
        observer: Arc<dyn SocketObserver>,
    ) -> Self {
        Self {
            socket,
            dispatcher,
            observer,
            codec: JsonCodec,
        }
    }

    /// Consumes the queue until shutdown or until every sender is gone.
    pub(crate) async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<ListenerEvent>,
    ) {
        while let Some(event) = events.recv().await {
            match event {
                ListenerEvent::Transport(event) => self.handle(event),
                ListenerEvent::Shutdown => break,
            }
        }
        debug!("listener stopped");
    }

    pub(crate) fn handle(&self, event: TransportEvent) {
        let Some(socket) = self.socket.upgrade() else {
            return;
        };
        let id = event.id();
        if !socket.is_current_socket(id) {
            debug!(%id, ?event, "ignoring event from stale connection");
            return;
        }
        match event {
            TransportEvent::Opened { id } => self.on_opened(&socket, id),
            TransportEvent::Closed { id, frame } => {
                self.on_closed(&socket, id, frame);
            }
            TransportEvent::Errored { id, error } => {
                self.on_errored(&socket, id, &error);
            }
            TransportEvent::Message { id, data } => {
                self.on_message(&socket, id, &data);
            }
        }
    }

    fn on_opened(&self, socket: &Arc<SocketInner<C>>, id: ConnectionId) {
        if !socket.mark_opened(id) {
            return;
        }
        socket.heartbeat.start(id);
        info!(%id, "connection opened");
        self.observer.on_opened();
    }

    fn on_closed(
        &self,
        socket: &Arc<SocketInner<C>>,
        id: ConnectionId,
        frame: Option<CloseFrame>,
    ) {
        let info = match frame {
            Some(frame) => CloseInfo {
                code: frame.code,
                reason: frame.reason,
                was_clean: true,
            },
            None => CloseInfo {
                code: CLOSE_ABNORMAL,
                reason: String::new(),
                was_clean: false,
            },
        };
        if is_expected_close(info.code) {
            debug!(%id, code = info.code, reason = %info.reason, "connection closed");
        } else {
            warn!(
                %id,
                code = info.code,
                reason = %info.reason,
                clean = info.was_clean,
                "connection closed unexpectedly"
            );
        }
        self.observer.on_closed(&info);

        let Some(requested) = socket.mark_closed(id) else {
            return;
        };
        socket.heartbeat.stop();
        let policy = &socket.config().reconnect;
        let server_wants_back =
            policy.reconnect_on_server_close && info.code != CLOSE_NORMAL;
        if requested || server_wants_back {
            socket.reconnect();
        }
    }

    fn on_errored(
        &self,
        socket: &Arc<SocketInner<C>>,
        id: ConnectionId,
        error: &TransportError,
    ) {
        let detail = error.to_string();
        self.observer.on_errored(&detail);
        error!(%id, error = %detail, "transport error");
        if !socket.disconnect_if_current(id, true, false) {
            debug!(%id, "connection replaced before its error was handled");
        }
    }

    fn on_message(
        &self,
        socket: &Arc<SocketInner<C>>,
        id: ConnectionId,
        data: &[u8],
    ) {
        let payload: EventPayload<InboundEvent> =
            match self.codec.decode(data) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(%id, error = %e, "dropping malformed message");
                    return;
                }
            };

        if tracing::enabled!(Level::TRACE) {
            trace!(%id, payload = %String::from_utf8_lossy(data), "received");
        } else {
            debug!(%id, event = %payload.event, "received");
        }

        match payload.event {
            InboundEvent::Pong => socket.heartbeat.ack(id),
            InboundEvent::Init => self.on_init(socket, id, &payload),
            InboundEvent::Unknown(_) => {}
        }

        self.dispatch(&payload);
    }

    fn on_init(
        &self,
        socket: &Arc<SocketInner<C>>,
        id: ConnectionId,
        payload: &EventPayload<InboundEvent>,
    ) {
        let init = match payload.data_as::<InitEvent>() {
            Ok(Some(init)) => init,
            Ok(None) => {
                warn!(%id, "init event without a protocol version");
                return;
            }
            Err(e) => {
                warn!(%id, error = %e, "malformed init event");
                return;
            }
        };
        if init.version != PROTOCOL_VERSION {
            warn!(
                %id,
                server = init.version,
                client = PROTOCOL_VERSION,
                "protocol version mismatch"
            );
        }
        socket.initialized(init.version);
        info!(%id, version = init.version, "session initialized");
        self.observer.on_initialized(init.version);
    }

    /// Runs the registered handler. Neither an error nor a panic from a
    /// handler gets past this point.
    fn dispatch(&self, payload: &EventPayload<InboundEvent>) {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            self.dispatcher.dispatch(payload)
        }));
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!(event = %payload.event, error = %e, "handler failed");
            }
            Err(panic) => {
                let msg = panic.downcast_ref::<&str>().map_or_else(
                    || {
                        panic.downcast_ref::<String>().map_or_else(
                            || "unknown panic".to_string(),
                            ToString::to_string,
                        )
                    },
                    ToString::to_string,
                );
                error!(event = %payload.event, panic = %msg, "handler panicked");
            }
        }
    }
}
