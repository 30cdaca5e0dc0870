//! Per-connection driver task.
//!
//! Each `connect()` spawns one driver. The driver owns the transport
//! connection outright; the socket only keeps the sending half of the
//! driver's outbound queue. The flow is:
//!   1. Open the connection → post `Opened` (or `Errored`)
//!   2. Loop: forward queued frames out, post received frames in
//!   3. Exit on close, error, or when the socket drops its queue handle
//!
//! Everything the driver learns goes into the listener queue tagged with
//! the connection id, so the listener can tell current events from stale
//! ones.

use std::sync::Arc;
use std::time::Duration;

use rocketlink_transport::{
    CloseFrame, Connection, ConnectionId, Connector, Received,
};
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::listener::{ListenerEvent, TransportEvent};

/// How long to wait for the peer to answer our close frame.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Work queued for a driver by the socket.
#[derive(Debug)]
pub(crate) enum Outbound {
    /// An encoded envelope.
    Frame(Vec<u8>),
    /// Close the connection and exit.
    Close(CloseFrame),
}

pub(crate) struct Driver<C: Connector> {
    pub(crate) id: ConnectionId,
    pub(crate) connector: Arc<C>,
    pub(crate) url: String,
    pub(crate) token: Option<String>,
    pub(crate) outbound: mpsc::UnboundedReceiver<Outbound>,
    pub(crate) events: mpsc::UnboundedSender<ListenerEvent>,
}

impl<C: Connector> Driver<C> {
    fn post(&self, event: TransportEvent) {
        // The listener is gone only after shutdown; nothing to report to.
        let _ = self.events.send(ListenerEvent::Transport(event));
    }

    pub(crate) async fn run(mut self) {
        let id = self.id;
        let conn = match self
            .connector
            .connect(&self.url, self.token.as_deref())
            .await
        {
            Ok(conn) => conn,
            Err(error) => {
                debug!(%id, error = %error, "connect failed");
                self.post(TransportEvent::Errored { id, error });
                return;
            }
        };
        debug!(%id, transport = %conn.id(), "transport opened");
        self.post(TransportEvent::Opened { id });

        loop {
            tokio::select! {
                outbound = self.outbound.recv() => match outbound {
                    Some(Outbound::Frame(data)) => {
                        if let Err(error) = conn.send(&data).await {
                            self.post(TransportEvent::Errored { id, error });
                            return;
                        }
                    }
                    Some(Outbound::Close(frame)) => {
                        close_and_drain(&conn, id, frame).await;
                        return;
                    }
                    // Released without a close frame.
                    None => {
                        trace!(%id, "driver released");
                        return;
                    }
                },
                received = conn.recv() => match received {
                    Ok(Received::Message(data)) => {
                        self.post(TransportEvent::Message { id, data });
                    }
                    Ok(Received::Closed(frame)) => {
                        self.post(TransportEvent::Closed { id, frame });
                        return;
                    }
                    Err(error) => {
                        self.post(TransportEvent::Errored { id, error });
                        return;
                    }
                },
            }
        }
    }
}

/// Sends `frame` and waits (bounded) for the peer's close reply. Frames
/// arriving in between belong to a released connection and are dropped.
async fn close_and_drain<T: Connection>(
    conn: &T,
    id: ConnectionId,
    frame: CloseFrame,
) {
    debug!(%id, code = frame.code, reason = %frame.reason, "closing transport");
    if let Err(e) = conn.close(frame).await {
        debug!(%id, error = %e, "close frame not sent");
        return;
    }
    let drain = async {
        loop {
            match conn.recv().await {
                Ok(Received::Message(_)) => continue,
                Ok(Received::Closed(_)) | Err(_) => break,
            }
        }
    };
    if tokio::time::timeout(CLOSE_TIMEOUT, drain).await.is_err() {
        debug!(%id, "peer did not answer close frame");
    }
}
