//! Lifecycle notifications for the code that owns a socket.

use tokio::sync::mpsc;

/// How a connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code. `1006` when the stream ended without a close frame.
    pub code: u16,
    /// Close reason sent by the peer, possibly empty.
    pub reason: String,
    /// Whether a close frame was actually received.
    pub was_clean: bool,
}

/// Receives connection lifecycle events.
///
/// Called from the socket's listener worker, one event at a time and in
/// the order they happened. Implementations must not block.
pub trait SocketObserver: Send + Sync + 'static {
    /// The transport finished opening.
    fn on_opened(&self) {}

    /// The transport closed.
    fn on_closed(&self, _info: &CloseInfo) {}

    /// The transport failed, or the peer stopped answering heartbeats.
    fn on_errored(&self, _error: &str) {}

    /// The server completed the `Init` handshake.
    fn on_initialized(&self, _version: i32) {}
}

/// Ignores everything.
impl SocketObserver for () {}

/// A lifecycle event, as forwarded by the channel observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// See [`SocketObserver::on_opened`].
    Opened,
    /// See [`SocketObserver::on_closed`].
    Closed(CloseInfo),
    /// See [`SocketObserver::on_errored`].
    Errored(String),
    /// See [`SocketObserver::on_initialized`].
    Initialized {
        /// Protocol version announced by the server.
        version: i32,
    },
}

/// Forwards every event into a channel. Send errors mean the receiver
/// is gone and nobody is listening, so they are ignored.
impl SocketObserver for mpsc::UnboundedSender<SocketEvent> {
    fn on_opened(&self) {
        let _ = self.send(SocketEvent::Opened);
    }

    fn on_closed(&self, info: &CloseInfo) {
        let _ = self.send(SocketEvent::Closed(info.clone()));
    }

    fn on_errored(&self, error: &str) {
        let _ = self.send(SocketEvent::Errored(error.to_owned()));
    }

    fn on_initialized(&self, version: i32) {
        let _ = self.send(SocketEvent::Initialized { version });
    }
}
