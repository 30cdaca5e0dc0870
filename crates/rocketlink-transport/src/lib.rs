//! Transport abstraction layer for Rocketlink.
//!
//! Provides the [`Connector`] and [`Connection`] traits that abstract over
//! the outbound network connection a client socket drives. The client core
//! never touches sockets directly: it asks a connector for a connection and
//! then reads [`Received`] items from it until the peer goes away.
//!
//! # Feature Flags
//!
//! - `websocket` (default) — WebSocket connector via `tokio-tungstenite`

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConnection, WebSocketConnector};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique connection IDs.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Close code for a normal, intentional closure.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code reported when the stream ended without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Private-range close code asking the other side to reconnect.
pub const CLOSE_RECONNECT_REQUESTED: u16 = 4199;

/// Opaque identifier for a connection.
///
/// Every connection attempt gets a fresh id, so comparing ids is enough
/// to tell a live connection apart from one that has been replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Creates a new `ConnectionId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique `ConnectionId`.
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// A close code plus a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// The close status code.
    pub code: u16,
    /// Why the connection is being closed.
    pub reason: String,
}

impl CloseFrame {
    /// Creates a close frame with the given code and reason.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Normal closure (`1000`).
    pub fn normal() -> Self {
        Self::new(CLOSE_NORMAL, "")
    }

    /// Reconnect requested by the server (`4199`).
    pub fn reconnect_requested() -> Self {
        Self::new(CLOSE_RECONNECT_REQUESTED, "server requested")
    }
}

/// One item read from a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// A data frame (text frames are delivered as their UTF-8 bytes).
    Message(Vec<u8>),

    /// The peer closed the connection. `None` means the stream ended
    /// without a close frame.
    Closed(Option<CloseFrame>),
}

/// Opens outbound connections.
///
/// The returned futures are `Send` so a connector can be driven from a
/// spawned task regardless of the concrete transport.
pub trait Connector: Send + Sync + 'static {
    /// The connection type produced by this connector.
    type Connection: Connection;

    /// Opens a connection to `url`, presenting `token` if one is given.
    fn connect(
        &self,
        url: &str,
        token: Option<&str>,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}

/// A single connection that can send and receive bytes.
pub trait Connection: Send + Sync + 'static {
    /// Sends data to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next item from the remote peer.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Received, TransportError>> + Send;

    /// Sends a close frame to the peer.
    fn close(
        &self,
        frame: CloseFrame,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this connection.
    fn id(&self) -> ConnectionId;
}
