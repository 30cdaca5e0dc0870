//! The connection lifecycle state machine.

use std::fmt;

/// The lifecycle state of a [`Socket`](crate::Socket).
///
/// Exactly one value holds at any instant, and every transition goes
/// through the socket's single state lock:
///
/// ```text
///                 connect()            transport opened
/// Disconnected ─────────────→ Connecting ───────────────→ Connected
///      ↑  │                        │                          │
///      │  │ reconnect()            │ close / error            │ close / error
///      │  ↓                        ↓                          ↓
///      │ PendingReconnect      Disconnected ←─────────────────┘
///      │  │
///      │  └──(timer fires: connect())──→ Connecting …
///      └── disconnect() from any state
/// ```
///
/// `shutdown()` is reachable from every state; it leaves the socket in
/// `Disconnected` permanently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport, nothing scheduled.
    #[default]
    Disconnected,
    /// A transport exists and its open handshake is in flight.
    Connecting,
    /// The transport is open.
    Connected,
    /// No transport; a reconnect attempt is scheduled.
    PendingReconnect,
}

impl ConnectionState {
    /// Whether `connect()` may be called from this state.
    pub fn can_connect(self) -> bool {
        matches!(self, Self::Disconnected | Self::PendingReconnect)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting",
            Self::Connected => "Connected",
            Self::PendingReconnect => "PendingReconnect",
        };
        f.write_str(name)
    }
}
