//! # Rocketlink
//!
//! Resilient client for gateway-style WebSocket servers.
//!
//! A [`Socket`] keeps one connection to the server alive: it opens the
//! transport, pings it on a fixed interval, and when the connection drops
//! or stops answering it reconnects on a tiered backoff (next tick, then
//! 1s, then 15s). Inbound envelopes are routed to handlers registered per
//! event code.
//!
//! ```text
//! Transport (rocketlink-transport)  bytes, close frames
//!     ↓
//! Protocol  (rocketlink-protocol)   EventPayload, codes, Dispatcher
//!     ↓
//! Socket    (this crate)            state machine, listener, heartbeat
//!     ↑
//! Scheduler (rocketlink-sched)      next tick / delayed, cancellable
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rocketlink::prelude::*;
//!
//! # async fn run() -> Result<(), SocketError> {
//! let settings = SocketSettings::new("wss://gateway.example/ws", "secret");
//! let socket = Socket::builder(SocketConfig::new(settings)).build();
//! socket.connect()?;
//! // ...
//! socket.shutdown();
//! # Ok(())
//! # }
//! ```

mod config;
mod driver;
mod error;
mod heartbeat;
mod listener;
#[cfg(test)]
mod mock;
mod observer;
mod socket;
mod state;

pub use config::{
    HeartbeatConfig, ReconnectPolicy, SocketConfig, SocketSettings,
};
pub use error::SocketError;
pub use observer::{CloseInfo, SocketEvent, SocketObserver};
pub use socket::{Socket, SocketBuilder};
pub use state::ConnectionState;

pub use rocketlink_protocol as protocol;
pub use rocketlink_sched as sched;
pub use rocketlink_transport as transport;

/// Everything needed to build and drive a socket.
pub mod prelude {
    pub use crate::{
        CloseInfo, ConnectionState, HeartbeatConfig, ReconnectPolicy, Socket,
        SocketBuilder, SocketConfig, SocketError, SocketEvent,
        SocketObserver, SocketSettings,
    };
    pub use rocketlink_protocol::{
        EventPayload, InboundEvent, InitEvent, OutboundEvent, ProtocolError,
    };
    pub use rocketlink_sched::{ManualScheduler, Scheduler, TokioScheduler};
    pub use rocketlink_transport::{
        ConnectionId, Connector, TransportError, WebSocketConnector,
    };
}
