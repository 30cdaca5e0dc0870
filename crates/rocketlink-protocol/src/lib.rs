//! Wire protocol for Rocketlink.
//!
//! - **Types** ([`EventPayload`], [`OutboundEvent`], [`InboundEvent`],
//!   [`InitEvent`]) — the envelope and event codes that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how envelopes become bytes.
//! - **Dispatch** ([`Dispatcher`]) — routing decoded envelopes to handlers.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (EventPayload) → Socket (connection state)
//! ```

mod codec;
mod dispatch;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use dispatch::{Dispatched, Dispatcher, DispatcherBuilder, Handler};
pub use error::ProtocolError;
pub use rocketlink_transport::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_RECONNECT_REQUESTED,
};
pub use types::{
    EventPayload, InboundEvent, InitEvent, OutboundEvent, PROTOCOL_VERSION,
};

/// Returns `true` for close codes that end a connection on purpose:
/// normal closure and the reconnect request.
pub fn is_expected_close(code: u16) -> bool {
    matches!(code, CLOSE_NORMAL | CLOSE_RECONNECT_REQUESTED)
}
