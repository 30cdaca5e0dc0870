//! Error types for the protocol layer.
//!
//! Each crate in Rocketlink defines its own error enum. A `ProtocolError`
//! always means a problem turning envelopes into bytes (or back), or a
//! handler rejecting the payload it was given.

use crate::InboundEvent;

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, a missing `ev` field, or a `d`
    /// payload that doesn't match what the handler expected.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message is well-formed but violates protocol rules.
    #[error("invalid message: {0}")]
    InvalidMessage(String),

    /// A registered handler failed while processing an event.
    #[error("handler for {event} failed: {message}")]
    Handler {
        /// The event code the handler was registered for.
        event: InboundEvent,
        /// What went wrong.
        message: String,
    },
}
