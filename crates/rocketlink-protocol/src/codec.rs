//! Codec trait and the JSON implementation used on the wire.
//!
//! The socket never calls `serde_json` directly; it goes through a
//! [`Codec`] so tests and alternative servers can swap the encoding.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// Encodes values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because a codec is shared by the socket's
/// caller-facing handle and its listener worker, which run on different
/// Tokio worker threads.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that speaks JSON via `serde_json`.
///
/// `None` payloads are left out of the output entirely, matching what the
/// server expects for data-less events.
///
/// ## Example
///
/// ```rust
/// use rocketlink_protocol::{Codec, EventPayload, JsonCodec, OutboundEvent};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&EventPayload::new(OutboundEvent::Ping)).unwrap();
/// assert_eq!(bytes, br#"{"ev":1}"#);
///
/// let decoded: EventPayload<OutboundEvent> = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded.event, OutboundEvent::Ping);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
