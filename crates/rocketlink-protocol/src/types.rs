//! Core protocol types for Rocketlink's wire format.
//!
//! Every frame on the wire is a two-field JSON object:
//!
//! ```text
//! { "ev": <integer event code>, "d": <payload, omitted when null> }
//! ```
//!
//! The meaning of `ev` depends on direction: frames the client sends carry
//! an [`OutboundEvent`], frames the server sends carry an [`InboundEvent`].

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// The protocol version this client speaks. Servers announce theirs in
/// the `Init` event.
pub const PROTOCOL_VERSION: i32 = 1;

// ---------------------------------------------------------------------------
// Event codes
// ---------------------------------------------------------------------------

/// Event codes the client sends to the server.
///
/// Serialized as the bare integer code, so `Ping` becomes `1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum OutboundEvent {
    /// Keep-alive ping. The server answers with [`InboundEvent::Pong`].
    Ping,
}

impl OutboundEvent {
    /// Returns the numeric wire code.
    pub fn code(self) -> u16 {
        match self {
            Self::Ping => 1,
        }
    }
}

impl From<OutboundEvent> for u16 {
    fn from(event: OutboundEvent) -> Self {
        event.code()
    }
}

impl TryFrom<u16> for OutboundEvent {
    type Error = String;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Ping),
            other => Err(format!("unknown outbound event code {other}")),
        }
    }
}

impl fmt::Display for OutboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ping => f.write_str("Ping"),
        }
    }
}

/// Event codes the server sends to the client.
///
/// Codes this client doesn't know decode into [`InboundEvent::Unknown`]
/// instead of failing, so a newer server can't break an older client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u16", into = "u16")]
pub enum InboundEvent {
    /// Answer to a [`OutboundEvent::Ping`].
    Pong,
    /// Sent once after the connection opens. Payload: [`InitEvent`].
    Init,
    /// Any code not listed above.
    Unknown(u16),
}

impl InboundEvent {
    /// Returns the numeric wire code.
    pub fn code(self) -> u16 {
        match self {
            Self::Pong => 1000,
            Self::Init => 1001,
            Self::Unknown(code) => code,
        }
    }
}

impl From<u16> for InboundEvent {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Pong,
            1001 => Self::Init,
            other => Self::Unknown(other),
        }
    }
}

impl From<InboundEvent> for u16 {
    fn from(event: InboundEvent) -> Self {
        event.code()
    }
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pong => f.write_str("Pong"),
            Self::Init => f.write_str("Init"),
            Self::Unknown(code) => write!(f, "Unknown({code})"),
        }
    }
}

// ---------------------------------------------------------------------------
// EventPayload — the envelope
// ---------------------------------------------------------------------------

/// The envelope every frame travels in.
///
/// `data` stays an untyped JSON value until a handler that knows what the
/// event code means asks for it with [`EventPayload::data_as`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload<T> {
    /// The event code.
    #[serde(rename = "ev")]
    pub event: T,

    /// Event data. Omitted on the wire when `None`; a JSON `null`
    /// decodes to `None` as well.
    #[serde(rename = "d", default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl<T> EventPayload<T> {
    /// Creates an envelope without data.
    pub fn new(event: T) -> Self {
        Self { event, data: None }
    }

    /// Creates an envelope carrying `data`.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if `data` can't be represented
    /// as JSON.
    pub fn with_data<D: Serialize>(
        event: T,
        data: &D,
    ) -> Result<Self, ProtocolError> {
        let value = serde_json::to_value(data).map_err(ProtocolError::Encode)?;
        Ok(Self {
            event,
            data: Some(value),
        })
    }

    /// Interprets the payload as `D`. Returns `Ok(None)` when there is no
    /// payload at all.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] if the payload doesn't have the
    /// shape of `D`.
    pub fn data_as<D: DeserializeOwned>(
        &self,
    ) -> Result<Option<D>, ProtocolError> {
        self.data
            .as_ref()
            .map(|value| {
                D::deserialize(value).map_err(ProtocolError::Decode)
            })
            .transpose()
    }
}

/// Payload of [`InboundEvent::Init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitEvent {
    /// Protocol version spoken by the server.
    #[serde(rename = "v")]
    pub version: i32,
}

// =========================================================================
// Tests
// =========================================================================
