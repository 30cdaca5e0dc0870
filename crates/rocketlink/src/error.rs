//! Error type for the client core.

use rocketlink_protocol::ProtocolError;

use crate::ConnectionState;

/// Errors returned to callers of the [`Socket`](crate::Socket).
///
/// Only caller mistakes surface here. Transport failures never do: the
/// socket absorbs them and reconnects on its own.
#[derive(Debug, thiserror::Error)]
pub enum SocketError {
    /// A required setting is missing or malformed (e.g. an empty URL).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The operation is not allowed in the current state, e.g. calling
    /// `connect()` while already connecting. Not retryable.
    #[error("socket is already running ({0}); disconnect before connecting")]
    IllegalState(ConnectionState),

    /// The socket has been shut down and can't be used again.
    #[error("socket has been shut down")]
    ShutDown,

    /// Encoding an outbound envelope failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
