/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Opening the connection failed (DNS, TCP, TLS or upgrade).
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// The connection was closed.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Sending data failed.
    #[error("send failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Receiving data failed.
    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The peer stopped acknowledging heartbeats.
    #[error("peer unresponsive after {missed} missed heartbeats")]
    Unresponsive {
        /// Consecutive heartbeats that went unacknowledged.
        missed: u32,
    },

    /// The transport was shut down.
    #[error("transport shut down")]
    Shutdown,
}
