//! Error types for the session client.

use thiserror::Error;

/// Errors that can occur inside the session client.
///
/// None of these escape the public command API: commands issued while the
/// channel is down are dropped, and transport failures feed the reconnect
/// path. They surface from [`Transport`](crate::Transport) and
/// [`Connector`](crate::transport::Connector) implementations and from
/// [`SessionConfig::validate`](crate::client::SessionConfig::validate).
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was already closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to open a new channel to the session server.
    #[error("connect error: {0}")]
    Connect(String),

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session configuration cannot produce a usable endpoint.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for session client operations.
pub type Result<T> = std::result::Result<T, SessionError>;
