//! Transport abstraction for the session channel.
//!
//! The [`Transport`] trait defines one bidirectional text message channel
//! between the client and the session server. Every frame is one JSON
//! message, so implementations handle framing internally.
//!
//! # Connection Setup
//!
//! Unlike a one-shot client, the session client reopens its channel after an
//! unclean close, so it needs a way to produce fresh transports. That is the
//! job of [`Connector`]: it is called once at start and again for every
//! reconnect attempt with the same endpoint URL.
//!
//! # Clean and unclean closes
//!
//! [`Transport::recv`] distinguishes the two ways a channel can end:
//!
//! - `None`: the peer completed a graceful close (e.g. a WebSocket close
//!   frame). The client treats this as intentional and does not reconnect.
//! - `Some(Err(_))`: the channel broke (reset, protocol error, stream ended
//!   without a close handshake). The client reports the error and schedules a
//!   reconnect.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use blanco_session_client::error::SessionError;
//! use blanco_session_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), SessionError> {
//!         // Send the JSON text message over your transport
//!         # let _ = message;
//!         Ok(())
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, SessionError>> {
//!         // Receive the next JSON text message, `None` on a graceful close
//!         None
//!     }
//!
//!     async fn close(&mut self) -> Result<(), SessionError> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     type Transport = MyTransport;
//!
//!     async fn connect(&mut self, url: &str) -> Result<MyTransport, SessionError> {
//!         # let _ = url;
//!         Ok(MyTransport {})
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::SessionError;

/// A bidirectional text message transport for the session channel.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. If `recv` is cancelled before completion,
/// calling it again must not lose data.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::TransportSend`] if the message could not be sent,
    /// or [`SessionError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, message: String) -> Result<(), SessionError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` : a complete message was received
    /// - `Some(Err(e))` : the channel broke; this is an unclean close
    /// - `None` : the channel was closed cleanly
    async fn recv(&mut self) -> Option<Result<String, SessionError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources in that case.
    async fn close(&mut self) -> Result<(), SessionError>;
}

/// Opens transports to the session endpoint.
///
/// Called with the URL from
/// [`SessionConfig::endpoint_url`](crate::client::SessionConfig::endpoint_url)
/// for the first connection and for every reconnect attempt. A returned error
/// counts as an unclean close of that attempt.
#[async_trait]
pub trait Connector: Send + 'static {
    /// The transport produced by this connector.
    type Transport: Transport;

    /// Open a new channel to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`], [`SessionError::Io`] or
    /// [`SessionError::Timeout`] when no channel could be established.
    async fn connect(&mut self, url: &str) -> Result<Self::Transport, SessionError>;
}
