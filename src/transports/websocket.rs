//! Session channel over `tokio-tungstenite`.
//!
//! This module provides [`WebSocketTransport`], a [`Transport`] over a
//! WebSocket connection, and [`WebSocketConnector`], the [`Connector`] the
//! session client uses to open one for every (re)connect attempt.
//!
//! A close frame from the server is a clean close. A stream that ends or
//! errors without a close frame is reported as an unclean close so the
//! session client retries it.
//!
//! # Feature gate
//!
//! Requires the `transport-websocket` feature, which is on by default.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), blanco_session_client::SessionError> {
//! use blanco_session_client::{Transport, WebSocketTransport};
//!
//! let mut transport =
//!     WebSocketTransport::connect("ws://localhost:8000/ws/session/ABC123/").await?;
//! transport.send(r#"{"type":"refresh_request"}"#.to_string()).await?;
//!
//! if let Some(Ok(msg)) = transport.recv().await {
//!     println!("received: {msg}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::SessionError;
use crate::transport::{Connector, Transport};

/// The tungstenite stream a [`WebSocketTransport`] wraps.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// One session channel over a WebSocket.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method is cancel-safe.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Dial `url` and complete the WebSocket handshake.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] for a malformed URL, a refused or failed
    /// TCP connect, or a rejected handshake. Socket errors keep their
    /// [`ErrorKind`](std::io::ErrorKind); everything else becomes `Other`.
    pub async fn connect(url: &str) -> Result<Self, SessionError> {
        tracing::debug!(url = %url, "connecting to session server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            SessionError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "session channel established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream (custom TLS, headers, ...).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Same as [`connect`](Self::connect), failing with
    /// [`SessionError::Timeout`] when the deadline elapses first.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Timeout`] or any error of [`connect`](Self::connect).
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, SessionError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| SessionError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    if self.closed {
                        return None;
                    }
                    return Some(Err(SessionError::TransportReceive(e.to_string())));
                }
                None if self.closed => return None,
                None => {
                    return Some(Err(SessionError::TransportReceive(
                        "connection ended without close handshake".into(),
                    )));
                }
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) => {
                    // tungstenite answers pings on its own.
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| SessionError::TransportSend(e.to_string()))
    }
}

/// Opens a [`WebSocketTransport`] per connection attempt.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// A connector without a connect deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail an attempt that is not established within `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    type Transport = WebSocketTransport;

    async fn connect(&mut self, url: &str) -> Result<WebSocketTransport, SessionError> {
        match self.connect_timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(url, timeout).await,
            None => WebSocketTransport::connect(url).await,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Serve one WebSocket connection on a loopback port with `handler` and
    /// return a session URL pointing at it.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/ws/session/ABC123/")
    }

    #[test]
    fn transport_and_connector_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
        assert_send::<WebSocketConnector>();
    }

    #[tokio::test]
    async fn malformed_url_is_io_error() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[tokio::test]
    async fn refused_connection_is_io_error() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1/ws/session/X/")
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Io(_)));
    }

    #[tokio::test]
    async fn connector_applies_timeout() {
        // The listener never answers the WebSocket handshake.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut connector =
            WebSocketConnector::new().with_connect_timeout(Duration::from_millis(50));
        let err = connector
            .connect(&format!("ws://{addr}/ws/session/ABC123/"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Timeout));
        drop(listener);
    }

    #[tokio::test]
    async fn recv_receives_text_frames() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"error","message":"x"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new().connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"type":"error","message":"x"}"#);
    }

    #[tokio::test]
    async fn close_frame_is_clean() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn dropped_connection_is_unclean() {
        let url = start_mock_server(|ws| async move {
            // Drop the TCP stream without a close handshake.
            drop(ws);
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let result = transport.recv().await;
        assert!(
            matches!(result, Some(Err(SessionError::TransportReceive(_)))),
            "expected unclean close, got {result:?}"
        );
    }

    #[tokio::test]
    async fn binary_frames_are_skipped() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Binary(vec![0x01, 0x02, 0x03].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"nueva_ronda_iniciada"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"type":"nueva_ronda_iniciada"}"#);
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        tokio_test::assert_ok!(transport.close().await);
        // Closing twice is a no-op.
        tokio_test::assert_ok!(transport.close().await);

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, SessionError::TransportClosed));
    }

    #[tokio::test]
    async fn send_reaches_server() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"type":"nueva_ronda"}"#.to_string())
            .await
            .unwrap();

        let msg = transport.recv().await.unwrap().unwrap();
        assert_eq!(msg, r#"{"type":"nueva_ronda"}"#);
    }
}
