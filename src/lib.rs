//! # Blanco Session Client
//!
//! Resilient client for a live "Blanco" party-game session.
//!
//! The crate keeps a persistent WebSocket channel to the session server,
//! reconnects with linear backoff after unclean closes, decodes the server's
//! `type`-tagged JSON pushes and turns each one into a [`Reaction`]: a
//! notification, an in-place snapshot update, a delayed reload or a redirect.
//! Host commands (start, eliminate, expel, guess...) are encoded on the same
//! channel.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketConnector`
//! - **Snapshot reconciliation**: eliminations the server never announces are
//!   detected by diffing snapshots
//! - **Event-driven**: receive typed [`SessionEvent`]s via a channel and hand
//!   them to a [`ReactionDispatcher`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use blanco_session_client::{
//!     ObservedSurface, ReactionDispatcher, SessionClient, SessionConfig, WebSocketConnector,
//! };
//!
//! let config = SessionConfig::new("localhost:8000", "ABC123");
//! let (client, events) =
//!     SessionClient::start(WebSocketConnector::new(), ObservedSurface::default(), config)?;
//!
//! let dispatcher = ReactionDispatcher::new(Arc::new(MyPresenter));
//! dispatcher.drive(events).await;
//! ```

pub mod client;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod presentation;
pub mod protocol;
pub mod reaction;
pub mod reconcile;
pub mod reconnect;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{ConnectionState, SessionClient, SessionConfig};
pub use error::SessionError;
pub use event::{DisconnectReason, SessionEvent};
pub use presentation::{ObservedSurface, Presenter, SnapshotUpdate, SurfaceProbe};
pub use protocol::{ClientMessage, ServerMessage, SessionSnapshot, SessionState};
pub use reaction::{Action, Reaction, ReactionDispatcher, Severity};
pub use reconcile::{PlayerMatching, Reconciler};
pub use reconnect::ReconnectPolicy;
pub use transport::{Connector, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
