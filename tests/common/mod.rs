#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for session client integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`ScriptedConnector`] handing
//! them out one per connect attempt, and builders for server JSON frames.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use blanco_session_client::{Connector, SessionError, Transport};
use serde_json::json;

pub type Script = Vec<Option<Result<String, SessionError>>>;

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted transport.
///
/// Scripted server frames are consumed in order by `recv()`; once the script
/// is exhausted `recv()` hangs so the channel stays open until the client
/// shuts it down. Sent messages are recorded in `sent`.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, SessionError>>>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a transport with the given script, plus handles for inspecting
    /// sent messages and whether close was called.
    pub fn new(incoming: Script) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }

    /// A transport that stays open and never receives anything.
    pub fn idle() -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), SessionError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SessionError::TransportClosed);
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, SessionError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ── ScriptedConnector ───────────────────────────────────────────────

/// Hands out prepared connect results in order and records every URL it was
/// asked for. Once the script runs out, every attempt fails.
pub struct ScriptedConnector {
    attempts: VecDeque<Result<MockTransport, SessionError>>,
    pub urls: Arc<StdMutex<Vec<String>>>,
}

impl ScriptedConnector {
    pub fn new(attempts: Vec<Result<MockTransport, SessionError>>) -> Self {
        Self {
            attempts: VecDeque::from(attempts),
            urls: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// A connector that refuses every attempt.
    pub fn refusing() -> Self {
        Self::new(Vec::new())
    }

    /// Handle to the URLs requested so far.
    pub fn urls(&self) -> Arc<StdMutex<Vec<String>>> {
        Arc::clone(&self.urls)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    type Transport = MockTransport;

    async fn connect(&mut self, url: &str) -> Result<MockTransport, SessionError> {
        self.urls.lock().unwrap().push(url.to_string());
        self.attempts
            .pop_front()
            .unwrap_or_else(|| Err(SessionError::Connect("connection refused".into())))
    }
}

/// Frame ending the channel without a close handshake.
pub fn reset() -> Option<Result<String, SessionError>> {
    Some(Err(SessionError::TransportReceive(
        "connection reset without closing handshake".into(),
    )))
}

/// Frame ending the channel with a close handshake.
pub fn clean_close() -> Option<Result<String, SessionError>> {
    None
}

/// A text frame.
pub fn frame(text: impl Into<String>) -> Option<Result<String, SessionError>> {
    Some(Ok(text.into()))
}

// ── JSON helpers ────────────────────────────────────────────────────

/// A roster entry the way the server serializes it.
pub fn player_json(id: u64, username: &str, eliminated: bool) -> serde_json::Value {
    json!({
        "id": id,
        "user_id": id + 100,
        "username": username,
        "es_host": id == 1,
        "puntos": 0,
        "ronda_actual": 1,
        "eliminado": eliminated,
        "es_impostor": false,
        "es_infiltrado": false,
        "es_bueno": !eliminated,
    })
}

/// A `partida_updated` frame for a running game with the given roster.
pub fn snapshot_json(players: Vec<serde_json::Value>) -> String {
    let eliminated = players
        .iter()
        .filter(|p| p["eliminado"].as_bool().unwrap_or(false))
        .count();
    let active = players.len() - eliminated;
    json!({
        "type": "partida_updated",
        "data": {
            "estado": "en_juego",
            "ronda_terminada": false,
            "jugadores_activos": active,
            "jugadores_eliminados": eliminated,
            "palabra_secreta": "GATO",
            "ronda_actual": 1,
            "jugadores": players,
        }
    })
    .to_string()
}

pub fn user_connected_json(username: &str) -> String {
    json!({ "type": "user_connected", "username": username }).to_string()
}

pub fn game_ended_json(message: &str) -> String {
    json!({ "type": "partida_terminada", "message": message }).to_string()
}

pub fn guess_result_json(correct: bool, message: &str) -> String {
    json!({
        "type": "adivinacion_resultado",
        "resultado": { "correcto": correct, "mensaje": message, "ronda_terminada": correct },
    })
    .to_string()
}
