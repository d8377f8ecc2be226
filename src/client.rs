//! Reconnecting session client.
//!
//! [`SessionClient`] is a thin handle over a background session loop. The
//! loop owns the channel, the snapshot cache and the reconnect counter; the
//! handle only queues commands and reads status. Events are emitted on a
//! bounded channel ([`tokio::sync::mpsc::Receiver<SessionEvent>`]) returned
//! from [`SessionClient::start`].
//!
//! # Lifecycle
//!
//! ```text
//! Connecting ──open──▶ Open ──close──▶ Closed(Clean)   → Disconnected
//!     ▲                                Closed(Unclean) → retry budget left?
//!     └──────────── backoff sleep ◀──────── yes                no → Disconnected
//! ```
//!
//! A failed connect attempt counts as an unclean close. Each successful open
//! resets the retry count and reseeds the snapshot cache from the
//! [`SurfaceProbe`].
//!
//! # Example
//!
//! ```rust,ignore
//! let config = SessionConfig::new("game.example.com", "ABC123").with_secure(true);
//! let probe = ObservedSurface::default();
//! let (mut client, mut events) = SessionClient::start(WebSocketConnector::new(), probe, config)?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::Reaction(reaction) => dispatcher.dispatch(reaction),
//!         SessionEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

use crate::dispatch;
use crate::error::{Result, SessionError};
use crate::event::{DisconnectReason, SessionEvent};
use crate::presentation::SurfaceProbe;
use crate::protocol::{ClientMessage, PlayerId, UserId};
use crate::reaction::{Reaction, Severity, RELOAD_AFTER_OPEN_IN_PROGRESS};
use crate::reconcile::{PlayerMatching, Reconciler};
use crate::reconnect::ReconnectPolicy;
use crate::transport::{Connector, Transport};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default deadline for one connect attempt.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default path under which the server routes session channels.
pub const DEFAULT_PATH_PREFIX: &str = "/ws/session/";

/// Status text shown on transport errors.
pub const CONNECTION_ERROR_STATUS: &str = "Connection error";

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SessionClient`].
///
/// Only the host and session code are required.
///
/// # Example
///
/// ```
/// use blanco_session_client::client::SessionConfig;
///
/// let config = SessionConfig::new("localhost:8000", "ABC123");
/// assert_eq!(config.endpoint_url(), "ws://localhost:8000/ws/session/ABC123/");
///
/// let config = config.with_secure(true);
/// assert_eq!(config.endpoint_url(), "wss://localhost:8000/ws/session/ABC123/");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Host (and optional port) serving the session page.
    pub host: String,
    /// Code identifying the session on the server.
    pub session_code: String,
    /// Use `wss://` instead of `ws://`, as a page served over https would.
    pub secure: bool,
    /// Path in front of the session code. Defaults to [`DEFAULT_PATH_PREFIX`].
    pub path_prefix: String,
    /// Retry behavior after unclean closes.
    pub reconnect: ReconnectPolicy,
    /// How the reconciler pairs players of consecutive snapshots.
    pub player_matching: PlayerMatching,
    /// Emit a reload when a channel opens while the surface shows a game in
    /// progress. Defaults to `true`.
    pub reload_on_open_in_progress: bool,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events are dropped with a warning;
    /// the final `Disconnected` event is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// Time the session loop gets to close the channel on
    /// [`SessionClient::disconnect`] before it is aborted.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Deadline for a single connect attempt. Defaults to **10 seconds**.
    pub connect_timeout: Duration,
}

impl SessionConfig {
    /// Create a configuration with default values.
    pub fn new(host: impl Into<String>, session_code: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            session_code: session_code.into(),
            secure: false,
            path_prefix: DEFAULT_PATH_PREFIX.to_string(),
            reconnect: ReconnectPolicy::default(),
            player_matching: PlayerMatching::default(),
            reload_on_open_in_progress: true,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    #[must_use]
    pub fn with_path_prefix(mut self, path_prefix: impl Into<String>) -> Self {
        self.path_prefix = path_prefix.into();
        self
    }

    #[must_use]
    pub fn with_reconnect_policy(mut self, reconnect: ReconnectPolicy) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_player_matching(mut self, player_matching: PlayerMatching) -> Self {
        self.player_matching = player_matching;
        self
    }

    #[must_use]
    pub fn with_reload_on_open_in_progress(mut self, enabled: bool) -> Self {
        self.reload_on_open_in_progress = enabled;
        self
    }

    /// Set the capacity of the bounded event channel (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The channel address: `{ws|wss}://{host}{path_prefix}{session_code}/`.
    pub fn endpoint_url(&self) -> String {
        let scheme = if self.secure { "wss" } else { "ws" };
        let prefix = self.path_prefix.trim_matches('/');
        if prefix.is_empty() {
            format!("{scheme}://{}/{}/", self.host, self.session_code)
        } else {
            format!("{scheme}://{}/{prefix}/{}/", self.host, self.session_code)
        }
    }

    /// Check that the configuration yields a usable endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] for an empty host, or a session
    /// code that is empty or contains `/` or whitespace.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SessionError::InvalidConfig("host is empty".into()));
        }
        if self.session_code.is_empty() {
            return Err(SessionError::InvalidConfig("session code is empty".into()));
        }
        if self
            .session_code
            .chars()
            .any(|c| c == '/' || c.is_whitespace())
        {
            return Err(SessionError::InvalidConfig(format!(
                "session code {:?} is not a single path segment",
                self.session_code
            )));
        }
        Ok(())
    }
}

// ── Connection state ────────────────────────────────────────────────

/// How a channel ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseKind {
    /// Graceful close, acknowledged by both sides.
    Clean,
    /// Anything else: errors, resets, failed connect attempts.
    Unclean,
}

/// Where the session loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closed(CloseKind),
}

/// State shared between the client handle and the session loop. Only the
/// loop writes it.
struct SharedState {
    open: AtomicBool,
    attempts: AtomicU32,
    connection: Mutex<ConnectionState>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            attempts: AtomicU32::new(0),
            connection: Mutex::new(ConnectionState::Connecting),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running session.
///
/// Command methods never fail: a command issued while the channel is not
/// open is dropped (at-most-once delivery while connected, no queueing).
pub struct SessionClient {
    /// Sender half of the command channel to the session loop.
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    /// Shared state updated by the session loop.
    state: Arc<SharedState>,
    /// Handle to the background session loop task.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Oneshot sender asking the session loop to shut down gracefully.
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SessionClient {
    /// Validate `config`, spawn the session loop and return a handle plus
    /// the event receiver. The loop starts connecting immediately.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidConfig`] if `config` does not validate.
    pub fn start<C, P>(
        connector: C,
        probe: P,
        config: SessionConfig,
    ) -> Result<(Self, mpsc::Receiver<SessionEvent>)>
    where
        C: Connector,
        P: SurfaceProbe,
    {
        config.validate()?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(SharedState::new());

        let session = SessionLoop {
            connector,
            probe: Box::new(probe),
            url: config.endpoint_url(),
            reconnect: config.reconnect,
            connect_timeout: config.connect_timeout,
            reload_on_open_in_progress: config.reload_on_open_in_progress,
            reconciler: Reconciler::new(config.player_matching),
            attempts: 0,
            last_error: None,
            cmd_rx,
            event_tx,
            state: Arc::clone(&state),
            shutdown_rx,
        };
        let task = tokio::spawn(session.run());

        let client = Self {
            cmd_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };

        Ok((client, event_rx))
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Eliminate a player from the current round.
    pub fn eliminate_player(&self, player_id: PlayerId) {
        self.send(ClientMessage::EliminatePlayer { player_id });
    }

    /// Expel a user from the session.
    pub fn expel_player(&self, user_id: UserId) {
        self.send(ClientMessage::ExpelPlayer { user_id });
    }

    /// Start another round.
    pub fn start_new_round(&self) {
        self.send(ClientMessage::StartNewRound);
    }

    /// Start the game from the lobby.
    pub fn start_game(&self) {
        self.send(ClientMessage::StartGame);
    }

    /// End the game for everyone.
    pub fn end_game(&self) {
        self.send(ClientMessage::EndGame);
    }

    /// Submit an eliminated impostor's guess at the real word.
    pub fn submit_guess(&self, guessed_word: impl Into<String>) {
        self.send(ClientMessage::SubmitGuess {
            guessed_word: guessed_word.into(),
        });
    }

    /// Ask the server for a fresh snapshot.
    pub fn request_refresh(&self) {
        self.send(ClientMessage::RefreshRequest);
    }

    /// Close the channel on purpose. No reconnect follows, and a pending
    /// backoff is cancelled. Reload/redirect timers already handed to a
    /// [`ReactionDispatcher`](crate::reaction::ReactionDispatcher) keep running.
    pub async fn disconnect(&mut self) {
        debug!("SessionClient: disconnect requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.open.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while a channel is open and commands are delivered.
    pub fn is_open(&self) -> bool {
        self.state.open.load(Ordering::Acquire)
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.state.attempts.load(Ordering::Acquire)
    }

    /// Current lifecycle state of the channel.
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.connection.lock().await
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn send(&self, msg: ClientMessage) {
        if !self.state.open.load(Ordering::Acquire) {
            debug!(command = msg.tag(), "session channel not open, dropping command");
            return;
        }
        if self.cmd_tx.send(msg).is_err() {
            debug!("session loop gone, dropping command");
        }
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("open", &self.is_open())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        // No executor context to drive a graceful close here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// How one connection ended.
enum Outcome {
    Closed(CloseKind),
    Shutdown,
}

struct SessionLoop<C: Connector> {
    connector: C,
    probe: Box<dyn SurfaceProbe>,
    url: String,
    reconnect: ReconnectPolicy,
    connect_timeout: Duration,
    reload_on_open_in_progress: bool,
    reconciler: Reconciler,
    attempts: u32,
    last_error: Option<String>,
    cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    event_tx: mpsc::Sender<SessionEvent>,
    state: Arc<SharedState>,
    shutdown_rx: oneshot::Receiver<()>,
}

impl<C: Connector> SessionLoop<C> {
    async fn run(mut self) {
        debug!(url = %self.url, "session loop started");

        loop {
            set_connection(&self.state, ConnectionState::Connecting).await;

            let outcome = match self.connect().await {
                Ok(Some(mut transport)) => {
                    self.on_open().await;
                    let outcome = self.drive(&mut transport).await;
                    self.state.open.store(false, Ordering::Release);
                    outcome
                }
                Ok(None) => Outcome::Shutdown,
                Err(e) => {
                    warn!(url = %self.url, error = %e, "failed to open session channel");
                    self.report_error(&e).await;
                    Outcome::Closed(CloseKind::Unclean)
                }
            };

            match outcome {
                Outcome::Shutdown => {
                    self.finish(CloseKind::Clean, DisconnectReason::ClientDisconnect)
                        .await;
                    break;
                }
                Outcome::Closed(CloseKind::Clean) => {
                    info!("session channel closed by server");
                    self.finish(CloseKind::Clean, DisconnectReason::ClosedByServer)
                        .await;
                    break;
                }
                Outcome::Closed(CloseKind::Unclean) => {
                    let Some(delay) = self.reconnect.delay_for(self.attempts) else {
                        warn!(attempts = self.attempts, "reconnect attempts exhausted");
                        let last_error = self.last_error.take();
                        self.finish(
                            CloseKind::Unclean,
                            DisconnectReason::RetriesExhausted { last_error },
                        )
                        .await;
                        break;
                    };
                    set_connection(&self.state, ConnectionState::Closed(CloseKind::Unclean))
                        .await;

                    self.attempts += 1;
                    self.state.attempts.store(self.attempts, Ordering::Release);
                    info!(
                        attempt = self.attempts,
                        delay_ms = delay.as_millis() as u64,
                        "scheduling reconnect"
                    );
                    let scheduled = SessionEvent::ReconnectScheduled {
                        attempt: self.attempts,
                        delay,
                    };
                    emit_event(&self.event_tx, scheduled).await;

                    if !self.backoff(delay).await {
                        self.finish(CloseKind::Unclean, DisconnectReason::ClientDisconnect)
                            .await;
                        break;
                    }
                }
            }
        }

        debug!("session loop exited");
    }

    /// One connect attempt. `Ok(None)` when shutdown was requested meanwhile.
    async fn connect(&mut self) -> Result<Option<C::Transport>> {
        let attempt =
            tokio::time::timeout(self.connect_timeout, self.connector.connect(&self.url));
        tokio::select! {
            _ = &mut self.shutdown_rx => Ok(None),
            result = attempt => match result {
                Ok(Ok(transport)) => Ok(Some(transport)),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(SessionError::Timeout),
            },
        }
    }

    /// Reset the retry count and seed the cache from the presentation surface.
    async fn on_open(&mut self) {
        self.attempts = 0;
        self.last_error = None;
        self.state.attempts.store(0, Ordering::Release);

        // Commands queued for a previous channel are not replayed.
        while let Ok(stale) = self.cmd_rx.try_recv() {
            debug!(command = stale.tag(), "dropping command queued before reconnect");
        }

        let observed = self.probe.observe();
        let in_progress = observed.state.is_in_progress();
        self.reconciler.bootstrap(observed.into_snapshot());

        self.state.open.store(true, Ordering::Release);
        set_connection(&self.state, ConnectionState::Open).await;
        info!(url = %self.url, "session channel open");
        emit_event(&self.event_tx, SessionEvent::Connected).await;

        if in_progress && self.reload_on_open_in_progress {
            let reload = Reaction::reload(RELOAD_AFTER_OPEN_IN_PROGRESS);
            emit_event(&self.event_tx, reload.into()).await;
        }
    }

    /// Multiplex commands, inbound frames and shutdown until the channel ends.
    async fn drive(&mut self, transport: &mut C::Transport) -> Outcome {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    let Some(msg) = cmd else {
                        debug!("command channel closed, closing session channel");
                        let _ = transport.close().await;
                        return Outcome::Shutdown;
                    };
                    debug!(command = msg.tag(), "sending command");
                    match serde_json::to_string(&msg) {
                        Ok(json) => {
                            if let Err(e) = transport.send(json).await {
                                error!("transport send error: {e}");
                                self.report_error(&e).await;
                                return Outcome::Closed(CloseKind::Unclean);
                            }
                        }
                        Err(e) => {
                            error!("failed to serialize command: {e}");
                        }
                    }
                }

                _ = &mut self.shutdown_rx => {
                    debug!("shutdown signal received");
                    let _ = transport.close().await;
                    return Outcome::Shutdown;
                }

                incoming = transport.recv() => {
                    match incoming {
                        Some(Ok(text)) => {
                            let Some(message) = dispatch::decode(&text) else {
                                continue;
                            };
                            if let Some(reaction) = dispatch::route(message, &mut self.reconciler) {
                                emit_event(&self.event_tx, reaction.into()).await;
                            }
                        }
                        Some(Err(e)) => {
                            warn!("session channel error: {e}");
                            self.report_error(&e).await;
                            return Outcome::Closed(CloseKind::Unclean);
                        }
                        None => return Outcome::Closed(CloseKind::Clean),
                    }
                }
            }
        }
    }

    /// Sleep out the backoff. Returns `false` if shutdown was requested.
    async fn backoff(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                _ = &mut self.shutdown_rx => {
                    debug!("shutdown during reconnect backoff");
                    return false;
                }
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(msg) => debug!(command = msg.tag(), "channel closed, dropping command"),
                    None => return false,
                },
            }
        }
    }

    async fn report_error(&mut self, e: &SessionError) {
        self.last_error = Some(e.to_string());
        let status = SessionEvent::ConnectionStatus {
            message: CONNECTION_ERROR_STATUS.to_string(),
            severity: Severity::Danger,
        };
        emit_event(&self.event_tx, status).await;
    }

    /// Record the final state and emit the terminal event.
    async fn finish(&mut self, close: CloseKind, reason: DisconnectReason) {
        set_connection(&self.state, ConnectionState::Closed(close)).await;
        emit_disconnected(&self.event_tx, &self.state, reason).await;
    }
}

async fn set_connection(state: &SharedState, connection: ConnectionState) {
    *state.connection.lock().await = connection;
}

/// Emit an event. If the channel is full, log a warning and drop it so the
/// loop never blocks on a slow consumer.
async fn emit_event(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// `Disconnected` is the last event and is never dropped.
async fn emit_disconnected(
    event_tx: &mpsc::Sender<SessionEvent>,
    state: &SharedState,
    reason: DisconnectReason,
) {
    state.open.store(false, Ordering::Release);
    let event = SessionEvent::Disconnected { reason };
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

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
    use crate::presentation::ObservedSurface;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    /// Transport that never yields a frame and records what it was sent.
    struct SilentTransport {
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for SilentTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), SessionError> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SessionError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), SessionError> {
            self.closed.store(true, Ordering::Release);
            Ok(())
        }
    }

    struct SilentConnector {
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Connector for SilentConnector {
        type Transport = SilentTransport;

        async fn connect(
            &mut self,
            _url: &str,
        ) -> std::result::Result<SilentTransport, SessionError> {
            Ok(SilentTransport {
                sent: Arc::clone(&self.sent),
                closed: Arc::clone(&self.closed),
            })
        }
    }

    fn silent() -> (SilentConnector, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let connector = SilentConnector {
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (connector, sent, closed)
    }

    #[test]
    fn config_defaults() {
        let config = SessionConfig::new("localhost:8000", "ABC123");
        assert!(!config.secure);
        assert_eq!(config.path_prefix, DEFAULT_PATH_PREFIX);
        assert_eq!(config.reconnect, ReconnectPolicy::default());
        assert_eq!(config.player_matching, PlayerMatching::ByPosition);
        assert!(config.reload_on_open_in_progress);
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn endpoint_url_normalizes_prefix() {
        let config = SessionConfig::new("example.com", "X1").with_path_prefix("ws/partida");
        assert_eq!(config.endpoint_url(), "ws://example.com/ws/partida/X1/");

        let config = config.with_path_prefix("/");
        assert_eq!(config.endpoint_url(), "ws://example.com/X1/");
    }

    #[test]
    fn validate_rejects_bad_endpoints() {
        assert!(SessionConfig::new("", "ABC").validate().is_err());
        assert!(SessionConfig::new("h", "").validate().is_err());
        assert!(SessionConfig::new("h", "A/B").validate().is_err());
        assert!(SessionConfig::new("h", "A B").validate().is_err());
        assert!(SessionConfig::new("h", "AB-12").validate().is_ok());
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = SessionConfig::new("h", "c").with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn start_rejects_invalid_config() {
        let (connector, _sent, _closed) = silent();
        let result = SessionClient::start(
            connector,
            ObservedSurface::default(),
            SessionConfig::new("", "c"),
        );
        assert!(matches!(result, Err(SessionError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn open_channel_sends_commands() {
        let (connector, sent, _closed) = silent();
        let (mut client, mut events) = SessionClient::start(
            connector,
            ObservedSurface::default(),
            SessionConfig::new("h", "c"),
        )
        .unwrap();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert!(client.is_open());
        assert_eq!(client.connection_state().await, ConnectionState::Open);

        client.start_game();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            sent.lock().unwrap().as_slice(),
            [r#"{"type":"iniciar_partida"}"#.to_string()]
        );

        client.disconnect().await;
    }

    #[tokio::test]
    async fn disconnect_closes_transport_and_ends_events() {
        let (connector, _sent, closed) = silent();
        let (mut client, mut events) = SessionClient::start(
            connector,
            ObservedSurface::default(),
            SessionConfig::new("h", "c"),
        )
        .unwrap();

        let _ = events.recv().await; // Connected
        client.disconnect().await;

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Disconnected {
                reason: DisconnectReason::ClientDisconnect
            }
        );
        assert!(events.recv().await.is_none());
        assert!(closed.load(Ordering::Acquire));
        assert!(!client.is_open());

        // Commands after disconnect are dropped silently.
        client.end_game();
        client.disconnect().await;
    }

    #[tokio::test]
    async fn open_in_progress_schedules_reload() {
        let (connector, _sent, _closed) = silent();
        let probe = ObservedSurface {
            state: crate::protocol::SessionState::InProgress,
            ..ObservedSurface::default()
        };
        let (mut client, mut events) =
            SessionClient::start(connector, probe, SessionConfig::new("h", "c")).unwrap();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        match events.recv().await.unwrap() {
            SessionEvent::Reaction(reaction) => {
                assert_eq!(reaction.reload_delay(), Some(Duration::from_millis(2000)));
                assert!(reaction.notice.is_none());
            }
            other => panic!("expected reload reaction, got {other:?}"),
        }

        client.disconnect().await;
    }

    /// Counts how often the surface was read.
    #[derive(Default)]
    struct CountingProbe {
        reads: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl SurfaceProbe for CountingProbe {
        fn observe(&self) -> ObservedSurface {
            self.reads.fetch_add(1, Ordering::AcqRel);
            ObservedSurface::default()
        }
    }

    #[tokio::test]
    async fn surface_is_read_before_connected_is_emitted() {
        let (connector, _sent, _closed) = silent();
        let probe = CountingProbe::default();
        let reads = Arc::clone(&probe.reads);
        let (mut client, mut events) =
            SessionClient::start(connector, probe, SessionConfig::new("h", "c")).unwrap();

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Connected);
        assert_eq!(reads.load(Ordering::Acquire), 1);

        client.disconnect().await;
    }

    #[tokio::test]
    async fn debug_impl_for_client() {
        let (connector, _sent, _closed) = silent();
        let (mut client, mut events) = SessionClient::start(
            connector,
            ObservedSurface::default(),
            SessionConfig::new("h", "c"),
        )
        .unwrap();
        let _ = events.recv().await;

        let debug_str = format!("{client:?}");
        assert!(debug_str.contains("SessionClient"));
        assert!(debug_str.contains("reconnect_attempts"));

        client.disconnect().await;
    }
}
