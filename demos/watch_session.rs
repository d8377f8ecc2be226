//! # Watch Session Example
//!
//! Attaches to a running session and prints everything the client would do
//! to a page: notifications, connection status, roster updates, reloads and
//! redirects.
//!
//! ## Running
//!
//! ```sh
//! # Start the session server on localhost:8000, then:
//! BLANCO_SESSION=ABC123 cargo run --example watch_session
//!
//! # Other host, TLS:
//! BLANCO_HOST=game.example.com BLANCO_SECURE=1 BLANCO_SESSION=ABC123 \
//!     cargo run --example watch_session
//! ```

use std::sync::Arc;

use blanco_session_client::{
    ObservedSurface, Presenter, ReactionDispatcher, SessionClient, SessionConfig, Severity,
    SnapshotUpdate, WebSocketConnector,
};

/// Default host when `BLANCO_HOST` is not set.
const DEFAULT_HOST: &str = "localhost:8000";

/// Prints presentation instructions instead of rendering them.
struct ConsolePresenter;

impl Presenter for ConsolePresenter {
    fn notify(&self, message: &str, severity: Severity) {
        tracing::info!("[{severity}] {message}");
    }

    fn show_connection_status(&self, message: &str, severity: Severity) {
        tracing::warn!("connection [{severity}] {message}");
    }

    fn apply_snapshot(&self, update: &SnapshotUpdate) {
        tracing::info!(
            "{}: {} active, {} eliminated",
            update.state_label,
            update.active_player_count,
            update.eliminated_player_count
        );
        for row in &update.score_rows {
            let host = if row.is_host { " (host)" } else { "" };
            tracing::info!("  {}{host}: {} pts", row.username, row.points);
        }
    }

    fn reload_current_page(&self) {
        tracing::info!("-> reload");
    }

    fn navigate_to(&self, path: &str) {
        tracing::info!("-> navigate to {path}");
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let host = std::env::var("BLANCO_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let session = std::env::var("BLANCO_SESSION")?;
    let secure = std::env::var("BLANCO_SECURE").is_ok_and(|v| v == "1");

    let config = SessionConfig::new(host, session).with_secure(secure);
    tracing::info!("Watching {}", config.endpoint_url());

    // A headless watcher has no page to read counters from; the first
    // snapshot fills the cache.
    let (mut client, mut events) =
        SessionClient::start(WebSocketConnector::new(), ObservedSurface::default(), config)?;

    let dispatcher = ReactionDispatcher::new(Arc::new(ConsolePresenter));

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };
                if !dispatcher.handle_event(event) {
                    break;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, disconnecting");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.disconnect().await;
    Ok(())
}
