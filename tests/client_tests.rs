//! Integration-style client tests for the session client.
//!
//! Uses the scripted transports from `tests/common` to drive
//! `SessionClient` through opens, closes and server pushes, and checks the
//! events, reconnect schedule and encoded commands it produces.

mod common;

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use blanco_session_client::reaction::Action;
use blanco_session_client::{
    Connector, DisconnectReason, ObservedSurface, Presenter, ReactionDispatcher, ReconnectPolicy,
    SessionClient, SessionConfig, SessionError, SessionEvent, SessionState, Severity,
    SnapshotUpdate,
};
use tokio::sync::mpsc;

use common::{
    clean_close, frame, game_ended_json, guess_result_json, player_json, reset, snapshot_json,
    user_connected_json, MockTransport, ScriptedConnector,
};

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn config() -> SessionConfig {
    SessionConfig::new("localhost:8000", "ABC123")
}

async fn next(events: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    events.recv().await.expect("event channel closed early")
}

fn connection_error() -> SessionEvent {
    SessionEvent::ConnectionStatus {
        message: "Connection error".into(),
        severity: Severity::Danger,
    }
}

fn scheduled(attempt: u32, millis: u64) -> SessionEvent {
    SessionEvent::ReconnectScheduled {
        attempt,
        delay: Duration::from_millis(millis),
    }
}

#[derive(Default)]
struct RecordingPresenter {
    calls: StdMutex<Vec<String>>,
}

impl RecordingPresenter {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Presenter for RecordingPresenter {
    fn notify(&self, message: &str, severity: Severity) {
        self.push(format!("notify:{severity}:{message}"));
    }

    fn show_connection_status(&self, message: &str, severity: Severity) {
        self.push(format!("status:{severity}:{message}"));
    }

    fn apply_snapshot(&self, update: &SnapshotUpdate) {
        self.push(format!("apply:{}", update.active_player_count));
    }

    fn reload_current_page(&self) {
        self.push("reload".into());
    }

    fn navigate_to(&self, path: &str) {
        self.push(format!("navigate:{path}"));
    }
}

/// Never finishes a connect attempt.
struct HangingConnector;

#[async_trait]
impl Connector for HangingConnector {
    type Transport = MockTransport;

    async fn connect(&mut self, _url: &str) -> Result<MockTransport, SessionError> {
        std::future::pending().await
    }
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connects_to_session_endpoint() {
    let (transport, _sent, _closed) = MockTransport::idle();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let urls = connector.urls();

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();

    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    assert_eq!(
        urls.lock().unwrap().as_slice(),
        ["ws://localhost:8000/ws/session/ABC123/".to_string()]
    );

    client.disconnect().await;
}

#[tokio::test]
async fn clean_close_does_not_reconnect() {
    let (transport, _sent, _closed) = MockTransport::new(vec![clean_close()]);
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let urls = connector.urls();

    let (client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();

    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Disconnected {
            reason: DisconnectReason::ClosedByServer
        }
    );
    assert!(events.recv().await.is_none());
    assert_eq!(urls.lock().unwrap().len(), 1);
    assert!(!client.is_open());
}

#[tokio::test(start_paused = true)]
async fn backoff_is_linear_and_gives_up_after_five_retries() {
    let connector = ScriptedConnector::refusing();
    let urls = connector.urls();
    let started = tokio::time::Instant::now();

    let (client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();

    for attempt in 1..=5u32 {
        assert_eq!(next(&mut events).await, connection_error());
        assert_eq!(
            next(&mut events).await,
            scheduled(attempt, u64::from(attempt) * 1000)
        );
    }

    // Sixth unclean close in a row.
    assert_eq!(next(&mut events).await, connection_error());
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Disconnected {
            reason: DisconnectReason::RetriesExhausted {
                last_error: Some("connect error: connection refused".into())
            }
        }
    );
    assert!(events.recv().await.is_none());

    assert_eq!(urls.lock().unwrap().len(), 6);
    let waited = started.elapsed();
    assert!(waited >= Duration::from_secs(15), "waited {waited:?}");
    assert!(waited < Duration::from_secs(16), "waited {waited:?}");
    assert_eq!(client.reconnect_attempts(), 5);
}

#[tokio::test(start_paused = true)]
async fn successful_open_resets_retry_count() {
    let (first, _, _) = MockTransport::new(vec![reset()]);
    let (second, _, _) = MockTransport::new(vec![reset()]);
    let connector = ScriptedConnector::new(vec![Ok(first), Ok(second)]);

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();

    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    assert_eq!(next(&mut events).await, connection_error());
    assert_eq!(next(&mut events).await, scheduled(1, 1000));

    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    assert_eq!(next(&mut events).await, connection_error());
    // Back to the first step of the schedule.
    assert_eq!(next(&mut events).await, scheduled(1, 1000));
    assert_eq!(client.reconnect_attempts(), 1);

    client.disconnect().await;
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Disconnected {
            reason: DisconnectReason::ClientDisconnect
        }
    );
}

#[tokio::test(start_paused = true)]
async fn disabled_policy_gives_up_on_first_unclean_close() {
    let (transport, _, _) = MockTransport::new(vec![reset()]);
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let urls = connector.urls();

    let (_client, mut events) = SessionClient::start(
        connector,
        ObservedSurface::default(),
        config().with_reconnect_policy(ReconnectPolicy::disabled()),
    )
    .unwrap();

    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    assert_eq!(next(&mut events).await, connection_error());
    assert!(matches!(
        next(&mut events).await,
        SessionEvent::Disconnected {
            reason: DisconnectReason::RetriesExhausted { last_error: Some(_) }
        }
    ));
    assert_eq!(urls.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_connect_times_out_and_retries() {
    let (mut client, mut events) = SessionClient::start(
        HangingConnector,
        ObservedSurface::default(),
        config().with_connect_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    assert_eq!(next(&mut events).await, connection_error());
    assert_eq!(next(&mut events).await, scheduled(1, 1000));

    client.disconnect().await;
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Disconnected {
            reason: DisconnectReason::ClientDisconnect
        }
    );
}

#[tokio::test]
async fn disconnect_closes_channel_without_reconnect() {
    let (transport, _sent, closed) = MockTransport::idle();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let urls = connector.urls();

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();
    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    assert!(client.is_open());

    client.disconnect().await;

    assert_eq!(
        next(&mut events).await,
        SessionEvent::Disconnected {
            reason: DisconnectReason::ClientDisconnect
        }
    );
    assert!(events.recv().await.is_none());
    assert!(closed.load(Ordering::Acquire));
    assert!(!client.is_open());
    assert_eq!(urls.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_backoff() {
    let connector = ScriptedConnector::refusing();
    let urls = connector.urls();

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();
    assert_eq!(next(&mut events).await, connection_error());
    assert_eq!(next(&mut events).await, scheduled(1, 1000));

    client.disconnect().await;
    assert_eq!(
        next(&mut events).await,
        SessionEvent::Disconnected {
            reason: DisconnectReason::ClientDisconnect
        }
    );

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(urls.lock().unwrap().len(), 1);
}

// ════════════════════════════════════════════════════════════════════
// Commands
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn commands_are_encoded_while_open() {
    let (transport, sent, _closed) = MockTransport::idle();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();
    assert_eq!(next(&mut events).await, SessionEvent::Connected);

    client.start_game();
    client.eliminate_player(4);
    client.expel_player(9);
    client.start_new_round();
    client.submit_guess("gato");
    client.end_game();
    client.request_refresh();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let sent = sent.lock().unwrap().clone();
    assert_eq!(
        sent,
        vec![
            r#"{"type":"iniciar_partida"}"#,
            r#"{"type":"eliminar_jugador","jugador_id":4}"#,
            r#"{"type":"expulsar_jugador","user_id":9}"#,
            r#"{"type":"nueva_ronda"}"#,
            r#"{"type":"adivinar_palabra","palabra_adivinada":"gato"}"#,
            r#"{"type":"terminar_partida"}"#,
            r#"{"type":"refresh_request"}"#,
        ]
    );

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn commands_while_closed_are_dropped() {
    let (first, first_sent, _) = MockTransport::new(vec![reset()]);
    let (second, second_sent, _) = MockTransport::idle();
    let connector = ScriptedConnector::new(vec![Ok(first), Ok(second)]);

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();

    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    assert_eq!(next(&mut events).await, connection_error());
    assert_eq!(next(&mut events).await, scheduled(1, 1000));

    assert!(!client.is_open());
    client.end_game();
    client.eliminate_player(2);

    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(first_sent.lock().unwrap().is_empty());
    assert!(second_sent.lock().unwrap().is_empty());

    client.start_game();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(
        second_sent.lock().unwrap().as_slice(),
        [r#"{"type":"iniciar_partida"}"#.to_string()]
    );

    client.disconnect().await;
}

// ════════════════════════════════════════════════════════════════════
// Inbound messages
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn malformed_frames_are_skipped() {
    let (transport, _, _) = MockTransport::new(vec![
        frame("not json at all"),
        frame(r#"{"username":"ana"}"#),
        frame(r#"{"type":"chat","text":"hola"}"#),
        frame(user_connected_json("ana")),
    ]);
    let connector = ScriptedConnector::new(vec![Ok(transport)]);

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();
    assert_eq!(next(&mut events).await, SessionEvent::Connected);

    match next(&mut events).await {
        SessionEvent::Reaction(reaction) => {
            let notice = reaction.notice.unwrap();
            assert_eq!(notice.message, "ana joined the game");
            assert_eq!(notice.severity, Severity::Success);
            assert!(reaction.action.is_none());
        }
        other => panic!("expected reaction, got {other:?}"),
    }
    assert!(client.is_open());

    client.disconnect().await;
}

#[tokio::test]
async fn open_in_progress_emits_single_reload() {
    let (transport, _, _) = MockTransport::idle();
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let surface = ObservedSurface {
        active_player_count: 5,
        eliminated_player_count: 0,
        state: SessionState::InProgress,
        round_ended: false,
    };

    let (mut client, mut events) = SessionClient::start(connector, surface, config()).unwrap();
    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    match next(&mut events).await {
        SessionEvent::Reaction(reaction) => {
            assert_eq!(reaction.reload_delay(), Some(Duration::from_millis(2000)));
        }
        other => panic!("expected reload, got {other:?}"),
    }

    client.disconnect().await;
    assert!(matches!(
        next(&mut events).await,
        SessionEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn open_in_progress_reload_can_be_disabled() {
    let (transport, _, _) = MockTransport::new(vec![frame(user_connected_json("bea"))]);
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let surface = ObservedSurface {
        state: SessionState::InProgress,
        ..ObservedSurface::default()
    };

    let (mut client, mut events) = SessionClient::start(
        connector,
        surface,
        config().with_reload_on_open_in_progress(false),
    )
    .unwrap();
    assert_eq!(next(&mut events).await, SessionEvent::Connected);
    match next(&mut events).await {
        SessionEvent::Reaction(reaction) => assert!(reaction.reload_delay().is_none()),
        other => panic!("expected reaction, got {other:?}"),
    }

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn elimination_detected_from_bootstrapped_counters() {
    let players = vec![
        player_json(1, "ana", false),
        player_json(2, "bea", false),
        player_json(3, "carlos", false),
        player_json(4, "dani", false),
        player_json(5, "eva", true),
    ];
    let (transport, _, _) = MockTransport::new(vec![frame(snapshot_json(players))]);
    let connector = ScriptedConnector::new(vec![Ok(transport)]);
    let surface = ObservedSurface {
        active_player_count: 5,
        eliminated_player_count: 0,
        state: SessionState::InProgress,
        round_ended: false,
    };

    let (mut client, events) = SessionClient::start(
        connector,
        surface,
        config().with_reload_on_open_in_progress(false),
    )
    .unwrap();

    let presenter = Arc::new(RecordingPresenter::default());
    let dispatcher = ReactionDispatcher::new(Arc::clone(&presenter));
    let driver = tokio::spawn({
        let dispatcher = dispatcher.clone();
        async move { dispatcher.drive(events).await }
    });

    tokio::time::sleep(Duration::from_millis(999)).await;
    assert_eq!(
        presenter.calls(),
        vec!["notify:danger:A player has been eliminated"]
    );

    tokio::time::sleep(Duration::from_millis(2)).await;
    assert_eq!(
        presenter.calls(),
        vec!["notify:danger:A player has been eliminated", "reload"]
    );

    client.disconnect().await;
    driver.await.unwrap();
}

#[tokio::test]
async fn repeated_snapshot_applies_identically() {
    let players = vec![player_json(1, "ana", false), player_json(2, "bea", false)];
    let (transport, _, _) = MockTransport::new(vec![
        frame(snapshot_json(players.clone())),
        frame(snapshot_json(players)),
    ]);
    let connector = ScriptedConnector::new(vec![Ok(transport)]);

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();
    assert_eq!(next(&mut events).await, SessionEvent::Connected);

    let first = match next(&mut events).await {
        SessionEvent::Reaction(reaction) => reaction,
        other => panic!("expected reaction, got {other:?}"),
    };
    let second = match next(&mut events).await {
        SessionEvent::Reaction(reaction) => reaction,
        other => panic!("expected reaction, got {other:?}"),
    };

    assert!(matches!(first.action, Some(Action::ApplySnapshot(_))));
    assert!(first.notice.is_none());
    assert_eq!(first, second);
    assert_eq!(first.snapshot_update().unwrap().active_players.len(), 2);

    client.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn game_end_redirects_home_after_channel_closes() {
    let (transport, _, _) = MockTransport::new(vec![
        frame(game_ended_json("La partida ha terminado")),
        clean_close(),
    ]);
    let connector = ScriptedConnector::new(vec![Ok(transport)]);

    let (_client, events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();

    let presenter = Arc::new(RecordingPresenter::default());
    ReactionDispatcher::new(Arc::clone(&presenter))
        .drive(events)
        .await;
    assert_eq!(
        presenter.calls(),
        vec!["notify:warning:La partida ha terminado"]
    );

    tokio::time::sleep(Duration::from_millis(3001)).await;
    assert_eq!(
        presenter.calls(),
        vec!["notify:warning:La partida ha terminado", "navigate:/"]
    );
}

#[tokio::test(start_paused = true)]
async fn guess_result_reloads_after_two_seconds() {
    let (transport, _, _) = MockTransport::new(vec![frame(guess_result_json(
        false,
        "Incorrecto. La palabra no era esa.",
    ))]);
    let connector = ScriptedConnector::new(vec![Ok(transport)]);

    let (mut client, mut events) =
        SessionClient::start(connector, ObservedSurface::default(), config()).unwrap();
    assert_eq!(next(&mut events).await, SessionEvent::Connected);

    match next(&mut events).await {
        SessionEvent::Reaction(reaction) => {
            assert_eq!(reaction.notice.clone().unwrap().severity, Severity::Warning);
            assert_eq!(reaction.reload_delay(), Some(Duration::from_millis(2000)));
        }
        other => panic!("expected reaction, got {other:?}"),
    }

    client.disconnect().await;
}
