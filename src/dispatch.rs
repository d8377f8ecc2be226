//! Inbound message dispatch.
//!
//! [`decode`] turns a raw text frame into a [`ServerMessage`]; frames that are
//! not JSON objects with a string `type` tag are logged and dropped.
//! [`route`] maps a decoded message to its [`Reaction`], handing full
//! snapshots to the [`Reconciler`].

use tracing::{debug, warn};

use crate::protocol::{GuessOutcome, ServerMessage};
use crate::reaction::{
    Reaction, Severity, HOME_PATH, REDIRECT_AFTER_GAME_END, RELOAD_AFTER_PLAYER_CHANGE,
    RELOAD_AFTER_ROUND_CHANGE,
};
use crate::reconcile::{Reconciler, PLAYER_ELIMINATED_NOTICE};

/// Notification shown when a user is expelled.
pub const PLAYER_EXPELLED_NOTICE: &str = "A player has been expelled from the game";

/// Decode one text frame.
///
/// Returns `None` (after logging) when the frame is not valid JSON or lacks a
/// string `type` field. Unknown tags decode to [`ServerMessage::Unknown`].
pub fn decode(text: &str) -> Option<ServerMessage> {
    match serde_json::from_str::<ServerMessage>(text) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(error = %e, raw = %text, "failed to parse session message, dropping");
            None
        }
    }
}

/// Map a decoded message to the reaction it calls for.
///
/// `None` means the message has no visible effect (unknown tag).
pub fn route(message: ServerMessage, reconciler: &mut Reconciler) -> Option<Reaction> {
    let reaction = match message {
        ServerMessage::SessionUpdated { data } => reconciler.reconcile(*data),
        ServerMessage::UserConnected { username } => {
            Reaction::notify(format!("{username} joined the game"), Severity::Success)
        }
        ServerMessage::UserDisconnected { username } => {
            Reaction::notify(format!("{username} disconnected"), Severity::Warning)
        }
        ServerMessage::PlayerEliminated { .. } => {
            Reaction::notify(PLAYER_ELIMINATED_NOTICE, Severity::Danger)
                .then_reload(RELOAD_AFTER_PLAYER_CHANGE)
        }
        ServerMessage::PlayerExpelled { .. } => {
            Reaction::notify(PLAYER_EXPELLED_NOTICE, Severity::Warning)
                .then_reload(RELOAD_AFTER_PLAYER_CHANGE)
        }
        ServerMessage::GameStarted { message } | ServerMessage::RoundStarted { message } => {
            Reaction::notify(message, Severity::Success).then_reload(RELOAD_AFTER_PLAYER_CHANGE)
        }
        ServerMessage::GameEnded { message } => Reaction::notify(message, Severity::Warning)
            .then_redirect(HOME_PATH, REDIRECT_AFTER_GAME_END),
        ServerMessage::RoundEnded { message } => {
            Reaction::notify(message, Severity::Warning).then_reload(RELOAD_AFTER_ROUND_CHANGE)
        }
        ServerMessage::Error { message } => Reaction::notify(message, Severity::Danger),
        ServerMessage::GuessResult { result } => guess_reaction(result),
        ServerMessage::Unknown => {
            debug!("ignoring session message with unknown type");
            return None;
        }
    };
    Some(reaction)
}

fn guess_reaction(result: GuessOutcome) -> Reaction {
    // An empty error string counts as no error.
    if let Some(error) = result.error.filter(|e| !e.is_empty()) {
        return Reaction::notify(error, Severity::Danger);
    }
    let severity = if result.correct {
        Severity::Success
    } else {
        Severity::Warning
    };
    Reaction::notify(result.message, severity).then_reload(RELOAD_AFTER_ROUND_CHANGE)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::reaction::Action;
    use std::time::Duration;

    fn route_json(json: &str) -> Option<Reaction> {
        let mut reconciler = Reconciler::default();
        route(decode(json)?, &mut reconciler)
    }

    #[test]
    fn frame_without_type_is_dropped() {
        assert!(decode(r#"{"username":"ana"}"#).is_none());
        assert!(decode("not json").is_none());
        assert!(decode(r#""partida_updated""#).is_none());
    }

    #[test]
    fn unknown_type_is_ignored() {
        assert_eq!(decode(r#"{"type":"chat","text":"hola"}"#), Some(ServerMessage::Unknown));
        assert!(route_json(r#"{"type":"chat","text":"hola"}"#).is_none());
    }

    #[test]
    fn user_presence_notifies_only() {
        let joined = route_json(r#"{"type":"user_connected","username":"ana"}"#).unwrap();
        assert_eq!(joined.notice.unwrap().severity, Severity::Success);
        assert!(joined.action.is_none());

        let left = route_json(r#"{"type":"user_disconnected","username":"ana"}"#).unwrap();
        let notice = left.notice.unwrap();
        assert_eq!(notice.severity, Severity::Warning);
        assert!(notice.message.contains("ana"));
    }

    #[test]
    fn elimination_and_expulsion_reload_after_one_second() {
        for json in [
            r#"{"type":"jugador_eliminado","jugador_id":4}"#,
            r#"{"type":"jugador_expulsado","user_id":9}"#,
        ] {
            let reaction = route_json(json).unwrap();
            assert!(reaction.notice.is_some());
            assert_eq!(reaction.reload_delay(), Some(Duration::from_millis(1000)));
        }
    }

    #[test]
    fn game_and_round_start_reload_once() {
        for json in [
            r#"{"type":"partida_iniciada","message":"¡La partida ha comenzado!"}"#,
            r#"{"type":"nueva_ronda_iniciada","message":"Nueva ronda"}"#,
        ] {
            let reaction = route_json(json).unwrap();
            assert_eq!(reaction.notice.unwrap().severity, Severity::Success);
            assert_eq!(
                reaction.action,
                Some(Action::ForceReload {
                    delay: Duration::from_millis(1000)
                })
            );
        }
    }

    #[test]
    fn game_end_redirects_home() {
        let reaction = route_json(r#"{"type":"partida_terminada","message":"Fin"}"#).unwrap();
        assert_eq!(
            reaction.action,
            Some(Action::Redirect {
                path: "/".into(),
                delay: Duration::from_millis(3000)
            })
        );
    }

    #[test]
    fn round_end_reloads_after_two_seconds() {
        let reaction = route_json(r#"{"type":"ronda_terminada","message":"Fin"}"#).unwrap();
        assert_eq!(reaction.notice.as_ref().unwrap().severity, Severity::Warning);
        assert_eq!(reaction.reload_delay(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn server_error_is_danger_without_action() {
        let reaction = route_json(r#"{"type":"error","message":"No"}"#).unwrap();
        assert_eq!(reaction.notice.unwrap().severity, Severity::Danger);
        assert!(reaction.action.is_none());
    }

    #[test]
    fn rejected_guess_notifies_only() {
        let reaction = route_json(
            r#"{"type":"adivinacion_resultado","resultado":{"error":"ya fue eliminado"}}"#,
        )
        .unwrap();
        let notice = reaction.notice.unwrap();
        assert_eq!(notice.message, "ya fue eliminado");
        assert_eq!(notice.severity, Severity::Danger);
        assert!(reaction.action.is_none());
    }

    #[test]
    fn correct_guess_succeeds_and_reloads() {
        let reaction = route_json(
            r#"{"type":"adivinacion_resultado","resultado":{"correcto":true,"mensaje":"¡Correcto!"}}"#,
        )
        .unwrap();
        assert_eq!(reaction.notice.clone().unwrap().severity, Severity::Success);
        assert_eq!(reaction.notice.clone().unwrap().message, "¡Correcto!");
        assert_eq!(reaction.reload_delay(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn wrong_guess_warns_and_reloads() {
        let reaction = route_json(
            r#"{"type":"adivinacion_resultado","resultado":{"correcto":false,"mensaje":"Incorrecto"}}"#,
        )
        .unwrap();
        assert_eq!(reaction.notice.as_ref().unwrap().severity, Severity::Warning);
        assert_eq!(reaction.reload_delay(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn empty_guess_error_is_treated_as_absent() {
        let reaction = route_json(
            r#"{"type":"adivinacion_resultado","resultado":{"error":"","correcto":true,"mensaje":"ok"}}"#,
        )
        .unwrap();
        let notice = reaction.notice.as_ref().unwrap();
        assert_eq!(notice.message, "ok");
        assert_eq!(notice.severity, Severity::Success);
        assert_eq!(reaction.reload_delay(), Some(Duration::from_millis(2000)));
    }

    #[test]
    fn guess_result_without_payload_is_dropped() {
        assert!(decode(r#"{"type":"adivinacion_resultado"}"#).is_none());
    }

    #[test]
    fn snapshot_goes_through_reconciler() {
        let mut reconciler = Reconciler::default();
        let message = decode(
            r#"{"type":"partida_updated","data":{"estado":"esperando","jugadores_activos":1,
                "jugadores_eliminados":0,"jugadores":[{"id":1,"user_id":7,"username":"ana"}]}}"#,
        )
        .unwrap();
        let reaction = route(message, &mut reconciler).unwrap();
        assert!(reaction.snapshot_update().is_some());
        assert_eq!(reconciler.cached().unwrap().players[0].username, "ana");
    }
}
