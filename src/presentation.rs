//! Presentation boundary: what the session client asks of the UI and what it
//! reads back from it.
//!
//! The client never renders anything itself. It hands the embedding
//! application a [`SnapshotUpdate`] (fully derived UI instructions) and
//! expects a [`Presenter`] to apply them, plus a [`SurfaceProbe`] to read
//! the counters currently on screen when a channel opens.

use crate::protocol::{PlayerId, PlayerView, SessionSnapshot, SessionState, UserId};
use crate::reaction::Severity;

/// Active players needed before the host may start the game.
pub const MIN_PLAYERS_TO_START: u32 = 4;

/// Marker the server puts in an impostor's "secret word".
const IMPOSTOR_MARKER: &str = "¡Impostor!";

/// UI collaborator executing reactions.
///
/// Implementations must be cheap and non-blocking; they are called from the
/// task that drains session events and from reload/redirect timers.
pub trait Presenter: Send + Sync + 'static {
    /// Show a transient notification.
    fn notify(&self, message: &str, severity: Severity);

    /// Show a transient connection status indicator.
    fn show_connection_status(&self, message: &str, severity: Severity);

    /// Patch counters, banners, rosters and the secret word in place.
    fn apply_snapshot(&self, update: &SnapshotUpdate);

    /// Discard local state and re-render from the server.
    fn reload_current_page(&self);

    /// Leave the session page.
    fn navigate_to(&self, path: &str);
}

/// What the presentation surface currently shows, read when a channel opens.
///
/// The client may attach mid-session, so this seeds the reconciler cache
/// before the first server push arrives.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedSurface {
    pub active_player_count: u32,
    pub eliminated_player_count: u32,
    pub state: SessionState,
    pub round_ended: bool,
}

impl ObservedSurface {
    /// A cache seed with the observed counters and no player list.
    pub fn into_snapshot(self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            round_ended: self.round_ended,
            active_player_count: self.active_player_count,
            eliminated_player_count: self.eliminated_player_count,
            ..SessionSnapshot::default()
        }
    }
}

/// Reads the presentation surface for cache bootstrap.
pub trait SurfaceProbe: Send + Sync + 'static {
    fn observe(&self) -> ObservedSurface;
}

/// A fixed observation, for headless clients and tests.
impl SurfaceProbe for ObservedSurface {
    fn observe(&self) -> ObservedSurface {
        self.clone()
    }
}

/// Visibility of the host's start-game control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartControl {
    /// Enough players and still in the lobby.
    StartButton,
    /// Still in the lobby, not enough players yet.
    MinimumPlayersWarning,
    /// The game is running.
    Hidden,
}

/// One row of the score table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRow {
    pub username: String,
    pub is_host: bool,
    pub points: u32,
    pub current_round: u32,
}

/// Host action offered next to an active player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RosterAction {
    /// Remove the user from the session (lobby only).
    Expel(UserId),
    /// Eliminate the player from the open round.
    Eliminate(PlayerId),
}

/// An active player in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveEntry {
    pub player_id: PlayerId,
    pub user_id: UserId,
    pub username: String,
    pub is_host: bool,
    /// Shown to the host only; the presenter decides who is host.
    pub host_action: Option<RosterAction>,
}

/// Role revealed on an eliminated player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleBadge {
    Host,
    Impostor,
    Mole,
    Innocent,
}

/// An eliminated player with the badges to display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EliminatedEntry {
    pub username: String,
    pub badges: Vec<RoleBadge>,
}

/// The viewer's own word, as it should be displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretWordDisplay {
    /// A real or decoy word: shown as "your secret word: ...".
    Word(String),
    /// The impostor notice, shown verbatim.
    ImpostorNotice(String),
}

/// UI instructions derived from one accepted snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotUpdate {
    pub active_player_count: u32,
    pub eliminated_player_count: u32,
    pub state_label: &'static str,
    /// Score table and in-game buttons are visible.
    pub show_game_controls: bool,
    pub start_control: StartControl,
    pub score_rows: Vec<ScoreRow>,
    pub active_players: Vec<ActiveEntry>,
    pub eliminated_players: Vec<EliminatedEntry>,
    /// `None` leaves the current display untouched.
    pub secret_word: Option<SecretWordDisplay>,
}

impl SnapshotUpdate {
    pub fn from_snapshot(snapshot: &SessionSnapshot) -> Self {
        let in_progress = snapshot.state.is_in_progress();

        let start_control = if in_progress {
            StartControl::Hidden
        } else if snapshot.active_player_count >= MIN_PLAYERS_TO_START {
            StartControl::StartButton
        } else {
            StartControl::MinimumPlayersWarning
        };

        let score_rows = snapshot
            .players
            .iter()
            .map(|p| ScoreRow {
                username: p.username.clone(),
                is_host: p.is_host,
                points: p.points,
                current_round: p.current_round,
            })
            .collect();

        let active_players = snapshot
            .players
            .iter()
            .filter(|p| !p.eliminated)
            .map(|p| ActiveEntry {
                player_id: p.id,
                user_id: p.user_id,
                username: p.username.clone(),
                is_host: p.is_host,
                host_action: host_action(snapshot, p),
            })
            .collect();

        let eliminated_players = snapshot
            .players
            .iter()
            .filter(|p| p.eliminated)
            .map(|p| EliminatedEntry {
                username: p.username.clone(),
                badges: badges(p),
            })
            .collect();

        let secret_word = if in_progress {
            snapshot.secret_word.as_ref().map(|word| {
                if word.contains(IMPOSTOR_MARKER) {
                    SecretWordDisplay::ImpostorNotice(word.clone())
                } else {
                    SecretWordDisplay::Word(word.clone())
                }
            })
        } else {
            None
        };

        Self {
            active_player_count: snapshot.active_player_count,
            eliminated_player_count: snapshot.eliminated_player_count,
            state_label: state_label(snapshot.state),
            show_game_controls: in_progress,
            start_control,
            score_rows,
            active_players,
            eliminated_players,
            secret_word,
        }
    }
}

fn state_label(state: SessionState) -> &'static str {
    match state {
        SessionState::Waiting => "Waiting",
        SessionState::InProgress => "In progress",
        SessionState::Finished => "Finished",
    }
}

fn host_action(snapshot: &SessionSnapshot, player: &PlayerView) -> Option<RosterAction> {
    match snapshot.state {
        SessionState::InProgress if !snapshot.round_ended => {
            Some(RosterAction::Eliminate(player.id))
        }
        SessionState::InProgress => None,
        SessionState::Waiting | SessionState::Finished => Some(RosterAction::Expel(player.user_id)),
    }
}

fn badges(player: &PlayerView) -> Vec<RoleBadge> {
    [
        (player.is_host, RoleBadge::Host),
        (player.is_impostor, RoleBadge::Impostor),
        (player.is_mole, RoleBadge::Mole),
        (player.is_innocent, RoleBadge::Innocent),
    ]
    .into_iter()
    .filter_map(|(flag, badge)| flag.then_some(badge))
    .collect()
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

    fn player(id: u64, name: &str) -> PlayerView {
        PlayerView {
            id,
            user_id: id + 100,
            username: name.into(),
            ..PlayerView::default()
        }
    }

    fn lobby(active: u32) -> SessionSnapshot {
        SessionSnapshot {
            active_player_count: active,
            players: (0..u64::from(active))
                .map(|i| player(i, &format!("p{i}")))
                .collect(),
            ..SessionSnapshot::default()
        }
    }

    #[test]
    fn start_button_needs_four_players() {
        assert_eq!(
            SnapshotUpdate::from_snapshot(&lobby(3)).start_control,
            StartControl::MinimumPlayersWarning
        );
        assert_eq!(
            SnapshotUpdate::from_snapshot(&lobby(4)).start_control,
            StartControl::StartButton
        );
    }

    #[test]
    fn lobby_offers_expel_by_user_id() {
        let update = SnapshotUpdate::from_snapshot(&lobby(2));
        assert_eq!(
            update.active_players[1].host_action,
            Some(RosterAction::Expel(101))
        );
        assert!(!update.show_game_controls);
        assert_eq!(update.state_label, "Waiting");
    }

    #[test]
    fn running_round_offers_eliminate_and_hides_start() {
        let mut snapshot = lobby(5);
        snapshot.state = SessionState::InProgress;
        let update = SnapshotUpdate::from_snapshot(&snapshot);
        assert_eq!(update.start_control, StartControl::Hidden);
        assert!(update.show_game_controls);
        assert_eq!(
            update.active_players[0].host_action,
            Some(RosterAction::Eliminate(0))
        );

        snapshot.round_ended = true;
        let update = SnapshotUpdate::from_snapshot(&snapshot);
        assert!(update.active_players[0].host_action.is_none());
    }

    #[test]
    fn eliminated_players_carry_role_badges() {
        let mut snapshot = lobby(3);
        snapshot.state = SessionState::InProgress;
        snapshot.players[2].eliminated = true;
        snapshot.players[2].is_impostor = true;
        snapshot.players[2].is_host = true;

        let update = SnapshotUpdate::from_snapshot(&snapshot);
        assert_eq!(update.active_players.len(), 2);
        assert_eq!(update.eliminated_players.len(), 1);
        assert_eq!(
            update.eliminated_players[0].badges,
            vec![RoleBadge::Host, RoleBadge::Impostor]
        );
        assert_eq!(update.score_rows.len(), 3);
    }

    #[test]
    fn secret_word_only_while_in_progress() {
        let mut snapshot = lobby(4);
        snapshot.secret_word = Some("GATO".into());
        assert!(SnapshotUpdate::from_snapshot(&snapshot).secret_word.is_none());

        snapshot.state = SessionState::InProgress;
        assert_eq!(
            SnapshotUpdate::from_snapshot(&snapshot).secret_word,
            Some(SecretWordDisplay::Word("GATO".into()))
        );

        snapshot.secret_word = Some("¡Impostor! No tienes palabra en esta ronda.".into());
        assert!(matches!(
            SnapshotUpdate::from_snapshot(&snapshot).secret_word,
            Some(SecretWordDisplay::ImpostorNotice(_))
        ));
    }

    #[test]
    fn observed_surface_seeds_counters_only() {
        let seed = ObservedSurface {
            active_player_count: 5,
            eliminated_player_count: 1,
            state: SessionState::InProgress,
            round_ended: true,
        }
        .into_snapshot();
        assert_eq!(seed.active_player_count, 5);
        assert_eq!(seed.eliminated_player_count, 1);
        assert!(seed.round_ended);
        assert!(seed.players.is_empty());
        assert!(seed.secret_word.is_none());
    }
}
