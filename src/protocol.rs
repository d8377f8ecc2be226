//! Wire-compatible protocol types for the Blanco session channel.
//!
//! Every frame is a JSON object carrying a string `type` tag. The session
//! server speaks Spanish on the wire (`partida_updated`, `jugadores`,
//! `eliminado`, ...); the Rust names are English and the serde attributes
//! map between the two.
//!
//! - Inbound frames decode into [`ServerMessage`]. Tags this client does not
//!   know decode into [`ServerMessage::Unknown`] instead of failing.
//! - Outbound frames are built from [`ClientMessage`] as a flat
//!   `{ "type": ..., <payload> }` object.

use serde::{Deserialize, Deserializer, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Session-scoped player identity (one per seat in a session).
pub type PlayerId = u64;

/// Account identity of the user behind a player.
pub type UserId = u64;

// ── Enums ───────────────────────────────────────────────────────────

/// Lifecycle state of a session as reported by the server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Lobby: players gather, the host may start the game.
    #[default]
    #[serde(rename = "esperando")]
    Waiting,
    /// Roles and words are assigned, rounds are being played.
    #[serde(rename = "en_juego")]
    InProgress,
    /// The host ended the game.
    #[serde(rename = "terminada")]
    Finished,
}

impl SessionState {
    /// Returns `true` while rounds are being played.
    pub fn is_in_progress(self) -> bool {
        matches!(self, Self::InProgress)
    }
}

// ── Structs ─────────────────────────────────────────────────────────

/// One player's externally visible attributes.
///
/// Role flags are only disclosed to privileged viewers; when the server
/// leaves them out they decode as `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerView {
    pub id: PlayerId,
    pub user_id: UserId,
    pub username: String,
    #[serde(rename = "es_host")]
    pub is_host: bool,
    #[serde(rename = "puntos")]
    pub points: u32,
    #[serde(rename = "ronda_actual")]
    pub current_round: u32,
    #[serde(rename = "eliminado")]
    pub eliminated: bool,
    #[serde(rename = "es_impostor")]
    pub is_impostor: bool,
    /// Holds the decoy word ("infiltrado").
    #[serde(rename = "es_infiltrado")]
    pub is_mole: bool,
    /// Holds the real word ("bueno").
    #[serde(rename = "es_bueno")]
    pub is_innocent: bool,
}

/// The authoritative view of one session at a point in time.
///
/// `players` keeps the server's order. Two consecutive snapshots of the same
/// round list players in the same order, which is what positional diffing in
/// [`Reconciler`](crate::reconcile::Reconciler) relies on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    #[serde(rename = "estado", default)]
    pub state: SessionState,
    #[serde(rename = "ronda_terminada", default)]
    pub round_ended: bool,
    #[serde(rename = "jugadores_activos", default)]
    pub active_player_count: u32,
    #[serde(rename = "jugadores_eliminados", default)]
    pub eliminated_player_count: u32,
    /// The viewer's own word. The server sends an empty string when there is
    /// none; that decodes as `None`.
    #[serde(
        rename = "palabra_secreta",
        default,
        deserialize_with = "empty_string_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub secret_word: Option<String>,
    #[serde(rename = "jugadores", default)]
    pub players: Vec<PlayerView>,
    #[serde(rename = "ronda_actual", default)]
    pub current_round: u32,
}

impl SessionSnapshot {
    /// Number of players flagged as eliminated in `players`.
    pub fn counted_eliminated(&self) -> usize {
        self.players.iter().filter(|p| p.eliminated).count()
    }
}

/// Result of an eliminated impostor's guess, as broadcast by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuessOutcome {
    /// Set when the guess was rejected outright (e.g. the guesser may not guess).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "correcto", default)]
    pub correct: bool,
    #[serde(rename = "mensaje", default)]
    pub message: String,
    #[serde(rename = "ronda_terminada", default)]
    pub round_ended: bool,
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|s| !s.is_empty()))
}

// ── Messages ────────────────────────────────────────────────────────

/// Actions sent from client to server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Eliminate a player from the current round (host only).
    #[serde(rename = "eliminar_jugador")]
    EliminatePlayer {
        #[serde(rename = "jugador_id")]
        player_id: PlayerId,
    },
    /// Expel a user from the session while it is waiting (host only).
    #[serde(rename = "expulsar_jugador")]
    ExpelPlayer { user_id: UserId },
    /// Deal new roles and words for another round (host only).
    #[serde(rename = "nueva_ronda")]
    StartNewRound,
    /// Start the game from the lobby (host only).
    #[serde(rename = "iniciar_partida")]
    StartGame,
    /// End the game for everyone (host only).
    #[serde(rename = "terminar_partida")]
    EndGame,
    /// An eliminated impostor's guess at the real word.
    #[serde(rename = "adivinar_palabra")]
    SubmitGuess {
        #[serde(rename = "palabra_adivinada")]
        guessed_word: String,
    },
    /// Ask the server to broadcast a fresh `partida_updated` snapshot.
    #[serde(rename = "refresh_request")]
    RefreshRequest,
}

impl ClientMessage {
    /// The wire tag of this message.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::EliminatePlayer { .. } => "eliminar_jugador",
            Self::ExpelPlayer { .. } => "expulsar_jugador",
            Self::StartNewRound => "nueva_ronda",
            Self::StartGame => "iniciar_partida",
            Self::EndGame => "terminar_partida",
            Self::SubmitGuess { .. } => "adivinar_palabra",
            Self::RefreshRequest => "refresh_request",
        }
    }
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Full session snapshot (boxed to reduce enum size).
    #[serde(rename = "partida_updated")]
    SessionUpdated { data: Box<SessionSnapshot> },
    /// A new user joined the session.
    #[serde(rename = "user_connected")]
    UserConnected {
        #[serde(default)]
        username: String,
    },
    /// A user left the session.
    #[serde(rename = "user_disconnected")]
    UserDisconnected {
        #[serde(default)]
        username: String,
    },
    /// A player was eliminated from the round.
    #[serde(rename = "jugador_eliminado")]
    PlayerEliminated {
        #[serde(
            rename = "jugador_id",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        player_id: Option<PlayerId>,
    },
    /// A user was expelled from the session.
    #[serde(rename = "jugador_expulsado")]
    PlayerExpelled {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<UserId>,
    },
    /// The host started the game.
    #[serde(rename = "partida_iniciada")]
    GameStarted {
        #[serde(default)]
        message: String,
    },
    /// The host started a new round.
    #[serde(rename = "nueva_ronda_iniciada")]
    RoundStarted {
        #[serde(default)]
        message: String,
    },
    /// The host ended the game.
    #[serde(rename = "partida_terminada")]
    GameEnded {
        #[serde(default)]
        message: String,
    },
    /// The current round is over.
    #[serde(rename = "ronda_terminada")]
    RoundEnded {
        #[serde(default)]
        message: String,
    },
    /// The server rejected an action.
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
    /// Outcome of an eliminated impostor's guess.
    #[serde(rename = "adivinacion_resultado")]
    GuessResult {
        #[serde(rename = "resultado")]
        result: GuessOutcome,
    },
    /// Any tag this client does not know about.
    #[serde(other)]
    Unknown,
}
