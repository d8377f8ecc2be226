//! Snapshot reconciliation.
//!
//! The server does not announce every transition a snapshot implies, so the
//! [`Reconciler`] compares each incoming `partida_updated` snapshot with the
//! cached one and classifies the difference. Material changes (someone was
//! eliminated, an eliminated impostor's score moved) are answered with a full
//! reload; everything else is patched in place and becomes the new cache.
//!
//! Checks run in this order and the first match wins:
//!
//! 1. the eliminated counter grew,
//! 2. a matched player's `eliminated` flag flipped,
//! 3. a matched player is an eliminated impostor in both snapshots and their
//!    points changed (they tried to guess the word),
//! 4. otherwise the snapshot is applied.
//!
//! On 1–3 the cache is left as it was; the reload refetches everything.

use std::collections::HashMap;

use tracing::debug;

use crate::presentation::SnapshotUpdate;
use crate::protocol::{PlayerView, SessionSnapshot};
use crate::reaction::{Reaction, Severity, RELOAD_AFTER_PLAYER_CHANGE};

/// Notification shown when an elimination is detected.
pub const PLAYER_ELIMINATED_NOTICE: &str = "A player has been eliminated";

/// Notification shown when an eliminated impostor's score changed.
pub const IMPOSTOR_GUESS_NOTICE: &str = "An eliminated impostor tried to guess the word";

/// How players of two snapshots are paired for per-player comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayerMatching {
    /// Pair by index, over the indices present in both lists. Relies on the
    /// server keeping roster order stable within a round.
    #[default]
    ByPosition,
    /// Pair by [`PlayerView::id`]; players present in only one list are skipped.
    ById,
}

/// What changed between the cached and the incoming snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `eliminated_player_count` increased.
    EliminatedCountGrew,
    /// Some player's `eliminated` flag changed.
    EliminationFlagFlipped,
    /// An eliminated impostor's points changed.
    ImpostorGuessAttempt,
    /// Nothing that needs a reload.
    Incremental,
}

/// Owns the cached snapshot and diffs incoming snapshots against it.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    cached: Option<SessionSnapshot>,
    matching: PlayerMatching,
}

impl Reconciler {
    pub fn new(matching: PlayerMatching) -> Self {
        Self {
            cached: None,
            matching,
        }
    }

    /// The current cache, if any.
    pub fn cached(&self) -> Option<&SessionSnapshot> {
        self.cached.as_ref()
    }

    /// Replace the cache with a locally derived seed.
    pub fn bootstrap(&mut self, seed: SessionSnapshot) {
        debug!(
            eliminated = seed.eliminated_player_count,
            active = seed.active_player_count,
            "bootstrapping snapshot cache"
        );
        self.cached = Some(seed);
    }

    /// Classify `incoming` against the cache without changing anything.
    pub fn classify(&self, incoming: &SessionSnapshot) -> Transition {
        let Some(cached) = &self.cached else {
            return Transition::Incremental;
        };

        if incoming.eliminated_player_count > cached.eliminated_player_count {
            return Transition::EliminatedCountGrew;
        }

        if cached.players.is_empty() {
            return Transition::Incremental;
        }

        let pairs = self.pairs(&cached.players, &incoming.players);

        if pairs.iter().any(|(old, new)| old.eliminated != new.eliminated) {
            return Transition::EliminationFlagFlipped;
        }

        if pairs.iter().any(|(old, new)| guessed(old, new)) {
            return Transition::ImpostorGuessAttempt;
        }

        Transition::Incremental
    }

    /// Classify `incoming`, update the cache when it is applied, and return
    /// the reaction for the presentation layer.
    pub fn reconcile(&mut self, incoming: SessionSnapshot) -> Reaction {
        let transition = self.classify(&incoming);
        debug!(?transition, "reconciled session snapshot");

        match transition {
            Transition::EliminatedCountGrew | Transition::EliminationFlagFlipped => {
                Reaction::notify(PLAYER_ELIMINATED_NOTICE, Severity::Danger)
                    .then_reload(RELOAD_AFTER_PLAYER_CHANGE)
            }
            Transition::ImpostorGuessAttempt => {
                Reaction::notify(IMPOSTOR_GUESS_NOTICE, Severity::Info)
                    .then_reload(RELOAD_AFTER_PLAYER_CHANGE)
            }
            Transition::Incremental => {
                let update = SnapshotUpdate::from_snapshot(&incoming);
                self.cached = Some(incoming);
                Reaction::apply(update)
            }
        }
    }

    fn pairs<'a>(
        &self,
        cached: &'a [PlayerView],
        incoming: &'a [PlayerView],
    ) -> Vec<(&'a PlayerView, &'a PlayerView)> {
        match self.matching {
            PlayerMatching::ByPosition => cached.iter().zip(incoming.iter()).collect(),
            PlayerMatching::ById => {
                let by_id: HashMap<_, _> = incoming.iter().map(|p| (p.id, p)).collect();
                cached
                    .iter()
                    .filter_map(|old| by_id.get(&old.id).map(|new| (old, *new)))
                    .collect()
            }
        }
    }
}

fn guessed(old: &PlayerView, new: &PlayerView) -> bool {
    old.is_impostor
        && old.eliminated
        && new.is_impostor
        && new.eliminated
        && old.points != new.points
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
    use crate::protocol::SessionState;
    use crate::reaction::Action;

    fn player(id: u64) -> PlayerView {
        PlayerView {
            id,
            user_id: id + 10,
            username: format!("player{id}"),
            ..PlayerView::default()
        }
    }

    fn snapshot(players: Vec<PlayerView>) -> SessionSnapshot {
        let eliminated = players.iter().filter(|p| p.eliminated).count() as u32;
        SessionSnapshot {
            state: SessionState::InProgress,
            active_player_count: players.len() as u32 - eliminated,
            eliminated_player_count: eliminated,
            players,
            ..SessionSnapshot::default()
        }
    }

    fn seeded(cached: SessionSnapshot) -> Reconciler {
        let mut reconciler = Reconciler::default();
        reconciler.bootstrap(cached);
        reconciler
    }

    #[test]
    fn empty_cache_applies_first_snapshot() {
        let mut reconciler = Reconciler::default();
        let incoming = snapshot(vec![player(1), player(2)]);
        let reaction = reconciler.reconcile(incoming.clone());
        assert!(reaction.snapshot_update().is_some());
        assert!(reaction.notice.is_none());
        assert_eq!(reconciler.cached(), Some(&incoming));
    }

    #[test]
    fn count_growth_wins_and_keeps_cache() {
        let cached = snapshot(vec![player(1)]);
        let mut reconciler = seeded(cached.clone());

        let mut gone = player(1);
        gone.eliminated = true;
        let reaction = reconciler.reconcile(snapshot(vec![gone]));

        let notice = reaction.notice.clone().unwrap();
        assert_eq!(notice.message, PLAYER_ELIMINATED_NOTICE);
        assert_eq!(notice.severity, Severity::Danger);
        assert_eq!(reaction.reload_delay(), Some(RELOAD_AFTER_PLAYER_CHANGE));
        assert_eq!(reconciler.cached(), Some(&cached));
    }

    #[test]
    fn flag_flip_without_counter_change_is_detected() {
        let mut reconciler = seeded(snapshot(vec![player(1), player(2)]));

        let mut incoming = snapshot(vec![player(1), player(2)]);
        incoming.players[1].eliminated = true;
        // The counter lags behind the roster.
        incoming.eliminated_player_count = 0;

        assert_eq!(
            reconciler.classify(&incoming),
            Transition::EliminationFlagFlipped
        );
        let reaction = reconciler.reconcile(incoming);
        assert_eq!(reaction.reload_delay(), Some(RELOAD_AFTER_PLAYER_CHANGE));
    }

    #[test]
    fn revived_player_also_counts_as_flip() {
        let mut dead = player(1);
        dead.eliminated = true;
        let reconciler = seeded(snapshot(vec![dead]));

        let incoming = snapshot(vec![player(1)]);
        assert_eq!(
            reconciler.classify(&incoming),
            Transition::EliminationFlagFlipped
        );
    }

    #[test]
    fn eliminated_impostor_score_change_is_a_guess() {
        let mut impostor = player(3);
        impostor.is_impostor = true;
        impostor.eliminated = true;
        let mut reconciler = seeded(snapshot(vec![player(1), impostor.clone()]));

        let mut scored = impostor;
        scored.points = 3;
        let reaction = reconciler.reconcile(snapshot(vec![player(1), scored]));

        let notice = reaction.notice.clone().unwrap();
        assert_eq!(notice.message, IMPOSTOR_GUESS_NOTICE);
        assert_eq!(notice.severity, Severity::Info);
        assert_eq!(reaction.reload_delay(), Some(RELOAD_AFTER_PLAYER_CHANGE));
    }

    #[test]
    fn active_player_score_change_is_incremental() {
        let mut reconciler = seeded(snapshot(vec![player(1), player(2)]));

        let mut incoming = snapshot(vec![player(1), player(2)]);
        incoming.players[0].points = 2;
        let reaction = reconciler.reconcile(incoming.clone());

        assert!(matches!(reaction.action, Some(Action::ApplySnapshot(_))));
        assert_eq!(reconciler.cached(), Some(&incoming));
    }

    #[test]
    fn bootstrap_seed_without_players_skips_roster_checks() {
        let seed = SessionSnapshot {
            eliminated_player_count: 1,
            ..SessionSnapshot::default()
        };
        let reconciler = seeded(seed);

        let mut dead = player(1);
        dead.eliminated = true;
        assert_eq!(
            reconciler.classify(&snapshot(vec![dead, player(2)])),
            Transition::Incremental
        );
    }

    #[test]
    fn shorter_incoming_roster_compares_common_prefix() {
        let reconciler = seeded(snapshot(vec![player(1), player(2), player(3)]));
        let incoming = snapshot(vec![player(1)]);
        assert_eq!(reconciler.classify(&incoming), Transition::Incremental);
    }

    #[test]
    fn positional_matching_misreads_reordered_roster() {
        let mut dead = player(2);
        dead.eliminated = true;
        let cached = SessionSnapshot {
            eliminated_player_count: 1,
            ..snapshot(vec![player(1), dead.clone()])
        };
        let incoming = SessionSnapshot {
            eliminated_player_count: 1,
            ..snapshot(vec![dead, player(1)])
        };

        let positional = seeded(cached.clone());
        assert_eq!(
            positional.classify(&incoming),
            Transition::EliminationFlagFlipped
        );

        let mut by_id = Reconciler::new(PlayerMatching::ById);
        by_id.bootstrap(cached);
        assert_eq!(by_id.classify(&incoming), Transition::Incremental);
    }
}
