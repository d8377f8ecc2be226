//! Reaction instructions produced for every inbound message.
//!
//! A [`Reaction`] bundles at most one user-facing [`Notice`] with at most one
//! [`Action`]. Because the action slot holds a single value, a message can
//! never trigger more than one reload or redirect.
//!
//! The session loop only computes reactions; [`ReactionDispatcher`] executes
//! them against a [`Presenter`](crate::presentation::Presenter), scheduling
//! the delayed reloads and redirects on the tokio timer.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::event::SessionEvent;
use crate::presentation::{Presenter, SnapshotUpdate};

/// Delay before reloading after an elimination, expulsion or game/round start.
pub const RELOAD_AFTER_PLAYER_CHANGE: Duration = Duration::from_millis(1000);

/// Delay before reloading after a round ended or a guess was resolved.
pub const RELOAD_AFTER_ROUND_CHANGE: Duration = Duration::from_millis(2000);

/// Delay before reloading when the channel opens on a game already in progress.
pub const RELOAD_AFTER_OPEN_IN_PROGRESS: Duration = Duration::from_millis(2000);

/// Delay before leaving the page once the game is over.
pub const REDIRECT_AFTER_GAME_END: Duration = Duration::from_millis(3000);

/// Where players are sent when the game ends.
pub const HOME_PATH: &str = "/";

/// Visual weight of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    Success,
    Warning,
    Danger,
    Info,
}

impl Severity {
    /// Lowercase name, as used by CSS-style presenters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
            Self::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient notification for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub message: String,
    pub severity: Severity,
}

impl Notice {
    pub fn new(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
        }
    }
}

/// The state-changing consequence of a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Discard local state and reload the current page after `delay`.
    ForceReload { delay: Duration },
    /// Navigate to `path` after `delay`.
    Redirect { path: String, delay: Duration },
    /// Patch the presentation in place from a new snapshot.
    ApplySnapshot(Box<SnapshotUpdate>),
}

/// Everything one inbound message asks the presentation layer to do.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Reaction {
    pub notice: Option<Notice>,
    pub action: Option<Action>,
}

impl Reaction {
    /// Notification only.
    pub fn notify(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            notice: Some(Notice::new(message, severity)),
            action: None,
        }
    }

    /// Reload without a notification.
    pub fn reload(delay: Duration) -> Self {
        Self {
            notice: None,
            action: Some(Action::ForceReload { delay }),
        }
    }

    /// In-place snapshot application.
    pub fn apply(update: SnapshotUpdate) -> Self {
        Self {
            notice: None,
            action: Some(Action::ApplySnapshot(Box::new(update))),
        }
    }

    /// Add a forced reload after `delay`.
    #[must_use]
    pub fn then_reload(mut self, delay: Duration) -> Self {
        self.action = Some(Action::ForceReload { delay });
        self
    }

    /// Add a redirect to `path` after `delay`.
    #[must_use]
    pub fn then_redirect(mut self, path: impl Into<String>, delay: Duration) -> Self {
        self.action = Some(Action::Redirect {
            path: path.into(),
            delay,
        });
        self
    }

    /// The reload delay, if this reaction forces a reload.
    pub fn reload_delay(&self) -> Option<Duration> {
        match &self.action {
            Some(Action::ForceReload { delay }) => Some(*delay),
            _ => None,
        }
    }

    /// The snapshot update, if this reaction applies one.
    pub fn snapshot_update(&self) -> Option<&SnapshotUpdate> {
        match &self.action {
            Some(Action::ApplySnapshot(update)) => Some(update),
            _ => None,
        }
    }
}

/// Executes reactions against a presenter.
///
/// Notices and snapshot updates are applied synchronously. Reloads and
/// redirects are spawned as timer tasks on the current tokio runtime; they
/// are not tied to the session's lifetime, so a disconnect does not cancel
/// them.
pub struct ReactionDispatcher<P: Presenter> {
    presenter: Arc<P>,
}

impl<P: Presenter> Clone for ReactionDispatcher<P> {
    fn clone(&self) -> Self {
        Self {
            presenter: Arc::clone(&self.presenter),
        }
    }
}

impl<P: Presenter> ReactionDispatcher<P> {
    pub fn new(presenter: Arc<P>) -> Self {
        Self { presenter }
    }

    /// Execute one reaction. Must be called within a tokio runtime when the
    /// reaction carries a reload or redirect.
    pub fn dispatch(&self, reaction: Reaction) {
        if let Some(notice) = reaction.notice {
            self.presenter.notify(&notice.message, notice.severity);
        }

        match reaction.action {
            None => {}
            Some(Action::ApplySnapshot(update)) => self.presenter.apply_snapshot(&update),
            Some(Action::ForceReload { delay }) => {
                debug!(delay_ms = delay.as_millis() as u64, "scheduling page reload");
                let presenter = Arc::clone(&self.presenter);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    presenter.reload_current_page();
                });
            }
            Some(Action::Redirect { path, delay }) => {
                debug!(%path, delay_ms = delay.as_millis() as u64, "scheduling redirect");
                let presenter = Arc::clone(&self.presenter);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    presenter.navigate_to(&path);
                });
            }
        }
    }

    /// Execute whatever a session event asks of the presenter.
    ///
    /// Returns `false` once the terminal `Disconnected` event was handled.
    pub fn handle_event(&self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Reaction(reaction) => self.dispatch(reaction),
            SessionEvent::ConnectionStatus { message, severity } => {
                self.presenter.show_connection_status(&message, severity);
            }
            SessionEvent::Connected => debug!("session channel connected"),
            SessionEvent::ReconnectScheduled { attempt, delay } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            }
            SessionEvent::Disconnected { reason } => {
                info!(?reason, "session ended");
                return false;
            }
        }
        true
    }

    /// Drain `events` into the presenter until the session ends.
    pub async fn drive(&self, mut events: mpsc::Receiver<SessionEvent>) {
        while let Some(event) = events.recv().await {
            if !self.handle_event(event) {
                break;
            }
        }
    }
}

impl<P: Presenter> fmt::Debug for ReactionDispatcher<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactionDispatcher").finish_non_exhaustive()
    }
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
    use crate::event::DisconnectReason;
    use crate::presentation::ObservedSurface;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingPresenter {
        calls: StdMutex<Vec<String>>,
    }

    impl RecordingPresenter {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Presenter for RecordingPresenter {
        fn notify(&self, message: &str, severity: Severity) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("notify:{severity}:{message}"));
        }

        fn show_connection_status(&self, message: &str, severity: Severity) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("status:{severity}:{message}"));
        }

        fn apply_snapshot(&self, update: &SnapshotUpdate) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("apply:{}", update.state_label));
        }

        fn reload_current_page(&self) {
            self.calls.lock().unwrap().push("reload".into());
        }

        fn navigate_to(&self, path: &str) {
            self.calls.lock().unwrap().push(format!("navigate:{path}"));
        }
    }

    #[test]
    fn builders_keep_single_action() {
        let reaction = Reaction::notify("bye", Severity::Warning)
            .then_reload(Duration::from_secs(1))
            .then_redirect(HOME_PATH, Duration::from_secs(3));
        assert!(reaction.reload_delay().is_none());
        assert!(matches!(reaction.action, Some(Action::Redirect { .. })));
    }

    #[test]
    fn severity_names() {
        assert_eq!(Severity::Danger.to_string(), "danger");
        assert_eq!(Severity::Info.as_str(), "info");
    }

    #[tokio::test(start_paused = true)]
    async fn reload_fires_after_delay() {
        let presenter = Arc::new(RecordingPresenter::default());
        let dispatcher = ReactionDispatcher::new(Arc::clone(&presenter));

        dispatcher.dispatch(
            Reaction::notify("gone", Severity::Danger).then_reload(Duration::from_millis(1000)),
        );
        assert_eq!(presenter.calls(), vec!["notify:danger:gone"]);

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert_eq!(presenter.calls().len(), 1);

        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(presenter.calls(), vec!["notify:danger:gone", "reload"]);
    }

    #[tokio::test(start_paused = true)]
    async fn redirect_fires_after_delay() {
        let presenter = Arc::new(RecordingPresenter::default());
        let dispatcher = ReactionDispatcher::new(Arc::clone(&presenter));

        dispatcher.dispatch(Reaction::default().then_redirect("/", REDIRECT_AFTER_GAME_END));
        tokio::time::sleep(Duration::from_millis(3001)).await;
        assert_eq!(presenter.calls(), vec!["navigate:/"]);
    }

    #[tokio::test]
    async fn apply_is_immediate() {
        let presenter = Arc::new(RecordingPresenter::default());
        let dispatcher = ReactionDispatcher::new(Arc::clone(&presenter));

        let update = SnapshotUpdate::from_snapshot(&ObservedSurface::default().into_snapshot());
        dispatcher.dispatch(Reaction::apply(update));
        assert_eq!(presenter.calls(), vec!["apply:Waiting"]);
    }

    #[tokio::test]
    async fn connection_status_reaches_presenter() {
        let presenter = Arc::new(RecordingPresenter::default());
        let dispatcher = ReactionDispatcher::new(Arc::clone(&presenter));

        assert!(dispatcher.handle_event(SessionEvent::Connected));
        assert!(dispatcher.handle_event(SessionEvent::ConnectionStatus {
            message: "Connection error".into(),
            severity: Severity::Danger,
        }));
        assert_eq!(presenter.calls(), vec!["status:danger:Connection error"]);
    }

    #[tokio::test]
    async fn drive_stops_at_disconnect() {
        let presenter = Arc::new(RecordingPresenter::default());
        let dispatcher = ReactionDispatcher::new(Arc::clone(&presenter));
        let (tx, rx) = mpsc::channel(8);

        tx.send(Reaction::notify("hola", Severity::Success).into())
            .await
            .unwrap();
        tx.send(SessionEvent::Disconnected {
            reason: DisconnectReason::ClosedByServer,
        })
        .await
        .unwrap();
        tx.send(Reaction::notify("late", Severity::Info).into())
            .await
            .unwrap();

        dispatcher.drive(rx).await;
        assert_eq!(presenter.calls(), vec!["notify:success:hola"]);
    }
}
