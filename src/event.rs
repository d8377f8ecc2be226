//! Events emitted by the session loop.

use std::time::Duration;

use crate::reaction::{Reaction, Severity};

/// Why the session loop stopped for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server closed the channel gracefully; no retry is attempted.
    ClosedByServer,
    /// The channel kept closing uncleanly and the retry budget is spent.
    RetriesExhausted {
        /// The error behind the last unclean close.
        last_error: Option<String>,
    },
    /// [`SessionClient::disconnect`](crate::client::SessionClient::disconnect)
    /// was called.
    ClientDisconnect,
}

/// Everything the embedding application hears from a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A channel opened; the snapshot cache is already reseeded from the surface.
    Connected,

    /// Something to show or do in response to the server.
    Reaction(Reaction),

    /// Transient connection indicator (transport errors).
    ConnectionStatus { message: String, severity: Severity },

    /// The channel closed uncleanly; a new attempt starts after `delay`.
    ReconnectScheduled { attempt: u32, delay: Duration },

    /// Terminal: the loop exited and no further events follow.
    Disconnected { reason: DisconnectReason },
}

impl From<Reaction> for SessionEvent {
    fn from(reaction: Reaction) -> Self {
        Self::Reaction(reaction)
    }
}
