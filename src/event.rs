//! Events emitted by a running [`SessionClient`](crate::client::SessionClient).

use crate::error::{ConfigurationError, MalformedNotification};
use crate::orchestrator::ChannelOutcome;
use crate::presence::Participant;
use crate::session::SessionId;

/// Something observable happened in the session.
///
/// `Stopped` is always the last event on the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Matchmaking has begun.
    Started,
    /// A participant was recorded (or refreshed) in the presence set.
    ParticipantJoined {
        /// The participant as recorded.
        participant: Participant,
    },
    /// A participant was removed from the presence set.
    ParticipantLeft {
        /// The participant that was removed.
        participant: Participant,
    },
    /// A join notification was malformed and ignored.
    NotificationDropped {
        /// What was missing from the notification.
        reason: MalformedNotification,
    },
    /// No session id could be derived for a join; the channel was not requested.
    JoinAborted {
        /// Why the session id could not be derived.
        error: ConfigurationError,
    },
    /// The gate opened and the credential exchange started.
    ChannelRequested {
        /// Session the credential was requested for.
        session_id: SessionId,
    },
    /// The communication channel was opened.
    ChannelOpened {
        /// Session the channel was opened for.
        session_id: SessionId,
        /// Display name the channel was opened under.
        user_name: String,
    },
    /// The channel will not open for the rest of this process.
    ChannelFailed {
        /// Human-readable cause.
        reason: String,
    },
    /// The session loop exited.
    Stopped {
        /// `None` when matchmaking ended on its own.
        reason: Option<String>,
    },
}

impl From<ChannelOutcome> for SessionEvent {
    fn from(outcome: ChannelOutcome) -> Self {
        match outcome {
            ChannelOutcome::Opened {
                session_id,
                user_name,
            } => SessionEvent::ChannelOpened {
                session_id,
                user_name,
            },
            ChannelOutcome::Failed { reason } => SessionEvent::ChannelFailed { reason },
        }
    }
}
