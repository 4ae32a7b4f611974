//! Matchmaking collaborator seam.
//!
//! The matchmaking layer is consumed, not reimplemented. It is modelled as a
//! stream of [`JoinNotification`]s; each carries a [`LeaveSignal`] that fires
//! when that participant disconnects. The presence tracker subscribes to the
//! signal, so leaves are delivered through the registration made at join time.
//!
//! [`ConnectionMatchmaking`] adapts any [`MatchmakingConnection`] exchanging
//! [`MatchmakingClientMessage`]s and [`MatchmakingServerMessage`]s to this seam.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Result, SessionJoinError};
use crate::protocol::{MatchmakingClientMessage, MatchmakingServerMessage, ParticipantId, Profile};

// ── Leave signals ───────────────────────────────────────────────────

/// Matchmaking-side half of a leave registration. Fire it when the
/// participant disconnects.
#[derive(Debug)]
pub struct LeaveTrigger(oneshot::Sender<()>);

impl LeaveTrigger {
    /// Deliver the leave notification. Returns `false` if nobody is
    /// subscribed any more.
    pub fn fire(self) -> bool {
        self.0.send(()).is_ok()
    }
}

/// Subscriber-side half of a leave registration.
#[derive(Debug)]
pub struct LeaveSignal(oneshot::Receiver<()>);

impl LeaveSignal {
    /// Create a connected trigger/signal pair.
    pub fn pair() -> (LeaveTrigger, LeaveSignal) {
        let (tx, rx) = oneshot::channel();
        (LeaveTrigger(tx), LeaveSignal(rx))
    }

    /// Resolves to `true` when the trigger fires, or `false` if the trigger
    /// was dropped without firing. A dropped trigger is not a leave.
    pub async fn fired(self) -> bool {
        self.0.await.is_ok()
    }
}

// ── Join notifications ──────────────────────────────────────────────

/// A participant connected to the session.
///
/// `id` and `profile` are optional so that incomplete notifications can be
/// rejected by the presence tracker rather than by the collaborator.
#[derive(Debug)]
pub struct JoinNotification {
    /// Stable identifier assigned by matchmaking.
    pub id: Option<ParticipantId>,
    /// Profile the display name is resolved from.
    pub profile: Option<Profile>,
    /// `true` when the participant is this client.
    pub is_self: bool,
    /// Fires when the participant disconnects.
    pub on_leave: LeaveSignal,
}

impl JoinNotification {
    /// Build a well-formed notification for a remote participant, returning
    /// the trigger that announces its departure.
    pub fn new(id: impl Into<ParticipantId>, name: impl Into<String>) -> (Self, LeaveTrigger) {
        let (trigger, on_leave) = LeaveSignal::pair();
        let notification = Self {
            id: Some(id.into()),
            profile: Some(Profile { name: name.into() }),
            is_self: false,
            on_leave,
        };
        (notification, trigger)
    }

    /// Mark the participant as this client.
    #[must_use]
    pub fn local(mut self) -> Self {
        self.is_self = true;
        self
    }
}

// ── Trait ───────────────────────────────────────────────────────────

/// Source of presence notifications for one session.
///
/// # Cancel Safety
///
/// [`next_join`](Matchmaking::next_join) is used inside `tokio::select!` and
/// **MUST** be cancel-safe.
#[async_trait]
pub trait Matchmaking: Send + 'static {
    /// Start matchmaking. Called at most once per process by the orchestrator.
    ///
    /// # Errors
    ///
    /// Returns an error if the matchmaking service cannot be reached.
    async fn begin(&mut self) -> Result<()>;

    /// Wait for the next join notification. `None` means matchmaking ended.
    async fn next_join(&mut self) -> Option<JoinNotification>;

    /// Release the matchmaking connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails.
    async fn end(&mut self) -> Result<()> {
        Ok(())
    }
}

// ── Connection adapter ──────────────────────────────────────────────

/// A live connection to the matchmaking service.
///
/// Framing and encoding belong to the implementation; the adapter only sees
/// typed messages.
///
/// # Cancel Safety
///
/// [`recv`](MatchmakingConnection::recv) is polled inside `tokio::select!`
/// through [`Matchmaking::next_join`] and **MUST** be cancel-safe.
#[async_trait]
pub trait MatchmakingConnection: Send + 'static {
    /// Send one message to the service.
    ///
    /// # Errors
    ///
    /// Returns [`SessionJoinError::TransportClosed`] after
    /// [`close`](Self::close), or a send error from the underlying connection.
    async fn send(&mut self, message: MatchmakingClientMessage) -> Result<()>;

    /// Receive the next message.
    ///
    /// A frame that arrived but did not decode is reported as
    /// [`SessionJoinError::Serialization`] and the connection stays usable.
    /// Any other error, or `None`, ends the stream.
    async fn recv(&mut self) -> Option<Result<MatchmakingServerMessage>>;

    /// Close the connection. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails.
    async fn close(&mut self) -> Result<()>;
}

/// [`Matchmaking`] over a [`MatchmakingConnection`].
///
/// `ParticipantLeft` messages fire the trigger registered for that id when it
/// joined; leaves for unknown ids are ignored.
pub struct ConnectionMatchmaking<C: MatchmakingConnection> {
    connection: C,
    leave_triggers: HashMap<ParticipantId, LeaveTrigger>,
}

impl<C: MatchmakingConnection> ConnectionMatchmaking<C> {
    /// Wrap an open connection.
    pub fn new(connection: C) -> Self {
        Self {
            connection,
            leave_triggers: HashMap::new(),
        }
    }

    /// Number of participants whose leave is still pending.
    pub fn tracked(&self) -> usize {
        self.leave_triggers.len()
    }

    fn on_joined(
        &mut self,
        id: Option<ParticipantId>,
        profile: Option<Profile>,
        is_self: bool,
    ) -> JoinNotification {
        let (trigger, on_leave) = LeaveSignal::pair();
        match &id {
            Some(id) => {
                if self.leave_triggers.insert(id.clone(), trigger).is_some() {
                    debug!(participant = %id, "participant rejoined, replacing leave registration");
                }
            }
            // Nothing can address this participant's leave; the tracker will drop it.
            None => drop(trigger),
        }
        JoinNotification {
            id,
            profile,
            is_self,
            on_leave,
        }
    }

    fn on_left(&mut self, id: &str) {
        match self.leave_triggers.remove(id) {
            Some(trigger) => {
                if !trigger.fire() {
                    debug!(participant = %id, "leave fired with no subscriber");
                }
            }
            None => debug!(participant = %id, "leave for unknown participant ignored"),
        }
    }
}

impl<C: MatchmakingConnection> std::fmt::Debug for ConnectionMatchmaking<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionMatchmaking")
            .field("tracked", &self.leave_triggers.len())
            .finish()
    }
}

#[async_trait]
impl<C: MatchmakingConnection> Matchmaking for ConnectionMatchmaking<C> {
    async fn begin(&mut self) -> Result<()> {
        self.connection.send(MatchmakingClientMessage::Begin).await
    }

    async fn next_join(&mut self) -> Option<JoinNotification> {
        loop {
            let message = match self.connection.recv().await? {
                Ok(message) => message,
                Err(SessionJoinError::Serialization(e)) => {
                    warn!("skipping undecodable matchmaking message: {e}");
                    continue;
                }
                Err(e) => {
                    warn!("matchmaking connection failed: {e}");
                    return None;
                }
            };

            match message {
                MatchmakingServerMessage::ParticipantJoined {
                    id,
                    profile,
                    is_self,
                } => return Some(self.on_joined(id, profile, is_self)),
                MatchmakingServerMessage::ParticipantLeft { id } => self.on_left(&id),
                MatchmakingServerMessage::Started => debug!("matchmaking started"),
                MatchmakingServerMessage::Error { message } => {
                    warn!("matchmaking error: {message}");
                }
            }
        }
    }

    async fn end(&mut self) -> Result<()> {
        // Dropping the triggers ends subscriptions without reporting leaves.
        self.leave_triggers.clear();
        self.connection.close().await
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
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex as StdMutex};

    type Frame = Option<Result<MatchmakingServerMessage>>;

    /// Replays scripted frames and records what was sent.
    struct ScriptedConnection {
        incoming: VecDeque<Frame>,
        sent: Arc<StdMutex<Vec<MatchmakingClientMessage>>>,
    }

    impl ScriptedConnection {
        fn new(incoming: Vec<Frame>) -> (Self, Arc<StdMutex<Vec<MatchmakingClientMessage>>>) {
            let sent = Arc::new(StdMutex::new(Vec::new()));
            let connection = Self {
                incoming: VecDeque::from(incoming),
                sent: Arc::clone(&sent),
            };
            (connection, sent)
        }
    }

    #[async_trait]
    impl MatchmakingConnection for ScriptedConnection {
        async fn send(&mut self, message: MatchmakingClientMessage) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<MatchmakingServerMessage>> {
            // Running out of script behaves like a clean close.
            self.incoming.pop_front().flatten()
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn joined(id: &str, name: &str) -> Frame {
        Some(Ok(MatchmakingServerMessage::ParticipantJoined {
            id: Some(id.into()),
            profile: Some(Profile { name: name.into() }),
            is_self: false,
        }))
    }

    fn left(id: &str) -> Frame {
        Some(Ok(MatchmakingServerMessage::ParticipantLeft { id: id.into() }))
    }

    fn raw(text: &str) -> Frame {
        Some(serde_json::from_str(text).map_err(SessionJoinError::from))
    }

    #[tokio::test]
    async fn begin_sends_begin_message() {
        let (connection, sent) = ScriptedConnection::new(vec![]);
        let mut matchmaking = ConnectionMatchmaking::new(connection);
        matchmaking.begin().await.unwrap();

        assert_eq!(*sent.lock().unwrap(), vec![MatchmakingClientMessage::Begin]);
    }

    #[tokio::test]
    async fn participant_left_fires_registered_signal() {
        let (connection, _sent) = ScriptedConnection::new(vec![joined("42", "Ana"), left("42")]);
        let mut matchmaking = ConnectionMatchmaking::new(connection);

        let notification = matchmaking.next_join().await.unwrap();
        assert_eq!(notification.id.as_deref(), Some("42"));
        assert_eq!(notification.profile.as_ref().unwrap().name, "Ana");
        assert_eq!(matchmaking.tracked(), 1);

        // The leave is consumed while looking for the next join.
        assert!(matchmaking.next_join().await.is_none());
        assert!(notification.on_leave.fired().await);
        assert_eq!(matchmaking.tracked(), 0);
    }

    #[tokio::test]
    async fn undecodable_and_unknown_messages_are_skipped() {
        let (connection, _sent) = ScriptedConnection::new(vec![
            raw("not json"),
            left("nobody"),
            raw(r#"{"type":"Started"}"#),
            Some(Ok(MatchmakingServerMessage::Error {
                message: "busy".into(),
            })),
            joined("7", "Bo"),
        ]);
        let mut matchmaking = ConnectionMatchmaking::new(connection);

        let notification = matchmaking.next_join().await.unwrap();
        assert_eq!(notification.id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn join_without_id_has_dead_leave_signal() {
        let (connection, _sent) = ScriptedConnection::new(vec![raw(
            r#"{"type":"ParticipantJoined","data":{"profile":{"name":"Ghost"}}}"#,
        )]);
        let mut matchmaking = ConnectionMatchmaking::new(connection);

        let notification = matchmaking.next_join().await.unwrap();
        assert!(notification.id.is_none());
        assert_eq!(matchmaking.tracked(), 0);
        assert!(!notification.on_leave.fired().await);
    }

    #[tokio::test]
    async fn connection_error_ends_stream() {
        let (connection, _sent) = ScriptedConnection::new(vec![
            Some(Err(SessionJoinError::TransportReceive("boom".into()))),
            joined("1", "A"),
        ]);
        let mut matchmaking = ConnectionMatchmaking::new(connection);
        assert!(matchmaking.next_join().await.is_none());
    }

    #[tokio::test]
    async fn end_drops_registrations_without_leaving() {
        let (connection, _sent) = ScriptedConnection::new(vec![joined("1", "A")]);
        let mut matchmaking = ConnectionMatchmaking::new(connection);
        let notification = matchmaking.next_join().await.unwrap();

        matchmaking.end().await.unwrap();
        assert!(!notification.on_leave.fired().await);
    }

    #[tokio::test]
    async fn local_builder_marks_self() {
        let (notification, _trigger) = JoinNotification::new("1", "Me");
        assert!(!notification.is_self);
        assert!(notification.local().is_self);
    }
}
