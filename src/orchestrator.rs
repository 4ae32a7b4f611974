//! Session orchestrator: the end-to-end join workflow.
//!
//! For every join notification the orchestrator records the participant,
//! identifies the local client, derives the session id from the configured
//! location and, if it is the first caller through the [`ChannelGate`], starts
//! the credential exchange. When the exchange completes, the communication
//! channel is opened with the display name of the earliest participant still
//! present. Leaves only update presence; the channel lifecycle is independent.
//!
//! ```text
//! Idle ──begin──▶ Starting ──gate──▶ ChannelPending ──ok──▶ ChannelOpened
//!                                                   └─err─▶ ChannelFailed
//! ```
//!
//! The gate is set synchronously before the fetch is spawned, so a join that
//! arrives while the fetch is in flight never re-enters the fetch path. A
//! failed fetch leaves the gate spent: the channel stays closed for the rest
//! of the process and no retry is attempted.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::channel::CommunicationChannel;
use crate::config::SessionConfig;
use crate::credential::{Credential, CredentialAuthority};
use crate::error::{ConfigurationError, FetchError, MalformedNotification, Result, SessionJoinError};
use crate::gate::ChannelGate;
use crate::matchmaking::{JoinNotification, Matchmaking};
use crate::presence::{JoinRecord, LeaveNotice, Participant, PresenceTracker};
use crate::protocol::{ChannelOpenRequest, ParticipantId};
use crate::session::SessionId;

type FetchTask = JoinHandle<std::result::Result<Credential, FetchError>>;

/// Lifecycle of the session workflow. `ChannelOpened` and `ChannelFailed`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// Matchmaking has not begun.
    #[default]
    Idle,
    /// Matchmaking has begun; waiting for the first join through the gate.
    Starting,
    /// The gate is spent and the credential exchange is in flight.
    ChannelPending,
    /// The channel was opened.
    ChannelOpened,
    /// The exchange or the open failed; the channel will not be opened.
    ChannelFailed,
}

impl SessionState {
    /// Returns `true` for states no transition leaves.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::ChannelOpened | SessionState::ChannelFailed)
    }
}

/// Result of handling one join notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The notification was malformed; presence is unchanged.
    Dropped(MalformedNotification),
    /// The participant was recorded but no session id could be derived, so
    /// the gate was not attempted.
    Aborted {
        /// The participant that was recorded.
        participant: Participant,
        /// Why no session id could be derived.
        error: ConfigurationError,
    },
    /// The participant was recorded; the gate was already spent.
    Recorded {
        /// The participant that was recorded.
        participant: Participant,
    },
    /// The participant was recorded and this join started the credential
    /// exchange.
    ChannelRequested {
        /// The participant whose join opened the gate.
        participant: Participant,
        /// Session the credential was requested for.
        session_id: SessionId,
    },
}

impl JoinOutcome {
    /// The participant recorded by this join, if any.
    pub fn participant(&self) -> Option<&Participant> {
        match self {
            JoinOutcome::Dropped(_) => None,
            JoinOutcome::Aborted { participant, .. }
            | JoinOutcome::Recorded { participant }
            | JoinOutcome::ChannelRequested { participant, .. } => Some(participant),
        }
    }
}

/// Result of the channel-open workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    /// The channel collaborator accepted the open request.
    Opened {
        /// Session the channel was opened for.
        session_id: SessionId,
        /// Display name the channel was opened under.
        user_name: String,
    },
    /// The exchange or the open failed.
    Failed {
        /// Human-readable cause.
        reason: String,
    },
}

/// Coordinates presence, the channel gate, the credential exchange and the
/// communication channel for one client process.
pub struct SessionOrchestrator<C: CommunicationChannel> {
    config: SessionConfig,
    authority: Arc<dyn CredentialAuthority>,
    channel: C,
    presence: PresenceTracker,
    gate: ChannelGate,
    state: SessionState,
    local_id: Option<ParticipantId>,
    pending: Option<FetchTask>,
    /// Display name of the participant whose join opened the gate.
    requested_by: Option<String>,
}

impl<C: CommunicationChannel> SessionOrchestrator<C> {
    /// Create an idle orchestrator.
    ///
    /// Returns the orchestrator and the receiver on which fired leave signals
    /// arrive; pass each received notice to
    /// [`handle_leave_signal`](Self::handle_leave_signal).
    #[must_use]
    pub fn new(
        authority: impl CredentialAuthority,
        channel: C,
        config: SessionConfig,
    ) -> (Self, tokio::sync::mpsc::UnboundedReceiver<LeaveNotice>) {
        let (presence, leave_rx) = PresenceTracker::new();
        let orchestrator = Self {
            config,
            authority: Arc::new(authority),
            channel,
            presence,
            gate: ChannelGate::new(),
            state: SessionState::Idle,
            local_id: None,
            pending: None,
            requested_by: None,
        };
        (orchestrator, leave_rx)
    }

    // ── Workflow ────────────────────────────────────────────────────

    /// Begin matchmaking. Only the first call reaches the collaborator;
    /// later calls return `Ok(false)`.
    ///
    /// # Errors
    ///
    /// Propagates the collaborator's error; the orchestrator stays idle and
    /// `begin` may be called again.
    pub async fn begin<M: Matchmaking + ?Sized>(&mut self, matchmaking: &mut M) -> Result<bool> {
        if self.state != SessionState::Idle {
            debug!("matchmaking already started");
            return Ok(false);
        }
        matchmaking.begin().await?;
        self.transition(SessionState::Starting);
        info!("matchmaking started");
        Ok(true)
    }

    /// Handle one join notification. Never suspends.
    ///
    /// # Errors
    ///
    /// Returns [`SessionJoinError::NotStarted`] if called before
    /// [`begin`](Self::begin). Every other failure is reported through the
    /// returned [`JoinOutcome`].
    pub fn handle_join(&mut self, notification: JoinNotification) -> Result<JoinOutcome> {
        if self.state == SessionState::Idle {
            return Err(SessionJoinError::NotStarted);
        }

        let is_self = notification.is_self;
        let participant = match self.presence.on_join(notification) {
            JoinRecord::Inserted(participant) | JoinRecord::Refreshed(participant) => participant,
            JoinRecord::Dropped(reason) => return Ok(JoinOutcome::Dropped(reason)),
        };

        if is_self {
            self.record_local(&participant.id);
        }

        let session_id =
            match SessionId::from_location(&self.config.location, &self.config.session_marker) {
                Ok(session_id) => session_id,
                Err(error) => {
                    warn!(participant = %participant.id, "join aborted: {error}");
                    return Ok(JoinOutcome::Aborted { participant, error });
                }
            };

        if !self.gate.try_open() {
            debug!(participant = %participant.id, "channel already requested");
            return Ok(JoinOutcome::Recorded { participant });
        }

        self.transition(SessionState::ChannelPending);
        self.requested_by = Some(participant.display_name.clone());
        self.pending = Some(self.spawn_fetch(session_id.clone()));
        info!(session = %session_id, participant = %participant.id, "requesting join credential");

        Ok(JoinOutcome::ChannelRequested {
            participant,
            session_id,
        })
    }

    /// Handle a leave for `id`. Idempotent; returns the removed participant.
    pub fn handle_leave(&mut self, id: &str) -> Option<Participant> {
        self.presence.on_leave(id)
    }

    /// Handle a fired leave signal. Notices from a registration replaced by a
    /// later join of the same participant are ignored.
    pub fn handle_leave_signal(&mut self, notice: &LeaveNotice) -> Option<Participant> {
        self.presence.on_leave_signal(notice)
    }

    /// Wait for the in-flight credential exchange and finish the channel-open
    /// workflow. Returns `None` if no exchange is in flight.
    pub async fn settle(&mut self) -> Option<ChannelOutcome> {
        self.pending.as_ref()?;
        let result = self.fetch_completed().await;
        Some(self.finish_channel(result))
    }

    /// Local teardown of the presence set. Returns how many participants
    /// were removed. An in-flight exchange is not cancelled.
    pub fn teardown(&mut self) -> usize {
        let removed = self.presence.clear();
        debug!(removed, "presence torn down");
        removed
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Current workflow state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Id of this client's own participant, once matchmaking reported it.
    pub fn local_participant_id(&self) -> Option<&ParticipantId> {
        self.local_id.as_ref()
    }

    /// Presence set.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Channel gate.
    pub fn gate(&self) -> &ChannelGate {
        &self.gate
    }

    /// Returns `true` while the credential exchange is in flight.
    pub fn is_fetch_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Configuration this orchestrator runs with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Resolves when the in-flight exchange completes; pending forever if
    /// there is none. Cancel-safe.
    pub(crate) async fn fetch_completed(&mut self) -> std::result::Result<Credential, FetchError> {
        let Some(task) = self.pending.as_mut() else {
            return std::future::pending().await;
        };
        let result = match task.await {
            Ok(result) => result,
            Err(join_err) => Err(FetchError::Interrupted(join_err.to_string())),
        };
        self.pending = None;
        result
    }

    /// Complete the workflow with the exchange result.
    pub(crate) fn finish_channel(
        &mut self,
        result: std::result::Result<Credential, FetchError>,
    ) -> ChannelOutcome {
        let credential = match result {
            Ok(credential) => credential,
            Err(e) => {
                error!("credential exchange failed, channel will not open: {e}");
                self.transition(SessionState::ChannelFailed);
                return ChannelOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        let user_name = self
            .presence
            .first_participant()
            .map(|p| p.display_name.clone())
            .or_else(|| self.requested_by.clone())
            .unwrap_or_default();
        let session_id = credential.session_id().clone();
        let request = ChannelOpenRequest {
            credential: credential.into_token(),
            session_name: session_id.to_string(),
            user_name: user_name.clone(),
            passcode: self.config.passcode.clone(),
            features: self.config.features.clone(),
        };

        match self.channel.open(&self.config.container_id, request) {
            Ok(()) => {
                self.transition(SessionState::ChannelOpened);
                info!(session = %session_id, user = %user_name, "communication channel opened");
                ChannelOutcome::Opened {
                    session_id,
                    user_name,
                }
            }
            Err(e) => {
                error!(session = %session_id, "communication channel refused to open: {e}");
                self.transition(SessionState::ChannelFailed);
                ChannelOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn spawn_fetch(&self, session_id: SessionId) -> FetchTask {
        let authority = Arc::clone(&self.authority);
        let role = self.config.role;
        let timeout = self.config.fetch_timeout;
        tokio::spawn(async move {
            match tokio::time::timeout(timeout, authority.fetch_credential(&session_id, role)).await
            {
                Ok(result) => result,
                Err(_) => Err(FetchError::TimedOut),
            }
        })
    }

    fn record_local(&mut self, id: &ParticipantId) {
        match &self.local_id {
            None => {
                debug!(participant = %id, "local participant identified");
                self.local_id = Some(id.clone());
            }
            Some(existing) if existing == id => {}
            Some(existing) => {
                warn!(
                    current = %existing,
                    reported = %id,
                    "matchmaking reported a second local participant; keeping the first"
                );
            }
        }
    }

    fn transition(&mut self, to: SessionState) {
        debug!(from = ?self.state, to = ?to, "session state transition");
        self.state = to;
    }
}

impl<C: CommunicationChannel> std::fmt::Debug for SessionOrchestrator<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionOrchestrator")
            .field("state", &self.state)
            .field("participants", &self.presence.len())
            .field("local_id", &self.local_id)
            .field("fetch_pending", &self.pending.is_some())
            .finish()
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
    use crate::protocol::Role;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Notify;

    // ── Stubs ───────────────────────────────────────────────────────

    /// Authority that answers with a fixed token or a status error, optionally
    /// holding the answer until released.
    struct StubAuthority {
        token: Option<&'static str>,
        calls: Arc<AtomicUsize>,
        hold: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl CredentialAuthority for StubAuthority {
        async fn fetch_credential(
            &self,
            session_id: &SessionId,
            role: Role,
        ) -> std::result::Result<Credential, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(hold) = &self.hold {
                hold.notified().await;
            }
            match self.token {
                Some(token) => Ok(Credential::new(token, session_id.clone(), role)),
                None => Err(FetchError::Status {
                    status: 500,
                    message: "down".into(),
                }),
            }
        }
    }

    struct NoBegin;

    #[async_trait]
    impl Matchmaking for NoBegin {
        async fn begin(&mut self) -> Result<()> {
            Ok(())
        }

        async fn next_join(&mut self) -> Option<JoinNotification> {
            None
        }
    }

    type Opened = Arc<StdMutex<Vec<(String, ChannelOpenRequest)>>>;

    fn recording_channel() -> (
        impl FnMut(&str, ChannelOpenRequest) -> Result<()> + Send + 'static,
        Opened,
    ) {
        let opened: Opened = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&opened);
        let channel = move |container: &str, request: ChannelOpenRequest| -> Result<()> {
            sink.lock().unwrap().push((container.to_string(), request));
            Ok(())
        };
        (channel, opened)
    }

    fn config(location: &str) -> SessionConfig {
        let endpoint = url::Url::parse("https://auth.example.com/signature").unwrap();
        SessionConfig::new(location, endpoint)
    }

    fn authority(token: Option<&'static str>) -> (StubAuthority, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let authority = StubAuthority {
            token,
            calls: Arc::clone(&calls),
            hold: None,
        };
        (authority, calls)
    }

    // ── Tests ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn end_to_end_opens_channel_once() {
        let (authority, calls) = authority(Some("T"));
        let (channel, opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));

        assert!(orchestrator.begin(&mut NoBegin).await.unwrap());

        let (ana, _ta) = JoinNotification::new("42", "Ana");
        let outcome = orchestrator.handle_join(ana).unwrap();
        assert!(matches!(outcome, JoinOutcome::ChannelRequested { .. }));
        assert_eq!(orchestrator.state(), SessionState::ChannelPending);

        let (bo, _tb) = JoinNotification::new("7", "Bo");
        let outcome = orchestrator.handle_join(bo).unwrap();
        assert!(matches!(outcome, JoinOutcome::Recorded { .. }));

        let outcome = orchestrator.settle().await.unwrap();
        assert_eq!(
            outcome,
            ChannelOutcome::Opened {
                session_id: SessionId::new("room1").unwrap(),
                user_name: "Ana".into(),
            }
        );
        assert_eq!(orchestrator.state(), SessionState::ChannelOpened);
        assert!(orchestrator.settle().await.is_none());

        let opened = opened.lock().unwrap();
        assert_eq!(opened.len(), 1);
        let (container, request) = &opened[0];
        assert_eq!(container, "sessionContainer");
        assert_eq!(request.credential, "T");
        assert_eq!(request.session_name, "room1");
        assert_eq!(request.user_name, "Ana");
        assert_eq!(request.passcode, "");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn join_before_begin_is_rejected() {
        let (authority, _calls) = authority(Some("T"));
        let (channel, _opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));

        let (ana, _ta) = JoinNotification::new("42", "Ana");
        let err = orchestrator.handle_join(ana).unwrap_err();
        assert!(matches!(err, SessionJoinError::NotStarted));
        assert!(orchestrator.presence().is_empty());
    }

    #[tokio::test]
    async fn begin_is_idempotent() {
        let (authority, _calls) = authority(Some("T"));
        let (channel, _opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));

        assert!(orchestrator.begin(&mut NoBegin).await.unwrap());
        assert!(!orchestrator.begin(&mut NoBegin).await.unwrap());
        assert_eq!(orchestrator.state(), SessionState::Starting);
    }

    #[tokio::test]
    async fn empty_session_id_aborts_without_touching_gate() {
        let (authority, calls) = authority(Some("T"));
        let (channel, opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r="));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (ana, _ta) = JoinNotification::new("42", "Ana");
        let outcome = orchestrator.handle_join(ana).unwrap();
        assert!(matches!(
            outcome,
            JoinOutcome::Aborted {
                error: ConfigurationError::EmptySessionId,
                ..
            }
        ));
        assert!(!orchestrator.gate().is_spent());
        assert!(orchestrator.presence().contains("42"));
        assert_eq!(orchestrator.state(), SessionState::Starting);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_never_opens_channel_and_spends_gate() {
        let (authority, calls) = authority(None);
        let (channel, opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (ana, _ta) = JoinNotification::new("A", "Ana");
        let (bo, _tb) = JoinNotification::new("B", "Bo");
        orchestrator.handle_join(ana).unwrap();
        orchestrator.handle_join(bo).unwrap();

        let outcome = orchestrator.settle().await.unwrap();
        assert!(matches!(outcome, ChannelOutcome::Failed { .. }));
        assert_eq!(orchestrator.state(), SessionState::ChannelFailed);
        assert!(opened.lock().unwrap().is_empty());

        // Presence keeps working after the failure.
        assert!(orchestrator.handle_leave("A").is_some());
        assert_eq!(orchestrator.presence().snapshot().len(), 1);

        // The gate stays spent; later joins do not retry.
        let (cy, _tc) = JoinNotification::new("C", "Cy");
        assert!(matches!(
            orchestrator.handle_join(cy).unwrap(),
            JoinOutcome::Recorded { .. }
        ));
        assert!(orchestrator.settle().await.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn display_name_is_resolved_when_fetch_completes() {
        let hold = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let authority = StubAuthority {
            token: Some("T"),
            calls: Arc::clone(&calls),
            hold: Some(Arc::clone(&hold)),
        };
        let (channel, opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (ana, _ta) = JoinNotification::new("A", "Ana");
        let (bo, _tb) = JoinNotification::new("B", "Bo");
        orchestrator.handle_join(ana).unwrap();
        orchestrator.handle_join(bo).unwrap();
        assert!(orchestrator.is_fetch_pending());

        // Ana leaves while the exchange is in flight.
        orchestrator.handle_leave("A");
        hold.notify_one();

        orchestrator.settle().await.unwrap();
        assert_eq!(opened.lock().unwrap()[0].1.user_name, "Bo");
    }

    #[tokio::test]
    async fn requesting_participant_name_used_when_presence_empty() {
        let (authority, _calls) = authority(Some("T"));
        let (channel, opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (ana, _ta) = JoinNotification::new("A", "Ana");
        orchestrator.handle_join(ana).unwrap();
        orchestrator.handle_leave("A");

        orchestrator.settle().await.unwrap();
        assert_eq!(opened.lock().unwrap()[0].1.user_name, "Ana");
    }

    #[tokio::test]
    async fn stale_leave_does_not_remove_rejoined_participant() {
        let (authority, _calls) = authority(Some("T"));
        let (channel, _opened) = recording_channel();
        let (mut orchestrator, mut leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (ana, first_leave) = JoinNotification::new("A", "Ana");
        orchestrator.handle_join(ana).unwrap();
        assert!(first_leave.fire());
        let stale = leaves.recv().await.unwrap();

        let (ana_again, _second_leave) = JoinNotification::new("A", "Ana");
        orchestrator.handle_join(ana_again).unwrap();

        assert!(orchestrator.handle_leave_signal(&stale).is_none());
        assert_eq!(
            orchestrator.presence().snapshot(),
            vec![Participant::new("A", "Ana")]
        );
    }

    #[tokio::test]
    async fn malformed_join_is_dropped_and_gate_untouched() {
        let (authority, _calls) = authority(Some("T"));
        let (channel, _opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (trigger, on_leave) = crate::matchmaking::LeaveSignal::pair();
        drop(trigger);
        let notification = JoinNotification {
            id: None,
            profile: None,
            is_self: false,
            on_leave,
        };
        assert_eq!(
            orchestrator.handle_join(notification).unwrap(),
            JoinOutcome::Dropped(MalformedNotification::MissingId)
        );
        assert!(!orchestrator.gate().is_spent());
    }

    #[tokio::test]
    async fn local_id_is_assigned_once() {
        let (authority, _calls) = authority(Some("T"));
        let (channel, _opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (remote, _t0) = JoinNotification::new("R", "Remote");
        let (me, _t1) = JoinNotification::new("ME", "Me");
        let (impostor, _t2) = JoinNotification::new("ME2", "Me again");
        orchestrator.handle_join(remote).unwrap();
        assert!(orchestrator.local_participant_id().is_none());

        orchestrator.handle_join(me.local()).unwrap();
        orchestrator.handle_join(impostor.local()).unwrap();
        assert_eq!(
            orchestrator.local_participant_id().map(String::as_str),
            Some("ME")
        );
    }

    #[tokio::test]
    async fn channel_refusal_is_terminal_failure() {
        let (authority, _calls) = authority(Some("T"));
        let channel = |_: &str, _: ChannelOpenRequest| -> Result<()> {
            Err(SessionJoinError::Channel("widget missing".into()))
        };
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (ana, _ta) = JoinNotification::new("A", "Ana");
        orchestrator.handle_join(ana).unwrap();
        let outcome = orchestrator.settle().await.unwrap();

        match outcome {
            ChannelOutcome::Failed { reason } => assert!(reason.contains("widget missing")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(orchestrator.state().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_authority_times_out() {
        let hold = Arc::new(Notify::new());
        let authority = StubAuthority {
            token: Some("T"),
            calls: Arc::new(AtomicUsize::new(0)),
            hold: Some(hold),
        };
        let (channel, opened) = recording_channel();
        let config = config("https://play.test/#r=room1")
            .with_fetch_timeout(std::time::Duration::from_millis(100));
        let (mut orchestrator, _leaves) = SessionOrchestrator::new(authority, channel, config);
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (ana, _ta) = JoinNotification::new("A", "Ana");
        orchestrator.handle_join(ana).unwrap();

        let outcome = orchestrator.settle().await.unwrap();
        assert!(matches!(outcome, ChannelOutcome::Failed { .. }));
        assert!(opened.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn teardown_clears_presence() {
        let (authority, _calls) = authority(Some("T"));
        let (channel, _opened) = recording_channel();
        let (mut orchestrator, _leaves) =
            SessionOrchestrator::new(authority, channel, config("https://play.test/#r=room1"));
        orchestrator.begin(&mut NoBegin).await.unwrap();

        let (ana, _ta) = JoinNotification::new("A", "Ana");
        orchestrator.handle_join(ana).unwrap();
        assert_eq!(orchestrator.teardown(), 1);
        assert!(orchestrator.presence().is_empty());
    }
}
