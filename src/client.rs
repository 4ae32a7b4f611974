//! Async session client.
//!
//! [`SessionClient`] is a thin handle over a background session loop. The loop
//! is the single logical event queue of the session: it multiplexes join
//! notifications, fired leave signals, completion of the credential exchange
//! and the shutdown signal with `tokio::select!`, so orchestrator logic never
//! runs in parallel with itself. Events are emitted on a bounded channel
//! ([`tokio::sync::mpsc::Receiver<SessionEvent>`]) returned from
//! [`SessionClient::start`].
//!
//! # Example
//!
//! ```rust,ignore
//! let matchmaking =
//!     WebSocketMatchmaking::connect("wss://match.example.com/ws", Duration::from_secs(10)).await?;
//! let config = SessionConfig::new(page_url, credential_endpoint);
//! let authority = HttpCredentialFetcher::from_config(&config)?;
//! let (mut client, mut events) = SessionClient::start(
//!     matchmaking,
//!     authority,
//!     widget,
//!     config,
//! );
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::ChannelOpened { session_id, .. } => { /* … */ }
//!         SessionEvent::Stopped { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

use crate::channel::CommunicationChannel;
use crate::config::SessionConfig;
use crate::credential::CredentialAuthority;
use crate::event::SessionEvent;
use crate::matchmaking::Matchmaking;
use crate::orchestrator::{JoinOutcome, SessionOrchestrator, SessionState};
use crate::presence::{LeaveNotice, Participant};
use crate::protocol::ParticipantId;

// ── Shared state ────────────────────────────────────────────────────

/// Snapshot of orchestrator state published by the session loop.
struct SharedState {
    running: AtomicBool,
    state: Mutex<SessionState>,
    local_id: Mutex<Option<ParticipantId>>,
    participants: Mutex<Vec<Participant>>,
}

impl SharedState {
    fn new() -> Self {
        Self {
            running: AtomicBool::new(true),
            state: Mutex::new(SessionState::Idle),
            local_id: Mutex::new(None),
            participants: Mutex::new(Vec::new()),
        }
    }

    async fn publish(&self, snapshot: Snapshot) {
        let Snapshot {
            state,
            local_id,
            participants,
        } = snapshot;
        *self.state.lock().await = state;
        *self.local_id.lock().await = local_id;
        *self.participants.lock().await = participants;
    }
}

/// Owned copy of the orchestrator's observable state.
///
/// Taken synchronously so the session loop never holds a borrow of the
/// orchestrator across an await; the channel collaborator only has to be
/// `Send`.
struct Snapshot {
    state: SessionState,
    local_id: Option<ParticipantId>,
    participants: Vec<Participant>,
}

impl Snapshot {
    fn of<C: CommunicationChannel>(orchestrator: &SessionOrchestrator<C>) -> Self {
        Self {
            state: orchestrator.state(),
            local_id: orchestrator.local_participant_id().cloned(),
            participants: orchestrator.presence().snapshot(),
        }
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running session.
///
/// Created via [`SessionClient::start`], which spawns the session loop and
/// returns this handle together with an event receiver.
pub struct SessionClient {
    state: Arc<SharedState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SessionClient {
    /// Spawn the session loop and return a handle plus event receiver.
    ///
    /// The loop begins matchmaking immediately, then handles notifications
    /// until matchmaking ends or [`shutdown`](Self::shutdown) is called.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start<M, A, C>(
        matchmaking: M,
        authority: A,
        channel: C,
        config: SessionConfig,
    ) -> (Self, mpsc::Receiver<SessionEvent>)
    where
        M: Matchmaking,
        A: CredentialAuthority,
        C: CommunicationChannel,
    {
        // Clamp capacity to at least 1 (tokio panics on 0).
        let capacity = config.event_channel_capacity.max(1);
        let shutdown_timeout = config.shutdown_timeout;
        let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let state = Arc::new(SharedState::new());
        let (orchestrator, leave_rx) = SessionOrchestrator::new(authority, channel, config);

        let task = tokio::spawn(session_loop(
            matchmaking,
            orchestrator,
            leave_rx,
            event_tx,
            Arc::clone(&state),
            shutdown_rx,
        ));

        let client = Self {
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout,
        };
        (client, event_rx)
    }

    /// Stop the session loop.
    ///
    /// The loop is given `shutdown_timeout` to release matchmaking, tear down
    /// presence and emit `Stopped`; after that it is aborted. Safe to call twice.
    pub async fn shutdown(&mut self) {
        debug!("SessionClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.running.store(false, Ordering::Release);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Returns `true` while the session loop is running.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// Workflow state as of the last handled notification.
    pub async fn state(&self) -> SessionState {
        *self.state.state.lock().await
    }

    /// Present participants in join order.
    pub async fn participants(&self) -> Vec<Participant> {
        self.state.participants.lock().await.clone()
    }

    /// This client's own participant id, once matchmaking reported it.
    pub async fn local_participant_id(&self) -> Option<ParticipantId> {
        self.state.local_id.lock().await.clone()
    }
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("running", &self.is_running())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        // No executor is available to drive a graceful shutdown here.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Background loop driving one session.
///
/// Exits when:
/// - matchmaking fails to begin
/// - matchmaking ends (`next_join` returns `None`)
/// - the shutdown signal fires or the handle is dropped
async fn session_loop<M, C>(
    mut matchmaking: M,
    mut orchestrator: SessionOrchestrator<C>,
    mut leave_rx: mpsc::UnboundedReceiver<LeaveNotice>,
    event_tx: mpsc::Sender<SessionEvent>,
    state: Arc<SharedState>,
    mut shutdown_rx: oneshot::Receiver<()>,
) where
    M: Matchmaking,
    C: CommunicationChannel,
{
    debug!("session loop started");

    if let Err(e) = orchestrator.begin(&mut matchmaking).await {
        error!("matchmaking failed to start: {e}");
        emit_stopped(
            &event_tx,
            &state,
            Some(format!("matchmaking failed to start: {e}")),
        )
        .await;
        return;
    }
    let snapshot = Snapshot::of(&orchestrator);
    state.publish(snapshot).await;
    emit_event(&event_tx, SessionEvent::Started);

    let reason = loop {
        let events = tokio::select! {
            // Branch 1: shutdown signal (or handle dropped)
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                break Some("session shut down".to_string());
            }

            // Branch 2: join notification from matchmaking
            joined = matchmaking.next_join() => {
                let Some(notification) = joined else {
                    debug!("matchmaking ended");
                    break None;
                };
                match orchestrator.handle_join(notification) {
                    Ok(outcome) => join_events(outcome),
                    Err(e) => {
                        warn!("join notification not handled: {e}");
                        Vec::new()
                    }
                }
            }

            // Branch 3: a registered leave signal fired
            Some(notice) = leave_rx.recv() => {
                orchestrator
                    .handle_leave_signal(&notice)
                    .map(|participant| SessionEvent::ParticipantLeft { participant })
                    .into_iter()
                    .collect::<Vec<_>>()
            }

            // Branch 4: the credential exchange completed
            result = orchestrator.fetch_completed() => {
                let outcome = orchestrator.finish_channel(result);
                vec![SessionEvent::from(outcome)]
            }
        };

        // Publish before emitting so observers never see stale state.
        let snapshot = Snapshot::of(&orchestrator);
        state.publish(snapshot).await;
        for event in events {
            emit_event(&event_tx, event);
        }
    };

    if let Err(e) = matchmaking.end().await {
        debug!("matchmaking did not end cleanly: {e}");
    }
    orchestrator.teardown();
    let snapshot = Snapshot::of(&orchestrator);
    state.publish(snapshot).await;
    emit_stopped(&event_tx, &state, reason).await;

    debug!("session loop exited");
}

/// Translate a [`JoinOutcome`] into events.
fn join_events(outcome: JoinOutcome) -> Vec<SessionEvent> {
    match outcome {
        JoinOutcome::Dropped(reason) => vec![SessionEvent::NotificationDropped { reason }],
        JoinOutcome::Aborted { participant, error } => vec![
            SessionEvent::ParticipantJoined { participant },
            SessionEvent::JoinAborted { error },
        ],
        JoinOutcome::Recorded { participant } => {
            vec![SessionEvent::ParticipantJoined { participant }]
        }
        JoinOutcome::ChannelRequested {
            participant,
            session_id,
        } => vec![
            SessionEvent::ParticipantJoined { participant },
            SessionEvent::ChannelRequested { session_id },
        ],
    }
}

/// Emit an event. If the channel is full, log a warning and drop the event so
/// the session loop never blocks on a slow consumer.
fn emit_event(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit the final [`Stopped`](SessionEvent::Stopped) event and mark the
/// session as no longer running.
///
/// Uses `send().await` because `Stopped` must never be silently dropped.
async fn emit_stopped(
    event_tx: &mpsc::Sender<SessionEvent>,
    state: &SharedState,
    reason: Option<String>,
) {
    state.running.store(false, Ordering::Release);
    if event_tx.send(SessionEvent::Stopped { reason }).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::credential::Credential;
    use crate::error::{FetchError, Result, SessionJoinError};
    use crate::matchmaking::{JoinNotification, LeaveTrigger};
    use crate::protocol::{ChannelOpenRequest, Role};
    use crate::session::SessionId;
    use async_trait::async_trait;

    /// Matchmaking fed from a channel so tests control delivery timing.
    struct ChannelMatchmaking {
        joins: mpsc::UnboundedReceiver<JoinNotification>,
        fail_begin: bool,
    }

    #[async_trait]
    impl Matchmaking for ChannelMatchmaking {
        async fn begin(&mut self) -> Result<()> {
            if self.fail_begin {
                return Err(SessionJoinError::TransportClosed);
            }
            Ok(())
        }

        async fn next_join(&mut self) -> Option<JoinNotification> {
            self.joins.recv().await
        }
    }

    struct FixedAuthority;

    #[async_trait]
    impl CredentialAuthority for FixedAuthority {
        async fn fetch_credential(
            &self,
            session_id: &SessionId,
            role: Role,
        ) -> std::result::Result<Credential, FetchError> {
            Ok(Credential::new("T", session_id.clone(), role))
        }
    }

    fn config() -> SessionConfig {
        let endpoint = url::Url::parse("https://auth.example.com/signature").unwrap();
        SessionConfig::new("https://play.test/#r=room1", endpoint)
    }

    fn start(
        fail_begin: bool,
    ) -> (
        SessionClient,
        mpsc::Receiver<SessionEvent>,
        mpsc::UnboundedSender<JoinNotification>,
    ) {
        let (join_tx, joins) = mpsc::unbounded_channel();
        let matchmaking = ChannelMatchmaking { joins, fail_begin };
        let channel = |_: &str, _: ChannelOpenRequest| -> Result<()> { Ok(()) };
        let (client, events) = SessionClient::start(matchmaking, FixedAuthority, channel, config());
        (client, events, join_tx)
    }

    fn join(id: &str, name: &str) -> (JoinNotification, LeaveTrigger) {
        JoinNotification::new(id, name)
    }

    #[tokio::test]
    async fn started_is_first_event() {
        let (mut client, mut events, _joins) = start(false);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Started);
        assert!(client.is_running());
        assert_eq!(client.state().await, SessionState::Starting);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn begin_failure_stops_session() {
        let (mut client, mut events, _joins) = start(true);
        let event = events.recv().await.unwrap();
        match event {
            SessionEvent::Stopped { reason } => {
                assert!(reason.unwrap().contains("matchmaking failed to start"));
            }
            other => panic!("expected Stopped, got {other:?}"),
        }
        assert!(!client.is_running());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn join_opens_channel_and_leave_updates_presence() {
        let (mut client, mut events, joins) = start(false);
        let _ = events.recv().await; // Started

        let (ana, ana_leaves) = join("42", "Ana");
        joins.send(ana.local()).unwrap();

        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::ParticipantJoined { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::ChannelRequested { .. }
        ));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::ChannelOpened {
                session_id: SessionId::new("room1").unwrap(),
                user_name: "Ana".into(),
            }
        );
        assert_eq!(client.state().await, SessionState::ChannelOpened);
        assert_eq!(client.local_participant_id().await.as_deref(), Some("42"));

        assert!(ana_leaves.fire());
        match events.recv().await.unwrap() {
            SessionEvent::ParticipantLeft { participant } => assert_eq!(participant.id, "42"),
            other => panic!("expected ParticipantLeft, got {other:?}"),
        }
        assert!(client.participants().await.is_empty());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn channel_need_not_be_sync() {
        use std::cell::Cell;

        let (join_tx, joins) = mpsc::unbounded_channel();
        let matchmaking = ChannelMatchmaking {
            joins,
            fail_begin: false,
        };
        // Cell is Send but not Sync.
        let opens = Cell::new(0_usize);
        let channel = move |_: &str, _: ChannelOpenRequest| -> Result<()> {
            opens.set(opens.get() + 1);
            assert_eq!(opens.get(), 1);
            Ok(())
        };
        let (mut client, mut events) =
            SessionClient::start(matchmaking, FixedAuthority, channel, config());
        let _ = events.recv().await; // Started

        let (ana, _ana_leaves) = join("42", "Ana");
        join_tx.send(ana).unwrap();
        let _ = events.recv().await; // ParticipantJoined
        let _ = events.recv().await; // ChannelRequested
        assert!(matches!(
            events.recv().await.unwrap(),
            SessionEvent::ChannelOpened { .. }
        ));
        assert_eq!(client.state().await, SessionState::ChannelOpened);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn matchmaking_end_stops_with_no_reason() {
        let (mut client, mut events, joins) = start(false);
        let _ = events.recv().await; // Started
        drop(joins);

        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::Stopped { reason: None }
        );
        assert!(events.recv().await.is_none());
        assert!(!client.is_running());
        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_emits_stopped_and_tears_down_presence() {
        let (mut client, mut events, joins) = start(false);
        let _ = events.recv().await; // Started

        let (ana, _ana_leaves) = join("1", "Ana");
        joins.send(ana).unwrap();
        let _ = events.recv().await; // ParticipantJoined

        client.shutdown().await;
        assert!(!client.is_running());
        assert!(client.participants().await.is_empty());

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert!(matches!(last, Some(SessionEvent::Stopped { reason: Some(_) })));
    }

    #[tokio::test]
    async fn double_shutdown_does_not_panic() {
        let (mut client, mut events, _joins) = start(false);
        let _ = events.recv().await;
        client.shutdown().await;
        client.shutdown().await;
    }

    #[tokio::test]
    async fn drop_without_explicit_shutdown() {
        let (client, mut events, _joins) = start(false);
        let _ = events.recv().await;
        drop(client);
        // The aborted loop drops its sender; draining must not hang.
        while let Some(_event) = events.recv().await {}
    }
}
