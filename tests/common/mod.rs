#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for session-join integration tests.
//!
//! Provides a channel-driven [`MockConnection`] for the matchmaking side, a
//! [`StubAuthority`] for the credential side, a recording channel, and helpers
//! for building matchmaking message JSON.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use session_join::protocol::{
    ChannelOpenRequest, MatchmakingClientMessage, MatchmakingServerMessage, Profile,
};
use session_join::{
    Credential, CredentialAuthority, FetchError, MatchmakingConnection, Role, SessionConfig,
    SessionEvent, SessionId, SessionJoinError,
};
use tokio::sync::{mpsc, Notify};

// ── MockConnection ──────────────────────────────────────────────────

/// Test-side handle to a [`MockConnection`].
pub struct MockServer {
    incoming: Option<mpsc::UnboundedSender<String>>,
    /// Messages sent by the client, in order.
    pub sent: Arc<StdMutex<Vec<MatchmakingClientMessage>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockServer {
    /// Deliver one JSON frame to the client.
    pub fn push(&self, json: String) {
        if let Some(tx) = &self.incoming {
            tx.send(json).unwrap();
        }
    }

    /// Close the connection from the server side.
    pub fn hang_up(&mut self) {
        self.incoming = None;
    }
}

/// A channel-based mock matchmaking connection.
///
/// `recv()` decodes whatever JSON the test pushes through the [`MockServer`]
/// and returns `None` once the server hangs up.
pub struct MockConnection {
    incoming: mpsc::UnboundedReceiver<String>,
    sent: Arc<StdMutex<Vec<MatchmakingClientMessage>>>,
    closed: Arc<AtomicBool>,
}

impl MockConnection {
    pub fn new() -> (Self, MockServer) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let connection = Self {
            incoming: rx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        let server = MockServer {
            incoming: Some(tx),
            sent,
            closed,
        };
        (connection, server)
    }
}

#[async_trait]
impl MatchmakingConnection for MockConnection {
    async fn send(&mut self, message: MatchmakingClientMessage) -> Result<(), SessionJoinError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<MatchmakingServerMessage, SessionJoinError>> {
        let text = self.incoming.recv().await?;
        Some(serde_json::from_str(&text).map_err(SessionJoinError::from))
    }

    async fn close(&mut self) -> Result<(), SessionJoinError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── StubAuthority ───────────────────────────────────────────────────

/// Credential authority that answers with a fixed token, or fails with a
/// 500 when `token` is `None`. With `hold` set, answers only after the test
/// calls `notify_one`.
pub struct StubAuthority {
    pub token: Option<&'static str>,
    pub calls: Arc<AtomicUsize>,
    pub hold: Option<Arc<Notify>>,
}

impl StubAuthority {
    pub fn issuing(token: &'static str) -> (Self, Arc<AtomicUsize>) {
        Self::build(Some(token), None)
    }

    pub fn failing() -> (Self, Arc<AtomicUsize>) {
        Self::build(None, None)
    }

    pub fn held(token: &'static str, hold: Arc<Notify>) -> (Self, Arc<AtomicUsize>) {
        Self::build(Some(token), Some(hold))
    }

    fn build(token: Option<&'static str>, hold: Option<Arc<Notify>>) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let authority = Self {
            token,
            calls: Arc::clone(&calls),
            hold,
        };
        (authority, calls)
    }
}

#[async_trait]
impl CredentialAuthority for StubAuthority {
    async fn fetch_credential(
        &self,
        session_id: &SessionId,
        role: Role,
    ) -> Result<Credential, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        match self.token {
            Some(token) => Ok(Credential::new(token, session_id.clone(), role)),
            None => Err(FetchError::Status {
                status: 500,
                message: "authority unavailable".into(),
            }),
        }
    }
}

// ── Recording channel ───────────────────────────────────────────────

pub type OpenedLog = Arc<StdMutex<Vec<(String, ChannelOpenRequest)>>>;

/// A channel that records every open request it receives.
pub fn recording_channel() -> (
    impl FnMut(&str, ChannelOpenRequest) -> session_join::Result<()> + Send + 'static,
    OpenedLog,
) {
    let opened: OpenedLog = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&opened);
    let channel = move |container: &str, request: ChannelOpenRequest| -> session_join::Result<()> {
        sink.lock().unwrap().push((container.to_string(), request));
        Ok(())
    };
    (channel, opened)
}

// ── Config ──────────────────────────────────────────────────────────

pub fn config(location: &str) -> SessionConfig {
    let endpoint = url::Url::parse("https://auth.example.com/signature").unwrap();
    SessionConfig::new(location, endpoint)
}

// ── Events ──────────────────────────────────────────────────────────

/// Receive the next event, failing the test after two seconds.
pub async fn next_event(rx: &mut mpsc::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collect events up to and including the first one matching `done`.
pub async fn collect_until(
    rx: &mut mpsc::Receiver<SessionEvent>,
    done: impl Fn(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    loop {
        let event = next_event(rx).await;
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

// ── Matchmaking JSON ────────────────────────────────────────────────

pub fn started_json() -> String {
    serde_json::to_string(&MatchmakingServerMessage::Started).unwrap()
}

pub fn joined_json(id: &str, name: &str) -> String {
    serde_json::to_string(&MatchmakingServerMessage::ParticipantJoined {
        id: Some(id.into()),
        profile: Some(Profile { name: name.into() }),
        is_self: false,
    })
    .unwrap()
}

pub fn self_joined_json(id: &str, name: &str) -> String {
    serde_json::to_string(&MatchmakingServerMessage::ParticipantJoined {
        id: Some(id.into()),
        profile: Some(Profile { name: name.into() }),
        is_self: true,
    })
    .unwrap()
}

pub fn joined_without_id_json(name: &str) -> String {
    serde_json::to_string(&MatchmakingServerMessage::ParticipantJoined {
        id: None,
        profile: Some(Profile { name: name.into() }),
        is_self: false,
    })
    .unwrap()
}

pub fn left_json(id: &str) -> String {
    serde_json::to_string(&MatchmakingServerMessage::ParticipantLeft { id: id.into() }).unwrap()
}

pub fn error_json(message: &str) -> String {
    serde_json::to_string(&MatchmakingServerMessage::Error {
        message: message.into(),
    })
    .unwrap()
}
