//! # Session Join
//!
//! Client-side orchestrator that turns matchmaking presence into a shared
//! real-time communication session.
//!
//! When peers join a matchmaking room, the orchestrator tracks who is present,
//! derives the session identifier from the client's location, trades it for a
//! signed credential and opens the communication channel exactly once per
//! process, under the display name of the earliest participant still present.
//!
//! ## Features
//!
//! - **Presence tracking**: insertion-ordered participants, idempotent leaves
//! - **Single-fire gate**: the channel-open workflow runs at most once, even
//!   when the credential exchange fails
//! - **Pluggable collaborators**: [`Matchmaking`], [`CredentialAuthority`] and
//!   [`CommunicationChannel`] are traits; HTTP and WebSocket implementations
//!   are built in
//! - **Event-driven**: receive typed [`SessionEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use session_join::protocol::ChannelOpenRequest;
//! use session_join::{
//!     HttpCredentialFetcher, SessionClient, SessionConfig, SessionEvent, WebSocketMatchmaking,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let endpoint = url::Url::parse("https://auth.example.com/signature")?;
//! let config = SessionConfig::new("https://play.example.com/#r=room1", endpoint);
//! let authority = HttpCredentialFetcher::from_config(&config)?;
//! let matchmaking =
//!     WebSocketMatchmaking::connect("wss://match.example.com/ws", Duration::from_secs(10)).await?;
//!
//! let widget = |container: &str, request: ChannelOpenRequest| -> session_join::Result<()> {
//!     println!("mount {} into #{container}", request.session_name);
//!     Ok(())
//! };
//!
//! let (mut client, mut events) = SessionClient::start(matchmaking, authority, widget, config);
//! while let Some(event) = events.recv().await {
//!     if let SessionEvent::ChannelOpened { session_id, .. } = &event {
//!         println!("joined {session_id}");
//!     }
//!     if matches!(event, SessionEvent::Stopped { .. }) {
//!         break;
//!     }
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod credential;
pub mod error;
pub mod event;
pub mod gate;
pub mod matchmaking;
pub mod orchestrator;
pub mod presence;
pub mod protocol;
pub mod session;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use channel::CommunicationChannel;
pub use client::SessionClient;
pub use config::SessionConfig;
pub use credential::{Credential, CredentialAuthority, HttpCredentialFetcher};
pub use error::{ConfigurationError, FetchError, MalformedNotification, Result, SessionJoinError};
pub use event::SessionEvent;
pub use gate::ChannelGate;
pub use matchmaking::{
    ConnectionMatchmaking, JoinNotification, LeaveSignal, LeaveTrigger, Matchmaking,
    MatchmakingConnection,
};
pub use orchestrator::{ChannelOutcome, JoinOutcome, SessionOrchestrator, SessionState};
pub use presence::{LeaveNotice, Participant, PresenceTracker};
pub use protocol::{Feature, ParticipantId, Role};
pub use session::SessionId;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnection, WebSocketMatchmaking};
