//! # Join Session Example
//!
//! Demonstrates the full session-join lifecycle:
//!
//! 1. Connect to the matchmaking service via WebSocket
//! 2. Begin matchmaking and track who joins and leaves
//! 3. On the first join, fetch a credential and open the channel once
//! 4. Shut down gracefully on Ctrl+C or when matchmaking ends
//!
//! ## Running
//!
//! ```sh
//! cargo run --example join_session
//!
//! # Override the endpoints and the page location:
//! MATCHMAKING_URL=ws://my-host:8080/ws \
//! CREDENTIAL_URL=http://my-host:4000/signature \
//! SESSION_LOCATION='https://play.example.com/#r=room1' \
//!     cargo run --example join_session
//! ```

use std::time::Duration;

use session_join::protocol::ChannelOpenRequest;
use session_join::{
    HttpCredentialFetcher, SessionClient, SessionConfig, SessionEvent, WebSocketMatchmaking,
};

const DEFAULT_MATCHMAKING_URL: &str = "ws://localhost:8080/ws";
const DEFAULT_CREDENTIAL_URL: &str = "http://localhost:4000/signature";
const DEFAULT_LOCATION: &str = "http://localhost:3000/#r=demo-room";

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let matchmaking_url = env_or("MATCHMAKING_URL", DEFAULT_MATCHMAKING_URL);
    let credential_url = url::Url::parse(&env_or("CREDENTIAL_URL", DEFAULT_CREDENTIAL_URL))?;
    let location = env_or("SESSION_LOCATION", DEFAULT_LOCATION);
    let config = SessionConfig::new(location, credential_url);

    // ── Collaborators ───────────────────────────────────────────────
    tracing::info!("Connecting to {matchmaking_url}");
    let matchmaking = WebSocketMatchmaking::connect(&matchmaking_url, Duration::from_secs(10)).await?;
    let authority = HttpCredentialFetcher::from_config(&config)?;

    // Stands in for the video widget: logs what it would mount.
    let widget = |container: &str, request: ChannelOpenRequest| -> session_join::Result<()> {
        tracing::info!(
            "Mounting session {} for {} into #{container} with {:?}",
            request.session_name,
            request.user_name,
            request.features
        );
        Ok(())
    };

    let (mut client, mut event_rx) = SessionClient::start(matchmaking, authority, widget, config);

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = event_rx.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };

                match event {
                    SessionEvent::Started => tracing::info!("Matchmaking started"),
                    SessionEvent::ParticipantJoined { participant } => {
                        tracing::info!("{} joined ({})", participant.display_name, participant.id);
                    }
                    SessionEvent::ParticipantLeft { participant } => {
                        tracing::info!("{} left", participant.display_name);
                    }
                    SessionEvent::ChannelRequested { session_id } => {
                        tracing::info!("Requesting credential for {session_id}");
                    }
                    SessionEvent::ChannelOpened { session_id, user_name } => {
                        tracing::info!("Joined {session_id} as {user_name}");
                    }
                    SessionEvent::ChannelFailed { reason } => {
                        tracing::error!("Channel will not open: {reason}");
                    }
                    SessionEvent::JoinAborted { error } => {
                        tracing::error!("Cannot derive session: {error}");
                    }
                    SessionEvent::Stopped { reason } => {
                        tracing::warn!("Stopped: {}", reason.as_deref().unwrap_or("matchmaking ended"));
                        break;
                    }
                    other => tracing::debug!("Event: {other:?}"),
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down…");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    client.shutdown().await;
    tracing::info!(state = ?client.state().await, "Session closed");
    Ok(())
}
