//! Matchmaking over WebSocket, built on `tokio-tungstenite`.
//!
//! Each frame carries one JSON-encoded matchmaking message. Text and binary
//! frames are both decoded; ping and pong are answered by tungstenite.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), session_join::SessionJoinError> {
//! use std::time::Duration;
//! use session_join::WebSocketMatchmaking;
//!
//! let matchmaking =
//!     WebSocketMatchmaking::connect("wss://match.example.com/ws", Duration::from_secs(5)).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, trace};
use url::Url;

use crate::error::{Result, SessionJoinError};
use crate::matchmaking::{ConnectionMatchmaking, MatchmakingConnection};
use crate::protocol::{MatchmakingClientMessage, MatchmakingServerMessage};

/// Underlying WebSocket stream, exposed so callers can perform their own
/// handshake (custom TLS, auth headers) and hand the result to
/// [`WebSocketConnection::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// [`ConnectionMatchmaking`] over a [`WebSocketConnection`].
pub type WebSocketMatchmaking = ConnectionMatchmaking<WebSocketConnection>;

impl ConnectionMatchmaking<WebSocketConnection> {
    /// Connect to the matchmaking service at `url` and wrap the connection.
    ///
    /// # Errors
    ///
    /// See [`WebSocketConnection::connect`].
    pub async fn connect(url: &str, deadline: Duration) -> Result<Self> {
        let connection = WebSocketConnection::connect(url, deadline).await?;
        Ok(Self::new(connection))
    }
}

/// A [`MatchmakingConnection`] speaking JSON frames over a WebSocket.
///
/// [`recv`](MatchmakingConnection::recv) is cancel-safe.
#[derive(Debug)]
pub struct WebSocketConnection {
    stream: WsStream,
    closed: bool,
}

impl WebSocketConnection {
    /// Open a connection to `url`, which must use the `ws` or `wss` scheme.
    ///
    /// # Errors
    ///
    /// - [`SessionJoinError::Connect`] if the URL is invalid or the handshake fails
    /// - [`SessionJoinError::Timeout`] if the handshake does not finish within `deadline`
    pub async fn connect(url: &str, deadline: Duration) -> Result<Self> {
        let refused = |reason: String| SessionJoinError::Connect {
            url: url.to_string(),
            reason,
        };

        let endpoint = Url::parse(url).map_err(|e| refused(e.to_string()))?;
        if !matches!(endpoint.scheme(), "ws" | "wss") {
            return Err(refused(format!("unsupported scheme {:?}", endpoint.scheme())));
        }

        debug!(url = %endpoint, "opening matchmaking connection");
        let (stream, response) =
            match tokio::time::timeout(deadline, tokio_tungstenite::connect_async(endpoint.as_str()))
                .await
            {
                Ok(Ok(handshake)) => handshake,
                Ok(Err(e)) => return Err(refused(e.to_string())),
                Err(_) => return Err(SessionJoinError::Timeout),
            };

        info!(url = %endpoint, status = %response.status(), "matchmaking connection open");
        Ok(Self::from_stream(stream))
    }

    /// Use a stream whose handshake has already completed.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl MatchmakingConnection for WebSocketConnection {
    async fn send(&mut self, message: MatchmakingClientMessage) -> Result<()> {
        if self.closed {
            return Err(SessionJoinError::TransportClosed);
        }
        let frame = serde_json::to_string(&message)?;
        trace!(?message, "sending matchmaking message");
        self.stream
            .send(Message::Text(frame.into()))
            .await
            .map_err(|e| SessionJoinError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<MatchmakingServerMessage>> {
        loop {
            let frame = match self.stream.next().await? {
                Ok(frame) => frame,
                Err(e) => return Some(Err(SessionJoinError::TransportReceive(e.to_string()))),
            };

            let decoded: serde_json::Result<MatchmakingServerMessage> = match frame {
                Message::Text(text) => serde_json::from_str(text.as_str()),
                Message::Binary(bytes) => serde_json::from_slice(&bytes),
                Message::Close(close) => {
                    debug!(?close, "matchmaking service closed the connection");
                    self.closed = true;
                    return None;
                }
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
            };
            return Some(decoded.map_err(SessionJoinError::from));
        }
    }

    async fn close(&mut self) -> Result<()> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(SessionJoinError::TransportSend(e.to_string())),
        }
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
    use crate::matchmaking::Matchmaking;
    use tokio::net::TcpListener;
    use tokio_tungstenite::WebSocketStream;

    const DEADLINE: Duration = Duration::from_secs(2);

    /// Serve one WebSocket connection on a local port with `script`.
    async fn serve_once<F, Fut>(script: F) -> String
    where
        F: FnOnce(WebSocketStream<tokio::net::TcpStream>) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            script(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn unparseable_url_is_refused() {
        let err = WebSocketConnection::connect("not a url", DEADLINE)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionJoinError::Connect { .. }));
    }

    #[tokio::test]
    async fn http_scheme_is_refused() {
        let err = WebSocketConnection::connect("https://match.example.com/ws", DEADLINE)
            .await
            .unwrap_err();
        match err {
            SessionJoinError::Connect { url, reason } => {
                assert_eq!(url, "https://match.example.com/ws");
                assert!(reason.contains("https"));
            }
            other => panic!("expected Connect, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn slow_handshake_times_out() {
        // Accepts TCP but never answers the upgrade request.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (_tcp, _) = listener.accept().await.unwrap();
            std::future::pending::<()>().await;
        });

        let err = WebSocketConnection::connect(&format!("ws://{addr}"), Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionJoinError::Timeout));
    }

    #[tokio::test]
    async fn binary_and_text_frames_both_decode() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Binary(br#"{"type":"Started"}"#.to_vec().into()))
                .await
                .unwrap();
            ws.send(Message::Text(
                r#"{"type":"ParticipantLeft","data":{"id":"9"}}"#.into(),
            ))
            .await
            .unwrap();
            ws.send(Message::Text("garbage".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut connection = WebSocketConnection::connect(&url, DEADLINE).await.unwrap();
        assert_eq!(
            connection.recv().await.unwrap().unwrap(),
            MatchmakingServerMessage::Started
        );
        assert_eq!(
            connection.recv().await.unwrap().unwrap(),
            MatchmakingServerMessage::ParticipantLeft { id: "9".into() }
        );
        assert!(matches!(
            connection.recv().await.unwrap(),
            Err(SessionJoinError::Serialization(_))
        ));
        assert!(connection.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let url = serve_once(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
            .await;

        let mut connection = WebSocketConnection::connect(&url, DEADLINE).await.unwrap();
        connection.close().await.unwrap();
        connection.close().await.unwrap();

        let err = connection
            .send(MatchmakingClientMessage::Begin)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionJoinError::TransportClosed));
    }

    #[tokio::test]
    async fn matchmaking_over_websocket() {
        let url = serve_once(|mut ws| async move {
            // Wait for Begin, then announce one participant.
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                assert_eq!(text.as_str(), r#"{"type":"Begin"}"#);
            }
            ws.send(Message::Text(
                r#"{"type":"ParticipantJoined","data":{"id":"42","profile":{"name":"Ana"},"is_self":true}}"#
                    .into(),
            ))
            .await
            .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut matchmaking = WebSocketMatchmaking::connect(&url, DEADLINE).await.unwrap();
        matchmaking.begin().await.unwrap();

        let join = matchmaking.next_join().await.unwrap();
        assert_eq!(join.id.as_deref(), Some("42"));
        assert!(join.is_self);
        assert!(matchmaking.next_join().await.is_none());
        matchmaking.end().await.unwrap();
    }
}
