//! Error types for the session-join orchestrator.
//!
//! Each component resolves its failures into one of the typed errors below.
//! None of them is fatal to the process: the orchestrator logs the failure and
//! halts only the workflow step it belongs to.

use thiserror::Error;

/// The session identifier could not be derived from the configured location.
///
/// Fatal to the join attempt that hit it; the channel gate is never touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// The location is not a parseable absolute URL.
    #[error("invalid location: {0}")]
    InvalidLocation(#[from] url::ParseError),

    /// The location has no fragment component.
    #[error("location has no fragment")]
    MissingFragment,

    /// The fragment does not start with the session marker.
    #[error("location fragment does not start with marker {marker:?}")]
    MissingMarker {
        /// The marker that was expected at the start of the fragment.
        marker: String,
    },

    /// The marker is present but nothing follows it.
    #[error("session identifier is empty")]
    EmptySessionId,
}

/// The credential exchange with the remote authority failed.
///
/// Terminal for the channel-open workflow: the gate stays spent and no retry
/// is attempted.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The request could not be sent or the response body could not be read.
    #[error("credential request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authority answered with a non-success status.
    #[error("credential authority returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// The response body is not valid JSON of the expected shape.
    #[error("malformed credential response: {0}")]
    Decode(#[from] serde_json::Error),

    /// The response decoded but carries no `signature` field.
    #[error("credential response has no signature")]
    MissingSignature,

    /// The authority did not answer within the configured fetch timeout.
    #[error("credential fetch timed out")]
    TimedOut,

    /// The fetch task ended without producing a result.
    #[error("credential fetch interrupted: {0}")]
    Interrupted(String),
}

/// A join notification lacked a field the presence tracker requires.
///
/// Dropped with a diagnostic; never propagated past the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedNotification {
    /// The notification carries no participant id.
    #[error("join notification has no participant id")]
    MissingId,

    /// The notification carries no profile to resolve a display name from.
    #[error("join notification for {id} has no profile")]
    MissingProfile {
        /// Id of the participant whose profile is missing.
        id: String,
    },
}

/// Errors that can occur while running a session.
#[derive(Debug, Error)]
pub enum SessionJoinError {
    /// The session identifier could not be derived.
    #[error("configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The credential exchange failed.
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// A presence notification was missing required fields.
    #[error("malformed notification: {0}")]
    MalformedNotification(#[from] MalformedNotification),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The communication channel refused to open.
    #[error("channel error: {0}")]
    Channel(String),

    /// A join was handled before matchmaking began.
    #[error("session has not been started")]
    NotStarted,

    /// The session loop has already exited.
    #[error("session is not running")]
    NotRunning,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// The matchmaking connection could not be opened.
    #[error("cannot connect to {url}: {reason}")]
    Connect {
        /// Address that was dialled.
        url: String,
        /// Why the connection was refused.
        reason: String,
    },
}

/// A specialized [`Result`] type for session-join operations.
pub type Result<T> = std::result::Result<T, SessionJoinError>;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn missing_marker_display_names_marker() {
        let err = ConfigurationError::MissingMarker {
            marker: "r=".into(),
        };
        assert_eq!(
            err.to_string(),
            "location fragment does not start with marker \"r=\""
        );
    }

    #[test]
    fn status_error_display() {
        let err = FetchError::Status {
            status: 401,
            message: "bad key".into(),
        };
        assert_eq!(
            err.to_string(),
            "credential authority returned 401: bad key"
        );
    }

    #[test]
    fn configuration_error_converts_into_session_error() {
        let err = SessionJoinError::from(ConfigurationError::EmptySessionId);
        assert!(matches!(
            err,
            SessionJoinError::Configuration(ConfigurationError::EmptySessionId)
        ));
        assert!(err.to_string().contains("session identifier is empty"));
    }

    #[test]
    fn url_parse_error_converts_into_configuration_error() {
        let parse_err = url::Url::parse("no scheme here").unwrap_err();
        let err = ConfigurationError::from(parse_err);
        assert!(matches!(err, ConfigurationError::InvalidLocation(_)));
    }

    #[test]
    fn connect_error_names_address() {
        let err = SessionJoinError::Connect {
            url: "ws://match.test/ws".into(),
            reason: "refused".into(),
        };
        assert_eq!(err.to_string(), "cannot connect to ws://match.test/ws: refused");
    }

    #[test]
    fn malformed_profile_names_participant() {
        let err = MalformedNotification::MissingProfile { id: "p-7".into() };
        assert!(err.to_string().contains("p-7"));
    }
}
