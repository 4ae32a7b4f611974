//! Wire types exchanged with the session's external collaborators.
//!
//! - the credential authority (JSON over HTTP POST),
//! - the matchmaking service (adjacently tagged JSON text messages),
//! - the communication channel (the open request handed to the video widget).

use std::fmt;

use serde::{Deserialize, Serialize};

// ── Type aliases ────────────────────────────────────────────────────

/// Opaque stable identifier assigned to a participant by the matchmaking layer.
pub type ParticipantId = String;

// ── Enums ───────────────────────────────────────────────────────────

/// Role requested when exchanging a join credential.
///
/// Serialized as its integer value (`0` = attendee, `1` = host).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Role {
    /// Joins the channel as a regular attendee.
    Attendee,
    /// Joins the channel with host privileges.
    #[default]
    Host,
}

impl From<Role> for u8 {
    fn from(role: Role) -> Self {
        match role {
            Role::Attendee => 0,
            Role::Host => 1,
        }
    }
}

impl TryFrom<u8> for Role {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Role::Attendee),
            1 => Ok(Role::Host),
            other => Err(format!("unknown role {other}")),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Attendee => f.write_str("attendee"),
            Role::Host => f.write_str("host"),
        }
    }
}

/// Media features requested from the communication channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    /// Camera video.
    Video,
    /// Microphone audio.
    Audio,
    /// Screen sharing.
    Share,
    /// Text chat.
    Chat,
}

/// Features requested when no override is configured.
pub const DEFAULT_FEATURES: [Feature; 2] = [Feature::Video, Feature::Audio];

// ── Credential authority ────────────────────────────────────────────

/// Body of the credential request POSTed to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequest {
    /// Session the credential is scoped to.
    pub session_name: String,
    /// Role the credential grants.
    pub role: Role,
}

/// Response returned by the credential authority.
///
/// Only `signature` is read; any other fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialResponse {
    /// Signed credential; absent or empty when the authority refused.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

// ── Communication channel ───────────────────────────────────────────

/// Parameters handed to the communication channel when it is opened.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOpenRequest {
    /// Signed join credential.
    pub credential: String,
    /// Session to join; equal to the derived session identifier.
    pub session_name: String,
    /// Display name shown for the local client.
    pub user_name: String,
    /// Session passcode (empty unless configured).
    pub passcode: String,
    /// Media features to enable.
    pub features: Vec<Feature>,
}

impl fmt::Debug for ChannelOpenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelOpenRequest")
            .field("credential", &"<redacted>")
            .field("session_name", &self.session_name)
            .field("user_name", &self.user_name)
            .field("passcode", &"<redacted>")
            .field("features", &self.features)
            .finish()
    }
}

// ── Matchmaking ─────────────────────────────────────────────────────

/// Public profile of a participant, resolved at join time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Human-readable display name.
    pub name: String,
}

/// Messages sent from the client to the matchmaking service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MatchmakingClientMessage {
    /// Start matchmaking for this client. Sent once per process.
    Begin,
}

/// Messages sent from the matchmaking service to the client.
///
/// Join fields are optional on the wire so that incomplete notifications
/// decode and can be rejected by the presence tracker with a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum MatchmakingServerMessage {
    /// Matchmaking acknowledged the begin request.
    Started,
    /// A participant connected to the session.
    ParticipantJoined {
        /// Stable identifier assigned by matchmaking.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<ParticipantId>,
        /// Profile the display name is resolved from.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        profile: Option<Profile>,
        /// `true` when the participant is this client.
        #[serde(default)]
        is_self: bool,
    },
    /// A participant disconnected from the session.
    ParticipantLeft {
        /// Participant that disconnected.
        id: ParticipantId,
    },
    /// The matchmaking service reported an error.
    Error {
        /// Description from the service.
        message: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_as_integer() {
        assert_eq!(serde_json::to_string(&Role::Host).unwrap(), "1");
        assert_eq!(serde_json::to_string(&Role::Attendee).unwrap(), "0");
        assert_eq!(serde_json::from_str::<Role>("1").unwrap(), Role::Host);
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!(serde_json::from_str::<Role>("7").is_err());
    }

    #[test]
    fn default_role_is_host() {
        assert_eq!(Role::default(), Role::Host);
    }

    #[test]
    fn channel_request_debug_hides_credential() {
        let request = ChannelOpenRequest {
            credential: "secret-token".into(),
            session_name: "room1".into(),
            user_name: "Ana".into(),
            passcode: String::new(),
            features: DEFAULT_FEATURES.to_vec(),
        };
        let debug = format!("{request:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("room1"));
    }
}
