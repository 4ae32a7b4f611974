//! Session configuration.

use std::time::Duration;

use url::Url;

use crate::channel::DEFAULT_CONTAINER_ID;
use crate::protocol::{Feature, Role, DEFAULT_FEATURES};
use crate::session::DEFAULT_SESSION_MARKER;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Default deadline for the credential exchange.
const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for a session.
///
/// `location` and `credential_endpoint` are required; everything else has a
/// default matching the reference behavior (host role, `r=` marker, empty
/// passcode, video and audio).
///
/// # Example
///
/// ```
/// use session_join::config::SessionConfig;
/// use session_join::protocol::Role;
/// use std::time::Duration;
///
/// let endpoint = url::Url::parse("https://auth.example.com/signature").unwrap();
/// let config = SessionConfig::new("https://play.example.com/#r=room1", endpoint)
///     .with_role(Role::Attendee)
///     .with_fetch_timeout(Duration::from_secs(3));
/// assert_eq!(config.role, Role::Attendee);
/// assert_eq!(config.session_marker, "r=");
/// ```
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Addressable location of this client; the session id is read from its fragment.
    pub location: String,
    /// Endpoint of the credential authority.
    pub credential_endpoint: Url,
    /// Role requested for the credential. Defaults to [`Role::Host`].
    pub role: Role,
    /// Marker preceding the session id in the fragment. Defaults to `"r="`.
    pub session_marker: String,
    /// Container element the channel widget mounts into.
    pub container_id: String,
    /// Session passcode. Empty by default.
    pub passcode: String,
    /// Media features to enable. Defaults to video and audio.
    pub features: Vec<Feature>,
    /// Deadline for one credential exchange. Defaults to **10 seconds**.
    pub fetch_timeout: Duration,
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events are dropped with a warning so
    /// the session loop never blocks. The final `Stopped` event is always
    /// delivered. Defaults to **256**; values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`SessionClient::shutdown`](crate::client::SessionClient::shutdown)
    /// waits for the loop before aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
}

impl SessionConfig {
    /// Create a configuration with the required fields and default values.
    pub fn new(location: impl Into<String>, credential_endpoint: Url) -> Self {
        Self {
            location: location.into(),
            credential_endpoint,
            role: Role::default(),
            session_marker: DEFAULT_SESSION_MARKER.to_string(),
            container_id: DEFAULT_CONTAINER_ID.to_string(),
            passcode: String::new(),
            features: DEFAULT_FEATURES.to_vec(),
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the role requested for the credential.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Set the marker that precedes the session id in the fragment.
    #[must_use]
    pub fn with_session_marker(mut self, marker: impl Into<String>) -> Self {
        self.session_marker = marker.into();
        self
    }

    /// Set the container element the channel widget mounts into.
    #[must_use]
    pub fn with_container_id(mut self, container_id: impl Into<String>) -> Self {
        self.container_id = container_id.into();
        self
    }

    /// Set the session passcode.
    #[must_use]
    pub fn with_passcode(mut self, passcode: impl Into<String>) -> Self {
        self.passcode = passcode.into();
        self
    }

    /// Replace the requested media features.
    #[must_use]
    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.features = features.into_iter().collect();
        self
    }

    /// Set the credential exchange deadline.
    #[must_use]
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Set the capacity of the bounded event channel (clamped to at least 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        Url::parse("https://auth.example.com/signature").unwrap()
    }

    #[test]
    fn defaults() {
        let config = SessionConfig::new("https://play.example.com/#r=room1", endpoint());
        assert_eq!(config.role, Role::Host);
        assert_eq!(config.session_marker, "r=");
        assert_eq!(config.container_id, "sessionContainer");
        assert!(config.passcode.is_empty());
        assert_eq!(config.features, vec![Feature::Video, Feature::Audio]);
        assert_eq!(config.fetch_timeout, Duration::from_secs(10));
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn builder_methods() {
        let config = SessionConfig::new("https://play.example.com/#room=x", endpoint())
            .with_session_marker("room=")
            .with_container_id("call")
            .with_passcode("1234")
            .with_features([Feature::Audio])
            .with_shutdown_timeout(Duration::from_millis(5));
        assert_eq!(config.session_marker, "room=");
        assert_eq!(config.container_id, "call");
        assert_eq!(config.passcode, "1234");
        assert_eq!(config.features, vec![Feature::Audio]);
        assert_eq!(config.shutdown_timeout, Duration::from_millis(5));
    }

    #[test]
    fn event_channel_capacity_is_clamped_to_one() {
        let config = SessionConfig::new("https://x.test/#r=a", endpoint())
            .with_event_channel_capacity(0);
        assert_eq!(config.event_channel_capacity, 1);
    }
}
