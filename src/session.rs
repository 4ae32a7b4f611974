//! Session identifier derivation.
//!
//! The session a client joins is named by its addressable location: the
//! identifier is whatever follows a fixed marker at the start of the URL
//! fragment, e.g. `https://play.example.com/#r=abcd1234` names `abcd1234`.

use std::fmt;

use url::Url;

use crate::error::ConfigurationError;

/// Marker preceding the session identifier in the location fragment.
pub const DEFAULT_SESSION_MARKER: &str = "r=";

/// Non-empty identifier naming a shared interactive session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::EmptySessionId`] if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, ConfigurationError> {
        let id = id.into();
        if id.is_empty() {
            return Err(ConfigurationError::EmptySessionId);
        }
        Ok(Self(id))
    }

    /// Extract the session identifier from `location`.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::InvalidLocation`] if `location` is not an absolute URL.
    /// - [`ConfigurationError::MissingFragment`] if it has no (or an empty) fragment.
    /// - [`ConfigurationError::MissingMarker`] if the fragment does not start with `marker`.
    /// - [`ConfigurationError::EmptySessionId`] if nothing follows the marker.
    pub fn from_location(location: &str, marker: &str) -> Result<Self, ConfigurationError> {
        let url = Url::parse(location)?;
        let fragment = url
            .fragment()
            .filter(|fragment| !fragment.is_empty())
            .ok_or(ConfigurationError::MissingFragment)?;
        let id = fragment
            .strip_prefix(marker)
            .ok_or_else(|| ConfigurationError::MissingMarker {
                marker: marker.to_string(),
            })?;
        Self::new(id)
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}
