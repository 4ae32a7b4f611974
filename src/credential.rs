//! Credential exchange with the remote authority.
//!
//! Before the communication channel may be opened, the client trades the
//! session name and its role for a short-lived signed credential. The
//! [`CredentialAuthority`] trait is the seam; [`HttpCredentialFetcher`] is the
//! production implementation that POSTs `{sessionName, role}` as JSON and reads
//! the `signature` field of the response.
//!
//! Fetching is stateless: every call performs exactly one round-trip and
//! nothing is cached, so a credential is never reused across sessions.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::config::SessionConfig;
use crate::error::FetchError;
use crate::protocol::{CredentialRequest, CredentialResponse, Role};
use crate::session::SessionId;

/// Time-boxed credential authorizing the client to open the channel.
///
/// The token is opaque to this crate; its expiry is the authority's policy.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    token: String,
    session_id: SessionId,
    role: Role,
}

impl Credential {
    /// Bundle a signed token with the session and role it was issued for.
    pub fn new(token: impl Into<String>, session_id: SessionId, role: Role) -> Self {
        Self {
            token: token.into(),
            session_id,
            role,
        }
    }

    /// The raw signed token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Session the credential was issued for.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Role the credential grants.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Consume the credential, returning the raw token.
    pub fn into_token(self) -> String {
        self.token
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("session_id", &self.session_id)
            .field("role", &self.role)
            .finish()
    }
}

/// A remote authority that issues join credentials.
///
/// Implementations must not retry internally; retry policy belongs to the
/// caller. The trait is object-safe, so `Arc<dyn CredentialAuthority>` works.
#[async_trait]
pub trait CredentialAuthority: Send + Sync + 'static {
    /// Exchange `session_id` and `role` for a fresh credential.
    ///
    /// # Errors
    ///
    /// Returns a [`FetchError`] on transport failure, non-success status,
    /// undecodable body, or a response without a signature.
    async fn fetch_credential(
        &self,
        session_id: &SessionId,
        role: Role,
    ) -> Result<Credential, FetchError>;
}

/// [`CredentialAuthority`] backed by an HTTP(S) endpoint.
#[derive(Debug, Clone)]
pub struct HttpCredentialFetcher {
    client: reqwest::Client,
    endpoint: Url,
}

impl HttpCredentialFetcher {
    /// Create a fetcher that POSTs to `endpoint` with a per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] if the HTTP client cannot be built
    /// (e.g. the TLS backend fails to initialize).
    pub fn new(endpoint: Url, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint })
    }

    /// Create a fetcher for the endpoint and fetch timeout of `config`.
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn from_config(config: &SessionConfig) -> Result<Self, FetchError> {
        Self::new(config.credential_endpoint.clone(), config.fetch_timeout)
    }

    /// Create a fetcher around an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, endpoint: Url) -> Self {
        Self { client, endpoint }
    }

    /// The endpoint credentials are requested from.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl CredentialAuthority for HttpCredentialFetcher {
    #[tracing::instrument(skip_all, fields(session = %session_id, role = %role))]
    async fn fetch_credential(
        &self,
        session_id: &SessionId,
        role: Role,
    ) -> Result<Credential, FetchError> {
        let body = CredentialRequest {
            session_name: session_id.to_string(),
            role,
        };

        debug!(endpoint = %self.endpoint, "requesting join credential");
        let resp = self
            .client
            .post(self.endpoint.clone())
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), "credential authority rejected request");
            return Err(FetchError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let text = resp.text().await?;
        let payload: CredentialResponse = serde_json::from_str(&text)?;
        let token = payload
            .signature
            .filter(|signature| !signature.is_empty())
            .ok_or(FetchError::MissingSignature)?;

        debug!("join credential issued");
        Ok(Credential::new(token, session_id.clone(), role))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn room1() -> SessionId {
        SessionId::new("room1").unwrap()
    }

    async fn fetcher_for(server: &MockServer) -> HttpCredentialFetcher {
        let endpoint = Url::parse(&format!("{}/signature", server.uri())).unwrap();
        HttpCredentialFetcher::new(endpoint, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn returns_signature_from_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/signature"))
            .and(header("content-type", "application/json"))
            .and(body_json(serde_json::json!({ "sessionName": "room1", "role": 1 })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "signature": "T" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        let credential = fetcher.fetch_credential(&room1(), Role::Host).await.unwrap();

        assert_eq!(credential.token(), "T");
        assert_eq!(credential.session_id().as_str(), "room1");
        assert_eq!(credential.role(), Role::Host);
    }

    #[tokio::test]
    async fn attendee_role_is_sent_as_zero() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_json(serde_json::json!({ "sessionName": "room1", "role": 0 })))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "signature": "A" })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        let credential = fetcher
            .fetch_credential(&room1(), Role::Attendee)
            .await
            .unwrap();
        assert_eq!(credential.into_token(), "A");
    }

    #[tokio::test]
    async fn missing_signature_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "token": "T" })),
            )
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        let err = fetcher
            .fetch_credential(&room1(), Role::Host)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::MissingSignature));
    }

    #[tokio::test]
    async fn non_json_body_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        let err = fetcher
            .fetch_credential(&room1(), Role::Host)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .expect(1)
            .mount(&server)
            .await;

        let fetcher = fetcher_for(&server).await;
        let err = fetcher
            .fetch_credential(&room1(), Role::Host)
            .await
            .unwrap_err();
        match err {
            FetchError::Status { status, message } => {
                assert_eq!(status, 403);
                assert_eq!(message, "forbidden");
            }
            other => panic!("expected Status, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_transport_error() {
        let endpoint = Url::parse("http://127.0.0.1:1/signature").unwrap();
        let fetcher = HttpCredentialFetcher::new(endpoint, Duration::from_secs(2)).unwrap();
        let err = fetcher
            .fetch_credential(&room1(), Role::Host)
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }

    #[test]
    fn from_config_uses_configured_endpoint() {
        let endpoint = Url::parse("https://auth.example.com/signature").unwrap();
        let config = SessionConfig::new("https://play.test/#r=room1", endpoint.clone());
        let fetcher = HttpCredentialFetcher::from_config(&config).unwrap();
        assert_eq!(fetcher.endpoint(), &endpoint);
    }

    #[test]
    fn credential_debug_hides_token() {
        let credential = Credential::new("very-secret", room1(), Role::Host);
        let debug = format!("{credential:?}");
        assert!(!debug.contains("very-secret"));
        assert!(debug.contains("room1"));
    }
}
