//! Session collaborators consumed by the token provider.
//!
//! The auth service itself is external. This module only defines the two
//! read-only seams the chat client needs (who is signed in, and whether a
//! bearer token was persisted) plus production and no-op implementations.

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The session request could not be sent or its body could not be read.
    #[error("session request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The auth service answered with a non-success status.
    #[error("session lookup returned status {0}")]
    Status(u16),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Session {
    pub user: SessionUser,
    #[serde(default)]
    pub session: Option<SessionRecord>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionUser {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// Server-side session row. Only the token is of interest here.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub token: Option<String>,
}

// =============================================================================
// SEAMS
// =============================================================================

/// Read the current user session from the auth collaborator.
#[async_trait::async_trait]
pub trait SessionLookup: Send + Sync {
    async fn current_session(&self) -> Result<Option<Session>, SessionError>;
}

/// Read a previously persisted bearer token.
pub trait TokenCache: Send + Sync {
    fn cached_token(&self) -> Option<String>;
}

// =============================================================================
// IMPLEMENTATIONS
// =============================================================================

/// Session lookup against the auth service's `get-session` endpoint.
pub struct HttpSessionLookup {
    client: reqwest::Client,
    url: String,
    bearer: Option<String>,
}

impl HttpSessionLookup {
    /// `base_url` is the auth service origin, e.g. `http://localhost:3000`.
    /// `bearer` is sent as `Authorization: Bearer <token>`.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, bearer: Option<String>) -> Result<Self, SessionError> {
        Self::with_timeout(base_url, bearer, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    /// Like [`HttpSessionLookup::new`] with an explicit whole-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Http`] if the HTTP client cannot be built.
    pub fn with_timeout(base_url: &str, bearer: Option<String>, timeout: Duration) -> Result<Self, SessionError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS).min(timeout))
            .build()?;
        Ok(Self {
            client,
            url: format!("{}/api/auth/get-session", base_url.trim_end_matches('/')),
            bearer: bearer.filter(|t| !t.trim().is_empty()),
        })
    }
}

#[async_trait::async_trait]
impl SessionLookup for HttpSessionLookup {
    async fn current_session(&self) -> Result<Option<Session>, SessionError> {
        let request = self.client.get(&self.url);
        let request = match &self.bearer {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(SessionError::Status(status.as_u16()));
        }

        // The endpoint answers `null` when nobody is signed in.
        let session = response.json::<Option<Session>>().await?;
        debug!(signed_in = session.is_some(), "chat: session lookup complete");
        Ok(session)
    }
}

/// Lookup for contexts without an auth service: always anonymous.
pub struct NoSession;

#[async_trait::async_trait]
impl SessionLookup for NoSession {
    async fn current_session(&self) -> Result<Option<Session>, SessionError> {
        Ok(None)
    }
}

/// Token cache backed by a value fixed at construction (flag or env var).
#[derive(Debug, Clone, Default)]
pub struct StaticTokenCache(Option<String>);

impl StaticTokenCache {
    #[must_use]
    pub fn new(token: Option<String>) -> Self {
        Self(token.filter(|t| !t.trim().is_empty()))
    }
}

impl TokenCache for StaticTokenCache {
    fn cached_token(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
