//! Bearer token acquisition for the chat websocket.
//!
//! DESIGN
//! ======
//! Priority order:
//! 1. Signed in + cached token (or the session's own token) -> that token.
//! 2. Signed in, nothing cached -> placeholder token for the session user.
//! 3. Signed out -> placeholder token for a generated guest id.
//!
//! Placeholder tokens mimic a JWT (`header.payload.signature`, base64url)
//! with a fixed fake signature. They are a development stub: nothing here
//! signs anything, and the chat server is expected to reject them outside
//! dev deployments.
//!
//! ERROR HANDLING
//! ==============
//! A failed session lookup propagates as [`TokenError::SessionLookup`]
//! unless [`TokenPolicy::fallback_on_lookup_error`] is set, in which case an
//! error-tagged placeholder is returned instead.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::session::{Session, SessionError, SessionLookup, TokenCache};

const PLACEHOLDER_TTL_SECS: i64 = 3_600;
const PLACEHOLDER_SIGNATURE: &str = "dev-signature";

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("session lookup failed: {0}")]
    SessionLookup(#[from] SessionError),
    #[error("no bearer token available")]
    Unavailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenPolicy {
    /// Mint placeholder tokens when no real token exists.
    pub synthesize_placeholders: bool,
    /// Mint an error-tagged placeholder instead of failing when the session
    /// lookup itself fails.
    pub fallback_on_lookup_error: bool,
}

impl Default for TokenPolicy {
    fn default() -> Self {
        Self { synthesize_placeholders: true, fallback_on_lookup_error: false }
    }
}

/// Claims carried by a placeholder token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderClaims {
    pub sub: String,
    pub name: String,
    pub iat: i64,
    pub exp: i64,
}

impl PlaceholderClaims {
    fn issue(sub: String, name: String) -> Self {
        let iat = OffsetDateTime::now_utc().unix_timestamp();
        Self { sub, name, iat, exp: iat + PLACEHOLDER_TTL_SECS }
    }

    /// Render as `base64url(header).base64url(claims).base64url(signature)`.
    #[must_use]
    pub fn encode(&self) -> String {
        let header = serde_json::json!({ "alg": "HS256", "typ": "JWT" });
        let payload = serde_json::to_vec(self).unwrap_or_default();
        format!(
            "{}.{}.{}",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(payload),
            URL_SAFE_NO_PAD.encode(PLACEHOLDER_SIGNATURE),
        )
    }
}

pub struct TokenProvider {
    session: Arc<dyn SessionLookup>,
    cache: Arc<dyn TokenCache>,
    policy: TokenPolicy,
}

impl TokenProvider {
    #[must_use]
    pub fn new(session: Arc<dyn SessionLookup>, cache: Arc<dyn TokenCache>, policy: TokenPolicy) -> Self {
        Self { session, cache, policy }
    }

    /// Produce a non-empty bearer token for the websocket upgrade.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::SessionLookup`] when the lookup fails and the
    /// fallback is disabled, and [`TokenError::Unavailable`] when a
    /// placeholder would be needed but synthesis is disabled.
    pub async fn acquire(&self) -> Result<String, TokenError> {
        match self.session.current_session().await {
            Ok(Some(session)) => {
                if let Some(token) = self.stored_token(&session) {
                    debug!("chat: using stored bearer token");
                    return Ok(token);
                }
                let claims = PlaceholderClaims::issue(user_subject(&session), display_name(&session));
                debug!(sub = %claims.sub, "chat: minting placeholder token for session user");
                self.placeholder(claims)
            }
            Ok(None) => {
                let claims = PlaceholderClaims::issue(format!("guest-{}", Uuid::new_v4().simple()), "Guest User".to_owned());
                debug!(sub = %claims.sub, "chat: no session, minting guest token");
                self.placeholder(claims)
            }
            Err(error) if self.policy.fallback_on_lookup_error => {
                warn!(%error, "chat: session lookup failed, minting error-tagged token");
                self.placeholder(PlaceholderClaims::issue(
                    format!("error-{}", Uuid::new_v4().simple()),
                    "Error User".to_owned(),
                ))
            }
            Err(error) => Err(error.into()),
        }
    }

    fn stored_token(&self, session: &Session) -> Option<String> {
        let usable = |t: &String| !t.trim().is_empty();
        self.cache
            .cached_token()
            .filter(usable)
            .or_else(|| session.session.as_ref().and_then(|s| s.token.clone()).filter(usable))
    }

    fn placeholder(&self, claims: PlaceholderClaims) -> Result<String, TokenError> {
        if self.policy.synthesize_placeholders {
            Ok(claims.encode())
        } else {
            Err(TokenError::Unavailable)
        }
    }
}

fn user_subject(session: &Session) -> String {
    let id = session.user.id.trim();
    if id.is_empty() {
        let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
        format!("user-{millis}")
    } else {
        id.to_owned()
    }
}

fn display_name(session: &Session) -> String {
    [&session.user.name, &session.user.email]
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .unwrap_or("User")
        .to_owned()
}

#[cfg(test)]
#[path = "token_test.rs"]
mod tests;
