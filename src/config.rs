//! Chat client configuration parsed from environment variables.

use std::time::Duration;

use crate::reconnect::{
    DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_MS, DEFAULT_RECONNECT_MAX_MS, ReconnectPolicy,
};
use crate::token::TokenPolicy;
use crate::typing::DEFAULT_TYPING_IDLE_MS;

pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/chat";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid websocket URL '{url}': {reason}")]
    InvalidWsUrl { url: String, reason: String },
    #[error("invalid boolean for {var}: '{value}'")]
    InvalidBool { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    /// Chat endpoint without query string, e.g. `ws://host/ws/chat`.
    pub ws_url: String,
    /// Auth service base URL for session lookup. `None` disables lookup.
    pub auth_base_url: Option<String>,
    pub reconnect: ReconnectPolicy,
    pub typing_idle: Duration,
    pub tokens: TokenPolicy,
}

impl ChatConfig {
    /// Config with defaults for everything but the endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWsUrl`] unless `ws_url` is an absolute
    /// `ws://` or `wss://` URL.
    pub fn new(ws_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            ws_url: validate_ws_url(ws_url)?,
            auth_base_url: None,
            reconnect: ReconnectPolicy::default(),
            typing_idle: Duration::from_millis(DEFAULT_TYPING_IDLE_MS),
            tokens: TokenPolicy::default(),
        })
    }

    /// Replace the endpoint, keeping every other setting.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidWsUrl`] for the same reasons as [`ChatConfig::new`].
    pub fn with_ws_url(self, ws_url: &str) -> Result<Self, ConfigError> {
        Ok(Self { ws_url: validate_ws_url(ws_url)?, ..self })
    }

    /// Build typed chat config from environment variables.
    ///
    /// Optional:
    /// - `CHAT_WS_URL`: default `ws://localhost:8000/ws/chat`
    /// - `CHAT_AUTH_BASE_URL`: enables HTTP session lookup
    /// - `CHAT_MAX_RECONNECT_ATTEMPTS`: default 5
    /// - `CHAT_RECONNECT_BASE_MS`: default 1000
    /// - `CHAT_RECONNECT_MAX_MS`: default 10000
    /// - `CHAT_TYPING_IDLE_MS`: default 2000
    /// - `CHAT_SYNTHESIZE_TOKENS`: default true
    /// - `CHAT_TOKEN_FALLBACK_ON_ERROR`: default false
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for a malformed URL or boolean. Unparseable
    /// numbers fall back to their defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let ws_url = std::env::var("CHAT_WS_URL").unwrap_or_else(|_| DEFAULT_WS_URL.to_owned());
        let auth_base_url = std::env::var("CHAT_AUTH_BASE_URL")
            .map(|v| v.trim().trim_end_matches('/').to_owned())
            .unwrap_or_default();
        let auth_base_url = (!auth_base_url.is_empty()).then_some(auth_base_url);

        let reconnect = ReconnectPolicy {
            max_attempts: env_parse("CHAT_MAX_RECONNECT_ATTEMPTS", DEFAULT_MAX_RECONNECT_ATTEMPTS),
            base_delay: Duration::from_millis(env_parse("CHAT_RECONNECT_BASE_MS", DEFAULT_RECONNECT_BASE_MS)),
            max_delay: Duration::from_millis(env_parse("CHAT_RECONNECT_MAX_MS", DEFAULT_RECONNECT_MAX_MS)),
        };
        let typing_idle = Duration::from_millis(env_parse("CHAT_TYPING_IDLE_MS", DEFAULT_TYPING_IDLE_MS));

        let defaults = TokenPolicy::default();
        let tokens = TokenPolicy {
            synthesize_placeholders: env_bool("CHAT_SYNTHESIZE_TOKENS", defaults.synthesize_placeholders)?,
            fallback_on_lookup_error: env_bool("CHAT_TOKEN_FALLBACK_ON_ERROR", defaults.fallback_on_lookup_error)?,
        };

        Ok(Self { ws_url: validate_ws_url(&ws_url)?, auth_base_url, reconnect, typing_idle, tokens })
    }
}

fn validate_ws_url(raw: &str) -> Result<String, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidWsUrl { url: raw.to_owned(), reason };
    let parsed = url::Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed.to_string()),
        other => Err(invalid(format!("unsupported scheme '{other}'"))),
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match std::env::var(key) {
        Ok(v) => v.trim().parse::<T>().unwrap_or(default),
        Err(_) => default,
    }
}

fn env_bool(key: &'static str, default: bool) -> Result<bool, ConfigError> {
    let Ok(raw) = std::env::var(key) else {
        return Ok(default);
    };
    parse_bool(&raw).ok_or(ConfigError::InvalidBool { var: key, value: raw })
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
