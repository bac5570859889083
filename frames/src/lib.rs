//! Chat wire protocol: tagged events and the JSON text codec.
//!
//! This crate owns the representation exchanged with the room chat server.
//! Every frame is a JSON object with a `type` discriminator; field names are
//! camelCase on the wire. Server and client directions are separate sum types
//! so adding an event kind is a compile-time-visible change at every match.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Close code for a normal, user-requested disconnect. Suppresses reconnect.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code reported when the peer sent a close frame without a status.
pub const CLOSE_NO_STATUS: u16 = 1005;
/// Close code reported when the connection dropped without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Error returned by the decode functions.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text was not valid JSON or did not match any known event shape.
    #[error("failed to decode chat frame: {0}")]
    Decode(#[from] serde_json::Error),
}

// =============================================================================
// SERVER -> CLIENT
// =============================================================================

/// Event pushed by the chat server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    /// A chat message broadcast to the room (including the sender's echo).
    #[serde(rename = "message")]
    Message(MessageEvent),
    /// A participant joined or left.
    #[serde(rename = "presence")]
    Presence(PresenceEvent),
    /// First response after a successful join; reveals the caller's identity.
    #[serde(rename = "join-ack")]
    JoinAck(JoinAckEvent),
    /// Application-level error reported by the server.
    #[serde(rename = "error")]
    Error(ErrorEvent),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEvent {
    pub room_id: String,
    pub message_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub text: String,
    /// Server receive time. Written as RFC 3339; read as any ISO-8601
    /// date-time, with offset-less values taken as UTC.
    #[serde(with = "sent_at")]
    pub sent_at: OffsetDateTime,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceAction {
    Join,
    Leave,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceEvent {
    pub action: PresenceAction,
    pub room_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Authoritative online member count after this change.
    pub members: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinAckEvent {
    pub room_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub members: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEvent {
    pub code: String,
    pub message: String,
}

// =============================================================================
// CLIENT -> SERVER
// =============================================================================

/// Event sent by the chat client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ClientEvent {
    /// New chat message. `message_id` is generated client-side.
    Message {
        #[serde(rename = "messageId")]
        message_id: String,
        text: String,
    },
    /// Typing indicator toggle. Fire-and-forget.
    Typing {
        #[serde(rename = "isTyping")]
        is_typing: bool,
    },
}

// =============================================================================
// TIMESTAMPS
// =============================================================================

/// `sentAt` codec. Chat servers differ in how they render timestamps
/// (`...Z`, `+00:00`, or naive `isoformat()` output), so decoding accepts
/// RFC 3339 first, then ISO-8601 with an offset, then ISO-8601 without one
/// (assumed UTC).
mod sent_at {
    use serde::{Deserialize, Deserializer, Serializer};
    use time::format_description::well_known::{Iso8601, Rfc3339};
    use time::{OffsetDateTime, PrimitiveDateTime};

    pub fn serialize<S: Serializer>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error> {
        time::serde::rfc3339::serialize(value, serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<OffsetDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(raw.trim()).ok_or_else(|| serde::de::Error::custom(format!("invalid ISO-8601 timestamp '{raw}'")))
    }

    fn parse(raw: &str) -> Option<OffsetDateTime> {
        if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
            return Some(ts);
        }
        if let Ok(ts) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
            return Some(ts);
        }
        match PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT) {
            Ok(naive) => Some(naive.assume_utc()),
            Err(_) => None,
        }
    }
}

// =============================================================================
// CODEC
// =============================================================================

/// Encode a client event as a JSON text frame.
#[must_use]
pub fn encode_client_event(event: &ClientEvent) -> String {
    // Serializing a derived enum of strings and bools into a String cannot fail.
    serde_json::to_string(event).unwrap_or_default()
}

/// Decode a JSON text frame received from the server.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON, unknown `type` tags,
/// missing required fields, or an unparseable `sentAt`.
pub fn decode_server_event(text: &str) -> Result<ServerEvent, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a server event as a JSON text frame.
///
/// Used by test servers and tooling that speak the server side.
#[must_use]
pub fn encode_server_event(event: &ServerEvent) -> String {
    serde_json::to_string(event).unwrap_or_default()
}

/// Decode a JSON text frame sent by a client.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] when the text is not a known client event.
pub fn decode_client_event(text: &str) -> Result<ClientEvent, CodecError> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
