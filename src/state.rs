//! Chat panel state: messages, participants, presence counters.
//!
//! DESIGN
//! ======
//! `ChatState` is the snapshot the UI layer renders. It is owned and mutated
//! only by the connection manager; inbound server events are folded in via
//! [`ChatState::apply_server_event`], which matches exhaustively on the
//! wire enum.
//!
//! INVARIANTS
//! ==========
//! - `messages` is in arrival order and only grows.
//! - `participants` holds at most one entry per `user_id`; a leave marks the
//!   entry offline instead of removing it.
//! - `member_count` is the server's number and is never derived locally.

use frames::{ErrorEvent, JoinAckEvent, MessageEvent, PresenceAction, PresenceEvent, ServerEvent};
use time::OffsetDateTime;
use time::macros::format_description;
use tracing::{debug, warn};

const UNKNOWN_SENDER: &str = "Unknown";

// =============================================================================
// CONNECTION STATE
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

impl ConnectionState {
    /// Status text shown next to the connection indicator.
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Disconnected => "Disconnected",
            Self::Error => "Connection Error",
        }
    }
}

// =============================================================================
// MESSAGES + PARTICIPANTS
// =============================================================================

/// A single chat message as rendered in the panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    pub timestamp: OffsetDateTime,
    /// True when the local user sent it. Resolved once `join-ack` arrives.
    pub is_own: bool,
}

impl ChatMessage {
    #[must_use]
    pub fn sender_initials(&self) -> String {
        initials(&self.sender_name)
    }

    /// `HH:MM` in the timestamp's own offset.
    #[must_use]
    pub fn time_label(&self) -> String {
        self.timestamp
            .format(format_description!("[hour]:[minute]"))
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatParticipant {
    pub user_id: String,
    pub username: String,
    pub is_online: bool,
}

impl ChatParticipant {
    #[must_use]
    pub fn initials(&self) -> String {
        initials(&self.username)
    }
}

/// First letter of each whitespace-separated word, upper-cased.
#[must_use]
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

// =============================================================================
// CHAT STATE
// =============================================================================

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChatState {
    pub connection: ConnectionState,
    pub messages: Vec<ChatMessage>,
    pub participants: Vec<ChatParticipant>,
    pub member_count: u32,
    pub error: Option<String>,
    /// Local user id as acknowledged by the server.
    pub self_user_id: Option<String>,
}

impl ChatState {
    /// Fold one inbound server event into the state.
    pub fn apply_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::Message(msg) => self.append_message(msg),
            ServerEvent::Presence(presence) => self.apply_presence(presence),
            ServerEvent::JoinAck(ack) => self.apply_join_ack(ack),
            ServerEvent::Error(error) => self.apply_error(error),
        }
    }

    #[must_use]
    pub fn participant(&self, user_id: &str) -> Option<&ChatParticipant> {
        self.participants.iter().find(|p| p.user_id == user_id)
    }

    pub fn online_participants(&self) -> impl Iterator<Item = &ChatParticipant> {
        self.participants.iter().filter(|p| p.is_online)
    }

    fn append_message(&mut self, msg: MessageEvent) {
        if msg.text.trim().is_empty() {
            warn!(message_id = %msg.message_id, "chat: dropping blank message");
            return;
        }
        let is_own = self.self_user_id.as_deref() == Some(msg.sender_id.as_str());
        self.messages.push(ChatMessage {
            id: msg.message_id,
            sender_id: msg.sender_id,
            sender_name: msg.sender_name.unwrap_or_else(|| UNKNOWN_SENDER.to_owned()),
            text: msg.text,
            timestamp: msg.sent_at,
            is_own,
        });
    }

    fn apply_presence(&mut self, presence: PresenceEvent) {
        self.member_count = presence.members;
        match presence.action {
            PresenceAction::Join => self.mark_online(presence.user_id, presence.username),
            PresenceAction::Leave => {
                if let Some(existing) = self.participants.iter_mut().find(|p| p.user_id == presence.user_id) {
                    existing.is_online = false;
                } else {
                    debug!(user_id = %presence.user_id, "chat: leave for unknown participant");
                }
            }
        }
    }

    fn apply_join_ack(&mut self, ack: JoinAckEvent) {
        self.member_count = ack.members;
        for msg in &mut self.messages {
            msg.is_own = msg.sender_id == ack.user_id;
        }
        self.self_user_id = Some(ack.user_id.clone());
        self.mark_online(ack.user_id, ack.username);
    }

    fn apply_error(&mut self, error: ErrorEvent) {
        warn!(code = %error.code, message = %error.message, "chat: server error");
        self.error = Some(error.message);
    }

    fn mark_online(&mut self, user_id: String, username: Option<String>) {
        if let Some(existing) = self.participants.iter_mut().find(|p| p.user_id == user_id) {
            existing.is_online = true;
            if let Some(name) = username {
                existing.username = name;
            }
        } else {
            self.participants.push(ChatParticipant {
                user_id,
                username: username.unwrap_or_else(|| UNKNOWN_SENDER.to_owned()),
                is_online: true,
            });
        }
    }
}

#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
