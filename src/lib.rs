//! Real-time room chat client for StudyRooms.
//!
//! SYSTEM CONTEXT
//! ==============
//! `manager` owns one websocket per room and its reconnect state machine,
//! `state` holds the reactive snapshot the UI renders, `token` and `session`
//! produce the bearer credential, `transport` speaks websocket, and `frames`
//! (sibling crate) defines the wire schema.

pub mod config;
pub mod manager;
pub mod reconnect;
pub mod session;
pub mod state;
pub mod token;
pub mod transport;
pub mod typing;

pub use config::{ChatConfig, ConfigError};
pub use manager::{ChatCommand, ChatConnectionManager, ChatError, ChatHandle};
pub use state::{ChatMessage, ChatParticipant, ChatState, ConnectionState};
pub use token::{TokenError, TokenPolicy, TokenProvider};
