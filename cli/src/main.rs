//! Terminal client for StudyRooms room chat.
//!
//! Drives a [`ChatConnectionManager`] the way the study-room chat panel does:
//! each stdin line is submitted as a message, and state changes published by
//! the manager are rendered as they arrive. Lines starting with `/` are
//! local commands.

use std::ops::ControlFlow;
use std::sync::Arc;

use clap::Parser;
use studyrooms_chat::session::{
    HttpSessionLookup, NoSession, Session, SessionError, SessionLookup, SessionRecord, SessionUser, StaticTokenCache,
};
use studyrooms_chat::transport::WsConnector;
use studyrooms_chat::{
    ChatConfig, ChatConnectionManager, ChatError, ChatHandle, ChatMessage, ChatState, ConfigError, ConnectionState,
    TokenProvider,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("chat manager stopped: {0}")]
    Chat(#[from] ChatError),
    #[error("stdin read failed: {0}")]
    Stdin(#[from] std::io::Error),
    #[error("chat manager task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("auth client setup failed: {0}")]
    Session(#[from] SessionError),
}

#[derive(Parser, Debug)]
#[command(name = "chat-cli", about = "StudyRooms room chat from the terminal")]
struct Cli {
    /// Room to join.
    #[arg(long, env = "CHAT_ROOM")]
    room: String,

    /// Chat endpoint; overrides `CHAT_WS_URL`.
    #[arg(long)]
    ws_url: Option<String>,

    /// Bearer token to present instead of a generated one.
    #[arg(long, env = "CHAT_TOKEN")]
    token: Option<String>,

    /// Auth service origin for session lookup; overrides `CHAT_AUTH_BASE_URL`.
    #[arg(long)]
    auth_url: Option<String>,

    /// Bearer token for the auth service's session endpoint, sent as
    /// `Authorization: Bearer <value>`.
    #[arg(long, env = "CHAT_SESSION_TOKEN")]
    session_token: Option<String>,

    /// Log at debug level instead of warn.
    #[arg(long, short, default_value_t = false)]
    verbose: bool,
}

// =============================================================================
// SESSION
// =============================================================================

/// Signed-in session that carries only an explicit `--token`, for running
/// without an auth service.
struct TokenOnlySession(String);

#[async_trait::async_trait]
impl SessionLookup for TokenOnlySession {
    async fn current_session(&self) -> Result<Option<Session>, SessionError> {
        Ok(Some(Session {
            user: SessionUser { id: String::new(), name: None, email: None },
            session: Some(SessionRecord { token: Some(self.0.clone()) }),
        }))
    }
}

fn token_provider(
    config: &ChatConfig,
    token: Option<String>,
    session_token: Option<String>,
) -> Result<TokenProvider, SessionError> {
    let session: Arc<dyn SessionLookup> = match (&config.auth_base_url, &token) {
        (Some(base), _) => Arc::new(HttpSessionLookup::new(base, session_token)?),
        (None, Some(token)) => Arc::new(TokenOnlySession(token.clone())),
        (None, None) => Arc::new(NoSession),
    };
    Ok(TokenProvider::new(session, Arc::new(StaticTokenCache::new(token)), config.tokens))
}

// =============================================================================
// MAIN
// =============================================================================

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let level = if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN };
    tracing_subscriber::fmt().with_writer(std::io::stderr).with_max_level(level).init();

    let mut config = ChatConfig::from_env()?;
    if let Some(url) = &cli.ws_url {
        config = config.with_ws_url(url)?;
    }
    if let Some(auth_url) = cli.auth_url {
        config.auth_base_url = Some(auth_url.trim_end_matches('/').to_owned());
    }

    let tokens = token_provider(&config, cli.token, cli.session_token)?;
    let manager = ChatConnectionManager::new(&config, cli.room, tokens, Arc::new(WsConnector));
    let (handle, task) = manager.spawn();
    handle.connect().await?;

    let mut updates = handle.subscribe();
    let mut view = View::default();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = updates.borrow_and_update().clone();
                for line in view.render(&state) {
                    println!("{line}");
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("stdin closed");
                    break;
                };
                if run_line(&handle, &line).await?.is_break() {
                    break;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                if let Err(error) = signal {
                    warn!(%error, "ctrl-c handler failed");
                }
                break;
            }
        }
    }

    if let Err(error) = handle.shutdown().await {
        debug!(%error, "manager already stopped");
    }
    task.await?;
    Ok(())
}

// =============================================================================
// INPUT
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Disconnect,
    Reconnect,
    Who,
    Clear,
    Unknown(String),
    Text(String),
}

fn parse_input(line: &str) -> Input {
    let trimmed = line.trim();
    match trimmed {
        "/quit" | "/exit" => Input::Quit,
        "/disconnect" => Input::Disconnect,
        "/reconnect" => Input::Reconnect,
        "/who" => Input::Who,
        "/clear" => Input::Clear,
        cmd if cmd.starts_with('/') => Input::Unknown(cmd.to_owned()),
        _ => Input::Text(line.to_owned()),
    }
}

async fn run_line(handle: &ChatHandle, line: &str) -> Result<ControlFlow<()>, ChatError> {
    match parse_input(line) {
        Input::Quit => return Ok(ControlFlow::Break(())),
        Input::Disconnect => handle.disconnect().await?,
        Input::Reconnect => handle.connect().await?,
        Input::Clear => handle.clear_error().await?,
        Input::Who => {
            for row in who_rows(&handle.snapshot()) {
                println!("{row}");
            }
        }
        Input::Unknown(cmd) => eprintln!("unknown command {cmd}; try /who /clear /disconnect /reconnect /quit"),
        Input::Text(text) => {
            handle.input_changed(text.as_str()).await?;
            if !handle.submit_input(text).await {
                debug!("message not sent");
            }
        }
    }
    Ok(ControlFlow::Continue(()))
}

// =============================================================================
// RENDERING
// =============================================================================

/// Remembers what has been printed so each state snapshot only prints the
/// difference.
#[derive(Debug, Default)]
struct View {
    connection: Option<ConnectionState>,
    printed_messages: usize,
    member_count: u32,
    error: Option<String>,
}

impl View {
    fn render(&mut self, state: &ChatState) -> Vec<String> {
        let mut out = Vec::new();

        if self.connection != Some(state.connection) {
            self.connection = Some(state.connection);
            out.push(format!("-- {}", state.connection.label()));
        }

        out.extend(state.messages.iter().skip(self.printed_messages).map(format_message));
        self.printed_messages = state.messages.len();

        if self.member_count != state.member_count {
            self.member_count = state.member_count;
            out.push(format!("-- {} in room", state.member_count));
        }

        if self.error != state.error {
            if let Some(error) = &state.error {
                out.push(format!("!! {error}"));
            }
            self.error.clone_from(&state.error);
        }
        out
    }
}

fn format_message(message: &ChatMessage) -> String {
    let you = if message.is_own { " (you)" } else { "" };
    format!("[{}] {}{you}: {}", message.time_label(), message.sender_name, message.text)
}

fn who_rows(state: &ChatState) -> Vec<String> {
    if state.participants.is_empty() {
        return vec!["-- nobody here yet".to_owned()];
    }
    state
        .participants
        .iter()
        .map(|p| {
            let marker = if p.is_online { '*' } else { ' ' };
            let you = if state.self_user_id.as_deref() == Some(p.user_id.as_str()) { " (you)" } else { "" };
            format!("{marker} [{}] {}{you}", p.initials(), p.username)
        })
        .collect()
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
