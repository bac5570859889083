//! Chat connection manager: one websocket per room, reconnect, typing.
//!
//! DESIGN
//! ======
//! `ChatConnectionManager` exclusively owns the socket handle, the reconnect
//! bookkeeping, the typing debouncer and the [`ChatState`]. It can be driven
//! directly (`connect`, `handle_transport`, ...) or moved onto a tokio task
//! with [`ChatConnectionManager::spawn`], which runs a single `select!` loop:
//! - UI commands from [`ChatHandle`] -> state transition
//! - transport events from the socket task -> state transition
//! - reconnect deadline -> `connect()`
//! - typing deadline -> `typing: false`
//!
//! After every step the state is published through a `watch` channel.
//!
//! LIFECYCLE
//! =========
//! 1. `connect()` -> `Connecting`, acquire token, open socket (new generation)
//! 2. `Opened` -> `Connected`, attempt counter reset
//! 3. `Closed` with code != 1000 -> `Disconnected`, schedule backoff reconnect
//! 4. `disconnect()` -> cancel reconnect, close with 1000, `Disconnected`
//!
//! Every connection attempt gets a fresh generation number. Transport events
//! carrying an older generation belong to an abandoned socket and are
//! dropped.
//!
//! Inside the actor loop, token acquisition runs on its own task and reports
//! back tagged with the attempt's generation, so commands (`disconnect`,
//! `shutdown`) are still served while an auth lookup is outstanding.
//! `disconnect` aborts that task.

use std::ops::ControlFlow;
use std::sync::Arc;

use rand::Rng;
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use frames::{CLOSE_NORMAL, ClientEvent, decode_server_event, encode_client_event};

use crate::config::ChatConfig;
use crate::reconnect::ReconnectPolicy;
use crate::state::{ChatState, ConnectionState};
use crate::token::{TokenError, TokenProvider};
use crate::transport::{Connector, SocketHandle, TransportEvent, TransportEventKind, chat_url};
use crate::typing::TypingIndicator;

const COMMAND_CAPACITY: usize = 64;
const MESSAGE_ID_SUFFIX_LEN: usize = 9;
const MESSAGE_ID_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

const ERR_AUTH: &str = "Authentication required";
const ERR_CONNECT: &str = "Failed to connect";
const ERR_CONNECTION: &str = "Connection error";
const ERR_NOT_CONNECTED: &str = "Not connected to chat";
const ERR_SEND: &str = "Failed to send message";

// =============================================================================
// COMMANDS + ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("chat manager has stopped")]
    ManagerClosed,
}

/// Requests accepted by a running manager task.
#[derive(Debug)]
pub enum ChatCommand {
    Connect,
    Disconnect,
    SendMessage { text: String, reply: oneshot::Sender<bool> },
    SendTyping(bool),
    InputChanged(String),
    SubmitInput { text: String, reply: oneshot::Sender<bool> },
    ClearError,
    Shutdown,
}

// =============================================================================
// MANAGER
// =============================================================================

pub struct ChatConnectionManager {
    room_id: String,
    ws_url: String,
    reconnect: ReconnectPolicy,
    tokens: Arc<TokenProvider>,
    connector: Arc<dyn Connector>,
    state: ChatState,
    socket: Option<SocketHandle>,
    generation: u64,
    attempts: u32,
    reconnect_at: Option<Instant>,
    typing: TypingIndicator,
    events_tx: mpsc::UnboundedSender<TransportEvent>,
    events_rx: mpsc::UnboundedReceiver<TransportEvent>,
    token_tx: mpsc::UnboundedSender<TokenReady>,
    token_rx: mpsc::UnboundedReceiver<TokenReady>,
    acquiring: Option<JoinHandle<()>>,
    snapshot: watch::Sender<ChatState>,
}

/// Outcome of a background token acquisition for connection `generation`.
struct TokenReady {
    generation: u64,
    token: Result<String, TokenError>,
}

impl ChatConnectionManager {
    #[must_use]
    pub fn new(
        config: &ChatConfig,
        room_id: impl Into<String>,
        tokens: TokenProvider,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (token_tx, token_rx) = mpsc::unbounded_channel();
        Self {
            room_id: room_id.into(),
            ws_url: config.ws_url.clone(),
            reconnect: config.reconnect,
            tokens: Arc::new(tokens),
            connector,
            state: ChatState::default(),
            socket: None,
            generation: 0,
            attempts: 0,
            reconnect_at: None,
            typing: TypingIndicator::new(config.typing_idle),
            events_tx,
            events_rx,
            token_tx,
            token_rx,
            acquiring: None,
            snapshot: watch::Sender::new(ChatState::default()),
        }
    }

    #[must_use]
    pub fn state(&self) -> &ChatState {
        &self.state
    }

    #[must_use]
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// When the next automatic reconnect fires, if one is scheduled.
    #[must_use]
    pub fn reconnect_deadline(&self) -> Option<Instant> {
        self.reconnect_at
    }

    // -------------------------------------------------------------------------
    // Connection lifecycle
    // -------------------------------------------------------------------------

    /// Open a socket for the room. No-op while already connected.
    ///
    /// Awaits the token inline; the actor loop uses [`Self::start_connect`]
    /// instead. Failures never escape: they land in `state.error` and the
    /// connection state becomes [`ConnectionState::Error`].
    pub async fn connect(&mut self) {
        let Some(generation) = self.begin_connect() else {
            return;
        };
        let token = self.tokens.acquire().await;
        self.finish_connect(generation, token);
    }

    /// Non-blocking `connect`: acquire the token on a separate task and
    /// finish when its [`TokenReady`] comes back through the actor loop.
    fn start_connect(&mut self) {
        let Some(generation) = self.begin_connect() else {
            return;
        };
        let tokens = Arc::clone(&self.tokens);
        let ready = self.token_tx.clone();
        self.acquiring = Some(tokio::spawn(async move {
            let token = tokens.acquire().await;
            if ready.send(TokenReady { generation, token }).is_err() {
                debug!(generation, "chat: manager gone before token arrived");
            }
        }));
    }

    /// State transition into `Connecting` under a fresh generation. Returns
    /// `None` when already connected.
    fn begin_connect(&mut self) -> Option<u64> {
        if self.state.connection == ConnectionState::Connected {
            debug!(room = %self.room_id, "chat: connect ignored, already connected");
            return None;
        }

        self.reconnect_at = None;
        self.abort_acquisition();
        if let Some(stale) = self.socket.take() {
            debug!(generation = stale.generation(), "chat: detaching in-flight socket");
            stale.close(CLOSE_NORMAL, "Reconnecting");
        }
        self.generation += 1;
        self.state.connection = ConnectionState::Connecting;
        self.state.error = None;
        self.publish();
        Some(self.generation)
    }

    /// Open the socket once a token is available for attempt `generation`.
    fn finish_connect(&mut self, generation: u64, token: Result<String, TokenError>) {
        if generation != self.generation {
            debug!(token_generation = generation, current = self.generation, "chat: stale token result");
            return;
        }
        self.acquiring = None;

        let token = match token {
            Ok(token) => token,
            Err(error) => {
                warn!(room = %self.room_id, %error, "chat: no bearer token");
                self.fail(ERR_AUTH);
                return;
            }
        };

        let url = match chat_url(&self.ws_url, &self.room_id, &token) {
            Ok(url) => url,
            Err(error) => {
                warn!(room = %self.room_id, %error, "chat: could not build socket url");
                self.fail(ERR_CONNECT);
                return;
            }
        };

        info!(room = %self.room_id, generation, attempt = self.attempts, "chat: opening socket");
        self.socket = Some(self.connector.open(url, generation, self.events_tx.clone()));
    }

    fn abort_acquisition(&mut self) {
        if let Some(task) = self.acquiring.take() {
            debug!(room = %self.room_id, "chat: abandoning token acquisition");
            task.abort();
        }
    }

    /// Close the socket on purpose. Cancels any pending reconnect and is
    /// safe to call repeatedly.
    pub fn disconnect(&mut self) {
        self.reconnect_at = None;
        self.abort_acquisition();
        if let Some(socket) = self.socket.take() {
            info!(room = %self.room_id, generation = socket.generation(), "chat: disconnecting");
            socket.close(CLOSE_NORMAL, "User disconnected");
        }
        self.generation += 1;
        self.attempts = 0;
        self.typing.reset();
        self.state.connection = ConnectionState::Disconnected;
        self.publish();
    }

    /// Fold one socket event into the state machine.
    pub fn handle_transport(&mut self, event: TransportEvent) {
        if event.generation != self.generation {
            debug!(event_generation = event.generation, current = self.generation, "chat: stale transport event");
            return;
        }

        match event.kind {
            TransportEventKind::Opened => {
                info!(room = %self.room_id, generation = self.generation, "chat: connected");
                self.state.connection = ConnectionState::Connected;
                self.attempts = 0;
            }
            TransportEventKind::Text(text) => match decode_server_event(&text) {
                Ok(server_event) => self.state.apply_server_event(server_event),
                Err(error) => {
                    warn!(room = %self.room_id, %error, "chat: dropping undecodable frame");
                    return;
                }
            },
            TransportEventKind::Error(error) => {
                warn!(room = %self.room_id, %error, "chat: socket error");
                self.state.connection = ConnectionState::Error;
                self.state.error = Some(ERR_CONNECTION.to_owned());
            }
            TransportEventKind::Closed { code, reason } => self.on_closed(code, &reason),
        }
        self.publish();
    }

    fn on_closed(&mut self, code: u16, reason: &str) {
        info!(room = %self.room_id, code, %reason, "chat: socket closed");
        self.socket = None;
        self.state.connection = ConnectionState::Disconnected;
        self.typing.reset();

        if code == CLOSE_NORMAL {
            return;
        }
        match self.reconnect.delay_for(self.attempts) {
            Some(delay) => {
                self.attempts += 1;
                self.reconnect_at = Some(Instant::now() + delay);
                info!(
                    room = %self.room_id,
                    attempt = self.attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "chat: reconnect scheduled"
                );
            }
            None => warn!(room = %self.room_id, attempts = self.attempts, "chat: reconnect attempts exhausted"),
        }
    }

    fn fail(&mut self, message: &str) {
        self.state.connection = ConnectionState::Error;
        self.state.error = Some(message.to_owned());
        self.publish();
    }

    // -------------------------------------------------------------------------
    // Outbound
    // -------------------------------------------------------------------------

    fn open_socket(&self) -> Option<&SocketHandle> {
        self.socket
            .as_ref()
            .filter(|_| self.state.connection == ConnectionState::Connected)
    }

    /// Send a chat message. Returns whether it was handed to the socket.
    ///
    /// Nothing is appended locally; the message shows up when the server
    /// echoes it back.
    pub fn send_message(&mut self, text: &str) -> bool {
        let Some(socket) = self.open_socket() else {
            self.state.error = Some(ERR_NOT_CONNECTED.to_owned());
            self.publish();
            return false;
        };

        let text = text.trim();
        if text.is_empty() {
            return false;
        }

        let message_id = new_message_id();
        let frame = encode_client_event(&ClientEvent::Message { message_id: message_id.clone(), text: text.to_owned() });
        if socket.send_text(frame) {
            debug!(room = %self.room_id, %message_id, "chat: message sent");
            true
        } else {
            warn!(room = %self.room_id, %message_id, "chat: socket refused message");
            self.state.error = Some(ERR_SEND.to_owned());
            self.publish();
            false
        }
    }

    /// Send a typing signal. Silently `false` when not connected.
    pub fn send_typing(&mut self, is_typing: bool) -> bool {
        match self.open_socket() {
            Some(socket) => socket.send_text(encode_client_event(&ClientEvent::Typing { is_typing })),
            None => false,
        }
    }

    /// Feed the composer's current text to the typing debouncer.
    pub fn input_changed(&mut self, text: &str) {
        if let Some(signal) = self.typing.on_input(text, Instant::now()) {
            self.send_typing(signal);
        }
    }

    /// Send the composer's text and end the typing run on success.
    pub fn submit_input(&mut self, text: &str) -> bool {
        let sent = self.send_message(text);
        if sent {
            if let Some(signal) = self.typing.stop() {
                self.send_typing(signal);
            }
        }
        sent
    }

    pub fn clear_error(&mut self) {
        self.state.error = None;
        self.publish();
    }

    fn poll_typing(&mut self) {
        if let Some(signal) = self.typing.poll_idle(Instant::now()) {
            self.send_typing(signal);
        }
    }

    fn publish(&self) {
        self.snapshot.send_modify(|snapshot| snapshot.clone_from(&self.state));
    }

    // -------------------------------------------------------------------------
    // Actor
    // -------------------------------------------------------------------------

    /// Move the manager onto its own task and return a handle to drive it.
    #[must_use]
    pub fn spawn(self) -> (ChatHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_CAPACITY);
        let handle = ChatHandle { commands, snapshot: self.snapshot.subscribe() };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }

    /// Process commands, socket events and timers until shutdown or until
    /// every handle is dropped. Either way the socket is closed once.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ChatCommand>) {
        info!(room = %self.room_id, "chat: manager started");
        loop {
            let reconnect_at = self.reconnect_at;
            let typing_at = self.typing.deadline();

            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else {
                        self.disconnect();
                        break;
                    };
                    if self.handle_command(command).is_break() {
                        break;
                    }
                }
                Some(event) = self.events_rx.recv() => self.handle_transport(event),
                Some(ready) = self.token_rx.recv() => self.finish_connect(ready.generation, ready.token),
                () = sleep_until_opt(reconnect_at) => {
                    self.reconnect_at = None;
                    debug!(room = %self.room_id, attempt = self.attempts, "chat: reconnect deadline reached");
                    self.start_connect();
                }
                () = sleep_until_opt(typing_at) => self.poll_typing(),
            }
        }
        info!(room = %self.room_id, "chat: manager stopped");
    }

    fn handle_command(&mut self, command: ChatCommand) -> ControlFlow<()> {
        match command {
            ChatCommand::Connect => self.start_connect(),
            ChatCommand::Disconnect => self.disconnect(),
            ChatCommand::SendMessage { text, reply } => reply_bool(reply, self.send_message(&text)),
            ChatCommand::SendTyping(is_typing) => {
                self.send_typing(is_typing);
            }
            ChatCommand::InputChanged(text) => self.input_changed(&text),
            ChatCommand::SubmitInput { text, reply } => reply_bool(reply, self.submit_input(&text)),
            ChatCommand::ClearError => self.clear_error(),
            ChatCommand::Shutdown => {
                self.disconnect();
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }
}

fn reply_bool(reply: oneshot::Sender<bool>, value: bool) {
    if reply.send(value).is_err() {
        debug!("chat: caller dropped before reply");
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// `msg_<unix-ms>_<9 lowercase alphanumerics>`.
fn new_message_id() -> String {
    let millis = OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000;
    let mut rng = rand::rng();
    let suffix: String = (0..MESSAGE_ID_SUFFIX_LEN)
        .map(|_| char::from(MESSAGE_ID_ALPHABET[rng.random_range(0..MESSAGE_ID_ALPHABET.len())]))
        .collect();
    format!("msg_{millis}_{suffix}")
}

// =============================================================================
// HANDLE
// =============================================================================

/// Cloneable front end for a spawned manager.
#[derive(Clone)]
pub struct ChatHandle {
    commands: mpsc::Sender<ChatCommand>,
    snapshot: watch::Receiver<ChatState>,
}

impl ChatHandle {
    async fn send(&self, command: ChatCommand) -> Result<(), ChatError> {
        self.commands.send(command).await.map_err(|_| ChatError::ManagerClosed)
    }

    async fn request(&self, build: impl FnOnce(oneshot::Sender<bool>) -> ChatCommand) -> bool {
        let (reply, rx) = oneshot::channel();
        if self.send(build(reply)).await.is_err() {
            return false;
        }
        rx.await.unwrap_or(false)
    }

    /// # Errors
    ///
    /// Returns [`ChatError::ManagerClosed`] once the manager task has stopped.
    pub async fn connect(&self) -> Result<(), ChatError> {
        self.send(ChatCommand::Connect).await
    }

    /// # Errors
    ///
    /// Returns [`ChatError::ManagerClosed`] once the manager task has stopped.
    pub async fn disconnect(&self) -> Result<(), ChatError> {
        self.send(ChatCommand::Disconnect).await
    }

    pub async fn send_message(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        self.request(|reply| ChatCommand::SendMessage { text, reply }).await
    }

    /// # Errors
    ///
    /// Returns [`ChatError::ManagerClosed`] once the manager task has stopped.
    pub async fn send_typing(&self, is_typing: bool) -> Result<(), ChatError> {
        self.send(ChatCommand::SendTyping(is_typing)).await
    }

    /// # Errors
    ///
    /// Returns [`ChatError::ManagerClosed`] once the manager task has stopped.
    pub async fn input_changed(&self, text: impl Into<String>) -> Result<(), ChatError> {
        self.send(ChatCommand::InputChanged(text.into())).await
    }

    pub async fn submit_input(&self, text: impl Into<String>) -> bool {
        let text = text.into();
        self.request(|reply| ChatCommand::SubmitInput { text, reply }).await
    }

    /// # Errors
    ///
    /// Returns [`ChatError::ManagerClosed`] once the manager task has stopped.
    pub async fn clear_error(&self) -> Result<(), ChatError> {
        self.send(ChatCommand::ClearError).await
    }

    /// Disconnect and stop the manager task.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::ManagerClosed`] if the task already stopped.
    pub async fn shutdown(&self) -> Result<(), ChatError> {
        self.send(ChatCommand::Shutdown).await
    }

    /// Latest published state.
    #[must_use]
    pub fn snapshot(&self) -> ChatState {
        self.snapshot.borrow().clone()
    }

    /// Receiver that wakes on every published state change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.snapshot.clone()
    }
}

#[cfg(test)]
#[path = "manager_test.rs"]
mod tests;
