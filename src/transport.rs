//! Websocket transport behind the [`Connector`] seam.
//!
//! DESIGN
//! ======
//! Opening a socket never blocks the caller. [`WsConnector::open`] spawns one
//! task per connection attempt and hands back a [`SocketHandle`] that feeds
//! that task's outbound queue. Everything the socket observes comes back as
//! [`TransportEvent`]s tagged with the attempt's generation, so the owner can
//! discard events from sockets it has already abandoned.
//!
//! CLOSE CODES
//! ===========
//! - Server close frame: its code, or 1005 when the frame carries none.
//! - Failed handshake, read error, or EOF without a close frame: 1006.
//! - Local close request: the requested code.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};

use frames::{CLOSE_ABNORMAL, CLOSE_NO_STATUS, CLOSE_NORMAL};

use crate::config::ConfigError;

// =============================================================================
// EVENTS + COMMANDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEventKind {
    Opened,
    Text(String),
    Error(String),
    Closed { code: u16, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    pub generation: u64,
    pub kind: TransportEventKind,
}

/// Work queued for the socket task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Sending half of one connection attempt.
#[derive(Debug)]
pub struct SocketHandle {
    generation: u64,
    outbound: mpsc::UnboundedSender<Outbound>,
}

impl SocketHandle {
    /// Create a handle plus the queue its socket task drains.
    #[must_use]
    pub fn new(generation: u64) -> (Self, mpsc::UnboundedReceiver<Outbound>) {
        let (outbound, rx) = mpsc::unbounded_channel();
        (Self { generation, outbound }, rx)
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue a text frame. Returns `false` once the socket task is gone.
    pub fn send_text(&self, text: String) -> bool {
        self.outbound.send(Outbound::Text(text)).is_ok()
    }

    /// Ask the socket task to send a close frame and stop.
    pub fn close(&self, code: u16, reason: &str) {
        let request = Outbound::Close { code, reason: reason.to_owned() };
        if self.outbound.send(request).is_err() {
            debug!(generation = self.generation, "ws: close requested after socket task ended");
        }
    }
}

/// Opens chat sockets. Production uses [`WsConnector`]; tests script one.
pub trait Connector: Send + Sync {
    fn open(&self, url: String, generation: u64, events: mpsc::UnboundedSender<TransportEvent>) -> SocketHandle;
}

// =============================================================================
// URL
// =============================================================================

/// Append `room` and `token` as encoded query parameters to the endpoint.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidWsUrl`] when `base` does not parse.
pub fn chat_url(base: &str, room_id: &str, token: &str) -> Result<String, ConfigError> {
    let mut url = url::Url::parse(base)
        .map_err(|e| ConfigError::InvalidWsUrl { url: base.to_owned(), reason: e.to_string() })?;
    url.query_pairs_mut().append_pair("room", room_id).append_pair("token", token);
    Ok(url.into())
}

// =============================================================================
// TUNGSTENITE CONNECTOR
// =============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: String, generation: u64, events: mpsc::UnboundedSender<TransportEvent>) -> SocketHandle {
        let (handle, outbound) = SocketHandle::new(generation);
        tokio::spawn(run_socket(url, generation, events, outbound));
        handle
    }
}

fn emit(events: &mpsc::UnboundedSender<TransportEvent>, generation: u64, kind: TransportEventKind) {
    if events.send(TransportEvent { generation, kind }).is_err() {
        debug!(generation, "ws: event receiver dropped");
    }
}

fn emit_failure(events: &mpsc::UnboundedSender<TransportEvent>, generation: u64, error: String) {
    emit(events, generation, TransportEventKind::Error(error));
    emit(events, generation, TransportEventKind::Closed { code: CLOSE_ABNORMAL, reason: String::new() });
}

/// Resolves once the owner asks to close (or drops the handle) before the
/// handshake completed. Text queued in that window is discarded.
async fn closed_before_open(outbound: &mut mpsc::UnboundedReceiver<Outbound>) -> (u16, String) {
    loop {
        match outbound.recv().await {
            Some(Outbound::Text(_)) => debug!("ws: dropping text queued before open"),
            Some(Outbound::Close { code, reason }) => return (code, reason),
            None => return (CLOSE_NORMAL, String::new()),
        }
    }
}

async fn run_socket(
    url: String,
    generation: u64,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    let stream = tokio::select! {
        result = connect_async(url.as_str()) => match result {
            Ok((stream, _)) => stream,
            Err(error) => {
                warn!(generation, %error, "ws: handshake failed");
                emit_failure(&events, generation, error.to_string());
                return;
            }
        },
        (code, reason) = closed_before_open(&mut outbound) => {
            debug!(generation, code, "ws: closed before handshake completed");
            emit(&events, generation, TransportEventKind::Closed { code, reason });
            return;
        }
    };

    info!(generation, "ws: socket opened");
    emit(&events, generation, TransportEventKind::Opened);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            request = outbound.recv() => {
                let (code, reason) = match request {
                    Some(Outbound::Text(text)) => {
                        if let Err(error) = write.send(Message::Text(text.into())).await {
                            warn!(generation, %error, "ws: send failed");
                            emit_failure(&events, generation, error.to_string());
                            return;
                        }
                        continue;
                    }
                    Some(Outbound::Close { code, reason }) => (code, reason),
                    None => (CLOSE_NORMAL, String::new()),
                };
                let frame = CloseFrame { code: CloseCode::from(code), reason: reason.clone().into() };
                if let Err(error) = write.send(Message::Close(Some(frame))).await {
                    debug!(generation, %error, "ws: close frame not delivered");
                }
                info!(generation, code, "ws: socket closed locally");
                emit(&events, generation, TransportEventKind::Closed { code, reason });
                return;
            }
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    emit(&events, generation, TransportEventKind::Text(text.as_str().to_owned()));
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame.map_or((CLOSE_NO_STATUS, String::new()), |f| {
                        (u16::from(f.code), f.reason.as_str().to_owned())
                    });
                    info!(generation, code, %reason, "ws: server closed socket");
                    emit(&events, generation, TransportEventKind::Closed { code, reason });
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => {
                    warn!(generation, %error, "ws: read failed");
                    emit_failure(&events, generation, error.to_string());
                    return;
                }
                None => {
                    warn!(generation, "ws: stream ended without close frame");
                    emit(&events, generation, TransportEventKind::Closed { code: CLOSE_ABNORMAL, reason: String::new() });
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
