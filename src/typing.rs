//! Typing-indicator debounce.
//!
//! DESIGN
//! ======
//! One deadline per input stream, replaced on every keystroke rather than
//! stacked. The owner feeds input changes and polls the deadline; the
//! indicator answers with the signal (if any) that should go on the wire.

use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_TYPING_IDLE_MS: u64 = 2_000;

#[derive(Debug, Clone)]
pub struct TypingIndicator {
    idle: Duration,
    active: bool,
    deadline: Option<Instant>,
}

impl TypingIndicator {
    #[must_use]
    pub fn new(idle: Duration) -> Self {
        Self { idle, active: false, deadline: None }
    }

    /// Whether a `typing: true` signal is currently outstanding.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When the idle timeout fires, if armed.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Record the current input text.
    ///
    /// Returns `Some(true)` on the leading edge of non-empty input and
    /// `Some(false)` as soon as the input becomes empty while active.
    pub fn on_input(&mut self, text: &str, now: Instant) -> Option<bool> {
        let typing = !text.trim().is_empty();
        let signal = match (typing, self.active) {
            (true, false) => Some(true),
            (false, true) => Some(false),
            _ => None,
        };
        self.active = typing;
        self.deadline = typing.then(|| now + self.idle);
        signal
    }

    /// Fire the idle timeout if it has elapsed.
    pub fn poll_idle(&mut self, now: Instant) -> Option<bool> {
        match self.deadline {
            Some(deadline) if now >= deadline => self.stop(),
            _ => None,
        }
    }

    /// Cancel the timer and end the typing run, e.g. after a message is sent.
    pub fn stop(&mut self) -> Option<bool> {
        self.deadline = None;
        if self.active {
            self.active = false;
            Some(false)
        } else {
            None
        }
    }

    /// Forget all state without producing a signal (connection is gone).
    pub fn reset(&mut self) {
        self.active = false;
        self.deadline = None;
    }
}

impl Default for TypingIndicator {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TYPING_IDLE_MS))
    }
}

#[cfg(test)]
#[path = "typing_test.rs"]
mod tests;
