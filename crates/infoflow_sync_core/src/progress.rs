//! Throttled, de-duplicated status messages.
//!
//! The engine posts short progress lines ("Synced 25/80") to a
//! [`StatusQueue`]. Each message is shown on the host's status surface for
//! its timeout before the next one replaces it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info};

use crate::clock::Clock;

/// Prefix of every status line.
pub const STATUS_PREFIX: &str = "infoflow: ";

/// Longest message body shown, in characters.
pub const MAX_STATUS_CHARS: usize = 120;

/// Where status text ends up (a status bar, a log, nothing).
pub trait StatusSink: Send + Sync {
    /// Replace the status text. Empty text clears it.
    fn set_text(&self, text: &str);

    /// A one-off user-visible notice (toast, popup).
    fn notice(&self, _message: &str) {}
}

/// Writes status lines and notices to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn set_text(&self, text: &str) {
        if !text.is_empty() {
            debug!("{}", text);
        }
    }

    fn notice(&self, message: &str) {
        info!("{}", message);
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl StatusSink for NoopSink {
    fn set_text(&self, _text: &str) {}
}

#[derive(Debug, Clone, PartialEq)]
struct StatusMessage {
    text: String,
    timeout: Duration,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<StatusMessage>,
    current: Option<StatusMessage>,
    shown_at: Option<DateTime<Utc>>,
}

/// FIFO of status messages, each displayed for its own timeout.
pub struct StatusQueue {
    sink: Arc<dyn StatusSink>,
    clock: Arc<dyn Clock>,
    state: Mutex<QueueState>,
}

impl StatusQueue {
    /// Create a queue writing to `sink`.
    pub fn new(sink: Arc<dyn StatusSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            sink,
            clock,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Queue a message.
    ///
    /// A message equal to the head of the queue is dropped. `forcing` clears
    /// whatever is currently displayed so the queue advances immediately.
    pub fn enqueue(&self, message: &str, timeout: Duration, forcing: bool) {
        let text = format!(
            "{}{}",
            STATUS_PREFIX,
            message.chars().take(MAX_STATUS_CHARS).collect::<String>()
        );

        let mut updates = Vec::new();
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.pending.front().is_some_and(|head| head.text == text) {
                return;
            }
            state.pending.push_back(StatusMessage { text, timeout });

            if forcing {
                state.current = None;
                state.shown_at = None;
                updates.push(String::new());
            }
            self.advance(&mut state, &mut updates);
        }
        self.flush(updates);
    }

    /// Advance the queue if the current message has expired. Hosts call this periodically.
    pub fn tick(&self) {
        let mut updates = Vec::new();
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            self.advance(&mut state, &mut updates);
        }
        self.flush(updates);
    }

    /// Show a one-off notice through the sink.
    pub fn notice(&self, message: &str) {
        self.sink.notice(message);
    }

    /// Text currently displayed, if any.
    pub fn current(&self) -> Option<String> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .current
            .as_ref()
            .map(|m| m.text.clone())
    }

    /// Number of messages waiting behind the current one.
    pub fn pending_len(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .len()
    }

    fn advance(&self, state: &mut QueueState, updates: &mut Vec<String>) {
        let now = self.clock.now();

        if let Some(current) = &state.current {
            let shown_at = state.shown_at.unwrap_or(DateTime::UNIX_EPOCH);
            let age = now.signed_duration_since(shown_at);
            let expired = age
                .to_std()
                .map(|age| age >= current.timeout)
                .unwrap_or(false);
            if !expired {
                return;
            }
            state.current = None;
            state.shown_at = None;
        }

        match state.pending.pop_front() {
            Some(next) => {
                updates.push(next.text.clone());
                state.current = Some(next);
                state.shown_at = Some(now);
            }
            None => updates.push(String::new()),
        }
    }

    fn flush(&self, updates: Vec<String>) {
        for text in updates {
            self.sink.set_text(&text);
        }
    }
}
