//! Client-side admission policy for outgoing messages.
//!
//! DESIGN
//! ======
//! Checks run in a fixed order and the first failure wins:
//! empty text, length (only in `Overflow::Reject` mode), the minimum
//! interval since the last sent message, runs of repeated characters, and
//! the number of this client's own sends inside the spam window.
//!
//! The policy only observes sends that actually went out: `check` never
//! records anything, the controller calls `record_sent` after a successful
//! forward. Rejected attempts do not count against the window.
//!
//! This is advisory. The relay accepts whatever a client forwards.

use std::collections::VecDeque;
use std::str::FromStr;
use std::time::{Duration, Instant};

pub const DEFAULT_MAX_LENGTH: usize = 250;
pub const DEFAULT_MIN_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_MAX_REPEATED_CHARS: usize = 3;
pub const DEFAULT_SPAM_WINDOW: Duration = Duration::from_millis(10_000);
pub const DEFAULT_MAX_MESSAGES_IN_WINDOW: usize = 5;

// =============================================================================
// CONFIG
// =============================================================================

/// What to do with text longer than `max_length`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Overflow {
    /// Cut the text to `max_length` characters before checking it.
    #[default]
    Truncate,
    /// Reject the message with [`Rejection::TooLong`].
    Reject,
}

impl FromStr for Overflow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "truncate" => Ok(Self::Truncate),
            "reject" => Ok(Self::Reject),
            other => Err(other.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionConfig {
    /// Maximum message length in characters.
    pub max_length: usize,
    pub overflow: Overflow,
    /// Minimum time between two sent messages.
    pub min_interval: Duration,
    /// A run of this many identical characters is rejected.
    pub max_repeated_chars: usize,
    pub spam_window: Duration,
    /// Sends allowed inside `spam_window`.
    pub max_messages_in_window: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            overflow: Overflow::Truncate,
            min_interval: DEFAULT_MIN_INTERVAL,
            max_repeated_chars: DEFAULT_MAX_REPEATED_CHARS,
            spam_window: DEFAULT_SPAM_WINDOW,
            max_messages_in_window: DEFAULT_MAX_MESSAGES_IN_WINDOW,
        }
    }
}

// =============================================================================
// REJECTION
// =============================================================================

/// Why a message was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("message is empty")]
    Empty,
    #[error("message is longer than {max} characters")]
    TooLong { max: usize },
    #[error("sending too fast, wait {remaining_ms} ms")]
    RateLimited { remaining_ms: u64 },
    #[error("message repeats a character {max} or more times in a row")]
    RepeatedChars { max: usize },
    #[error("too many messages (max {limit} per {window_ms} ms)")]
    WindowSpam { limit: usize, window_ms: u64 },
}

// =============================================================================
// POLICY
// =============================================================================

#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    config: AdmissionConfig,
    last_sent: Option<Instant>,
    /// Timestamps of this client's own sends, oldest first.
    sent: VecDeque<Instant>,
}

impl AdmissionPolicy {
    #[must_use]
    pub fn new(config: AdmissionConfig) -> Self {
        Self { config, last_sent: None, sent: VecDeque::new() }
    }

    #[must_use]
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Check `text` against every rule as of now.
    ///
    /// # Errors
    ///
    /// Returns the first [`Rejection`] that applies.
    pub fn check(&mut self, text: &str) -> Result<(), Rejection> {
        self.check_at(text, Instant::now())
    }

    /// Internal: check with explicit timestamp (for testing).
    pub(crate) fn check_at(&mut self, text: &str, now: Instant) -> Result<(), Rejection> {
        let cfg = self.config;

        if text.trim().is_empty() {
            return Err(Rejection::Empty);
        }

        if cfg.overflow == Overflow::Reject && text.chars().count() > cfg.max_length {
            return Err(Rejection::TooLong { max: cfg.max_length });
        }

        if let Some(last) = self.last_sent {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < cfg.min_interval {
                let remaining = cfg.min_interval.saturating_sub(elapsed);
                return Err(Rejection::RateLimited { remaining_ms: duration_ms(remaining) });
            }
        }

        if longest_run(text) >= cfg.max_repeated_chars {
            return Err(Rejection::RepeatedChars { max: cfg.max_repeated_chars });
        }

        prune_window(&mut self.sent, now, cfg.spam_window);
        if self.sent.len() >= cfg.max_messages_in_window {
            return Err(Rejection::WindowSpam {
                limit: cfg.max_messages_in_window,
                window_ms: duration_ms(cfg.spam_window),
            });
        }

        Ok(())
    }

    /// Record that a message was actually sent now.
    pub fn record_sent(&mut self) {
        self.record_sent_at(Instant::now());
    }

    pub(crate) fn record_sent_at(&mut self, now: Instant) {
        self.last_sent = Some(now);
        self.sent.push_back(now);
    }
}

/// Cut `text` to at most `max` characters.
#[must_use]
pub fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_owned(),
        None => text.to_owned(),
    }
}

/// Length of the longest run of one repeated character.
fn longest_run(text: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    let mut prev = None;
    for c in text.chars() {
        if Some(c) == prev {
            run += 1;
        } else {
            run = 1;
            prev = Some(c);
        }
        longest = longest.max(run);
    }
    longest
}

/// Drop timestamps that are at least `window` old.
fn prune_window(deque: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(&front) = deque.front() {
        if now.saturating_duration_since(front) >= window {
            deque.pop_front();
        } else {
            break;
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "admission_test.rs"]
mod tests;
