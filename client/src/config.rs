//! Client configuration parsed from environment variables.
//!
//! Unparseable numbers fall back to their default. Zero limits, an unknown
//! overflow mode and an empty relay list are errors.

use std::time::Duration;

use crate::admission::{self, AdmissionConfig, Overflow};
use crate::history::DEFAULT_HISTORY_LIMIT;

pub const DEFAULT_RELAY_URL: &str = "ws://localhost:3000/ws";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(3000);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("CHAT_RELAY_URLS lists no relay")]
    NoRelays,
    #[error("invalid CHAT_OVERFLOW '{0}' (expected truncate or reject)")]
    Overflow(String),
    #[error("{var} must be greater than zero")]
    Zero { var: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Relay endpoints tried in order on every connection attempt.
    pub relay_urls: Vec<String>,
    /// Production deployments fall back to static mode instead of
    /// reconnecting.
    pub production: bool,
    /// Messages kept in the local mirror.
    pub history_limit: usize,
    pub default_emoji: String,
    pub reconnect_delay: Duration,
    pub blocked_words: Vec<String>,
    pub admission: AdmissionConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            relay_urls: vec![DEFAULT_RELAY_URL.to_owned()],
            production: false,
            history_limit: DEFAULT_HISTORY_LIMIT,
            default_emoji: frames::DEFAULT_EMOJI.to_owned(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            blocked_words: Vec::new(),
            admission: AdmissionConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Build typed client config from environment variables.
    ///
    /// Optional:
    /// - `CHAT_RELAY_URLS`: comma-separated, default `ws://localhost:3000/ws`
    /// - `CHAT_PRODUCTION`: `true`/`1`/`yes`, default false
    /// - `CHAT_MAX_MESSAGES`: local mirror size, default 100
    /// - `CHAT_MAX_LENGTH`: default 250
    /// - `CHAT_OVERFLOW`: `truncate` (default) or `reject`
    /// - `CHAT_MIN_INTERVAL_MS`: default 1000
    /// - `CHAT_MAX_REPEATED_CHARS`: default 3
    /// - `CHAT_SPAM_WINDOW_MS`: default 10000
    /// - `CHAT_MAX_MESSAGES_IN_WINDOW`: default 5
    /// - `CHAT_DEFAULT_EMOJI`: default 👾
    /// - `CHAT_RECONNECT_DELAY_MS`: default 3000
    /// - `CHAT_BLOCKED_WORDS`: comma-separated, default empty
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] for an empty relay list, an unknown overflow
    /// mode, or zero limits.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`], reading values through `lookup`.
    ///
    /// # Errors
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let relay_urls = match lookup("CHAT_RELAY_URLS") {
            Some(raw) => split_list(&raw),
            None => vec![DEFAULT_RELAY_URL.to_owned()],
        };
        if relay_urls.is_empty() {
            return Err(ConfigError::NoRelays);
        }

        let overflow = match lookup("CHAT_OVERFLOW") {
            Some(raw) => raw.parse::<Overflow>().map_err(ConfigError::Overflow)?,
            None => Overflow::Truncate,
        };

        let admission = AdmissionConfig {
            max_length: nonzero(parse_or(&lookup, "CHAT_MAX_LENGTH", admission::DEFAULT_MAX_LENGTH), "CHAT_MAX_LENGTH")?,
            overflow,
            min_interval: millis_or(&lookup, "CHAT_MIN_INTERVAL_MS", admission::DEFAULT_MIN_INTERVAL),
            max_repeated_chars: nonzero(
                parse_or(&lookup, "CHAT_MAX_REPEATED_CHARS", admission::DEFAULT_MAX_REPEATED_CHARS),
                "CHAT_MAX_REPEATED_CHARS",
            )?,
            spam_window: millis_or(&lookup, "CHAT_SPAM_WINDOW_MS", admission::DEFAULT_SPAM_WINDOW),
            max_messages_in_window: nonzero(
                parse_or(&lookup, "CHAT_MAX_MESSAGES_IN_WINDOW", admission::DEFAULT_MAX_MESSAGES_IN_WINDOW),
                "CHAT_MAX_MESSAGES_IN_WINDOW",
            )?,
        };

        let default_emoji = lookup("CHAT_DEFAULT_EMOJI")
            .map(|v| v.trim().to_owned())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| frames::DEFAULT_EMOJI.to_owned());

        Ok(Self {
            relay_urls,
            production: lookup("CHAT_PRODUCTION").is_some_and(|v| parse_flag(&v)),
            history_limit: nonzero(parse_or(&lookup, "CHAT_MAX_MESSAGES", DEFAULT_HISTORY_LIMIT), "CHAT_MAX_MESSAGES")?,
            default_emoji,
            reconnect_delay: millis_or(&lookup, "CHAT_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY),
            blocked_words: lookup("CHAT_BLOCKED_WORDS").map(|v| split_list(&v)).unwrap_or_default(),
            admission,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}

fn nonzero(value: usize, var: &'static str) -> Result<usize, ConfigError> {
    if value == 0 { Err(ConfigError::Zero { var }) } else { Ok(value) }
}

fn parse_flag(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
