//! Static mode content.
//!
//! Static mode is entered when a production deployment cannot reach any
//! relay. It greets the visitor with a few canned messages and keeps sends
//! on this machine.

use frames::{ChatMessage, now_ms};
use uuid::Uuid;

const WELCOME: [(&str, &str); 3] = [
    ("Welcome to the Y2K Chat Experience!", "👾"),
    ("This is running in static mode", "💫"),
    ("Try sending a message!", "🚀"),
];

/// Canned messages shown once on entering static mode.
#[must_use]
pub fn welcome_messages() -> Vec<ChatMessage> {
    let now = now_ms();
    WELCOME
        .iter()
        .enumerate()
        .map(|(i, (text, emoji))| ChatMessage::new(format!("static-welcome-{}", i + 1), *text, *emoji).with_timestamp(now))
        .collect()
}

/// A message composed while in static mode. Never leaves this process.
#[must_use]
pub fn local_message(text: impl Into<String>, emoji: impl Into<String>) -> ChatMessage {
    ChatMessage::new(format!("local-{}", Uuid::new_v4()), text, emoji)
}

#[cfg(test)]
#[path = "fallback_test.rs"]
mod tests;
