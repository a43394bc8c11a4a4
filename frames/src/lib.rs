//! Shared message model and JSON codec for the chat relay wire.
//!
//! This crate owns the wire representation used by both `server` and
//! `client`. Every record is a JSON object tagged by `type`:
//!
//! - `init`: full snapshot sent to a newly connected client
//! - `chat`: a message composed by a client
//! - `update`: one accepted message, broadcast by the relay

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Marker attached to a message when the sender does not pick one.
pub const DEFAULT_EMOJI: &str = "👾";

/// Error returned by [`decode`] and [`encode`].
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not JSON, or does not match any known record shape.
    #[error("failed to decode wire message: {0}")]
    Decode(#[source] serde_json::Error),
    /// The record could not be serialized.
    #[error("failed to encode wire message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// A single chat message as stored by the relay and mirrored by clients.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Opaque identifier generated by the composing client.
    pub id: String,
    /// User content, already truncated and filtered by the sender.
    pub text: String,
    /// Decorative marker shown next to the text.
    #[serde(default = "default_emoji")]
    pub emoji: String,
    /// Milliseconds since the Unix epoch, assigned at send time.
    pub timestamp: i64,
    /// Set when the content filter rewrote the text.
    #[serde(default, skip_serializing_if = "is_false")]
    pub filtered: bool,
}

impl ChatMessage {
    /// Build a message stamped with the current time.
    pub fn new(id: impl Into<String>, text: impl Into<String>, emoji: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), emoji: emoji.into(), timestamp: now_ms(), filtered: false }
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    #[must_use]
    pub fn with_filtered(mut self, filtered: bool) -> Self {
        self.filtered = filtered;
        self
    }
}

/// A record on the relay wire, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum WireMessage {
    /// Snapshot of the relay's retained messages, oldest first.
    Init { messages: Vec<ChatMessage> },
    /// A message submitted by a client.
    Chat(ChatMessage),
    /// A message accepted by the relay and fanned out to every client.
    Update { message: ChatMessage },
}

impl WireMessage {
    /// Short name of the record kind, matching the `type` tag.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Init { .. } => "init",
            Self::Chat(_) => "chat",
            Self::Update { .. } => "update",
        }
    }
}

/// Encode a record as a JSON text frame.
///
/// # Errors
///
/// Returns [`CodecError::Encode`] if serialization fails.
pub fn encode(message: &WireMessage) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Encode)
}

/// Decode a JSON text frame into a record.
///
/// # Errors
///
/// Returns [`CodecError::Decode`] for malformed JSON, unknown `type` tags,
/// or records missing required fields.
pub fn decode(text: &str) -> Result<WireMessage, CodecError> {
    serde_json::from_str(text).map_err(CodecError::Decode)
}

/// Current time as milliseconds since Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

fn default_emoji() -> String {
    DEFAULT_EMOJI.to_owned()
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(value: &bool) -> bool {
    !*value
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
