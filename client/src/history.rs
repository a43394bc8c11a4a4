//! Bounded local mirror of the relay log, de-duplicated by message id.

use std::collections::{HashSet, VecDeque};

use frames::ChatMessage;

pub const DEFAULT_HISTORY_LIMIT: usize = 100;

#[derive(Debug, Clone)]
pub struct History {
    messages: VecDeque<ChatMessage>,
    ids: HashSet<String>,
    capacity: usize,
}

impl History {
    /// Create an empty mirror. A zero capacity is clamped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { messages: VecDeque::with_capacity(capacity), ids: HashSet::new(), capacity }
    }

    /// Insert a message unless its id is already present. Evicts the oldest
    /// entries past capacity. Returns `true` when the message was new.
    pub fn insert(&mut self, message: ChatMessage) -> bool {
        if !self.ids.insert(message.id.clone()) {
            return false;
        }
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            if let Some(evicted) = self.messages.pop_front() {
                self.ids.remove(&evicted.id);
            }
        }
        true
    }

    /// Merge a relay snapshot, oldest first, and return the messages that
    /// were new to the mirror.
    ///
    /// Only the last `capacity` entries of the snapshot are considered. An
    /// older entry would be evicted again by the newer ones, and since its
    /// id is forgotten on eviction it would look new on every replay.
    pub fn merge_snapshot(&mut self, mut messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
        let skip = messages.len().saturating_sub(self.capacity);
        messages
            .split_off(skip)
            .into_iter()
            .filter(|m| self.insert(m.clone()))
            .collect()
    }

    /// Ordered copy of the mirror, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
#[path = "history_test.rs"]
mod tests;
