//! Bounded, append-only message log.
//!
//! DESIGN
//! ======
//! The relay keeps the most recent `capacity` messages in arrival order.
//! Overflow evicts from the front (FIFO). Nothing is validated here; the
//! WebSocket layer only appends records that decoded as `chat`.
//!
//! Nothing is persisted. A restart loses the log.

use std::collections::VecDeque;

use frames::ChatMessage;

#[derive(Debug, Clone)]
pub struct MessageStore {
    messages: VecDeque<ChatMessage>,
    capacity: usize,
}

impl MessageStore {
    /// Create an empty store. A zero capacity is clamped to one.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { messages: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append a message, evicting the oldest entries past capacity.
    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push_back(message);
        while self.messages.len() > self.capacity {
            self.messages.pop_front();
        }
    }

    /// Ordered copy of the retained messages, oldest first.
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

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
