//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! It holds the relay configuration and one `RelayState`: the bounded
//! message log plus the outbound channel of every open connection.
//!
//! Log and connection map share a single lock so that "append + broadcast"
//! and "snapshot + register" are each atomic. Every connection therefore
//! sees accepted messages in the relay's arrival order, and a joining
//! connection neither misses nor duplicates a message racing its join.

use std::collections::HashMap;
use std::sync::Arc;

use frames::WireMessage;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::RelayConfig;
use crate::store::MessageStore;

// =============================================================================
// RELAY STATE
// =============================================================================

/// Live relay state. Lost on restart.
pub struct RelayState {
    /// Authoritative bounded log.
    pub store: MessageStore,
    /// Open connections: `client_id` -> sender for outgoing records.
    pub clients: HashMap<Uuid, mpsc::Sender<WireMessage>>,
}

impl RelayState {
    #[must_use]
    pub fn new(max_messages: usize) -> Self {
        Self { store: MessageStore::new(max_messages), clients: HashMap::new() }
    }
}

// =============================================================================
// APP STATE
// =============================================================================

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RelayConfig>,
    pub relay: Arc<RwLock<RelayState>>,
}

impl AppState {
    #[must_use]
    pub fn new(config: RelayConfig) -> Self {
        let relay = RelayState::new(config.max_messages);
        Self { config: Arc::new(config), relay: Arc::new(RwLock::new(relay)) }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "state_test.rs"]
mod tests;
