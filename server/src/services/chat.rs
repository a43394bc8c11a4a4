//! Chat service: connection membership, append with broadcast, and history.
//!
//! DESIGN
//! ======
//! Every operation takes the relay lock once. `join` snapshots the log and
//! registers the connection in the same critical section; `publish` appends
//! and fans out in the same critical section. Handlers never touch the
//! store or the connection map directly.
//!
//! Broadcast is best effort: a connection whose buffer is full or whose
//! receiver is gone is skipped, never failed. Closed connections are
//! removed by `part` when their socket loop ends.

use frames::{ChatMessage, WireMessage};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::state::{AppState, RelayState};

/// Register a connection and return the snapshot it should be sent.
pub async fn join(state: &AppState, client_id: Uuid, tx: mpsc::Sender<WireMessage>) -> Vec<ChatMessage> {
    let mut relay = state.relay.write().await;
    let snapshot = relay.store.snapshot();
    relay.clients.insert(client_id, tx);
    info!(%client_id, clients = relay.clients.len(), replay = snapshot.len(), "chat: client joined");
    snapshot
}

/// Remove a connection's bookkeeping. The log is untouched.
pub async fn part(state: &AppState, client_id: Uuid) {
    let mut relay = state.relay.write().await;
    if relay.clients.remove(&client_id).is_some() {
        info!(%client_id, clients = relay.clients.len(), "chat: client parted");
    }
}

/// Append a message and broadcast it as an `update` to every connection,
/// including the sender.
pub async fn publish(state: &AppState, message: ChatMessage) {
    let mut relay = state.relay.write().await;
    relay.store.append(message.clone());
    info!(id = %message.id, retained = relay.store.len(), capacity = relay.store.capacity(), "chat: message appended");
    broadcast(&relay, &WireMessage::Update { message });
}

/// Current snapshot of the log, oldest first.
pub async fn history(state: &AppState) -> Vec<ChatMessage> {
    state.relay.read().await.store.snapshot()
}

/// Send a record to every registered connection. Caller holds the lock.
pub fn broadcast(relay: &RelayState, record: &WireMessage) {
    for (client_id, tx) in &relay.clients {
        if let Err(e) = tx.try_send(record.clone()) {
            debug!(%client_id, error = %e, "chat: broadcast skipped connection");
        }
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
