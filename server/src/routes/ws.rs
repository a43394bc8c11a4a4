//! WebSocket handler for the chat relay connection loop.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID, joins the relay, and enters a
//! `select!` loop:
//! - Incoming client text → decode + dispatch by record type
//! - Broadcast records from the relay → forward to client
//!
//! Malformed input is logged and dropped. It never closes the connection
//! and never produces a broadcast.
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → join (snapshot + register) → send `init` to this client only
//! 2. Client sends `chat` → append + broadcast `update` to every client
//! 3. Close or socket error → part

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use frames::WireMessage;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::services;
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection channel for receiving broadcast records.
    let (client_tx, mut client_rx) = mpsc::channel::<WireMessage>(state.config.client_buffer);

    let messages = services::chat::join(&state, client_id, client_tx).await;
    info!(%client_id, "ws: client connected");

    if send_record(&mut socket, &WireMessage::Init { messages }).await.is_ok() {
        loop {
            tokio::select! {
                msg = socket.recv() => {
                    let Some(msg) = msg else { break };
                    let msg = match msg {
                        Ok(msg) => msg,
                        Err(e) => {
                            warn!(%client_id, error = %e, "ws: socket error");
                            break;
                        }
                    };
                    match msg {
                        Message::Text(text) => process_inbound_text(&state, client_id, text.as_str()).await,
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                Some(record) = client_rx.recv() => {
                    if send_record(&mut socket, &record).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    services::chat::part(&state, client_id).await;
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Decode one inbound text frame and apply it.
///
/// Kept separate from the socket loop so tests can drive dispatch without a
/// live connection.
async fn process_inbound_text(state: &AppState, client_id: Uuid, text: &str) {
    let record = match frames::decode(text) {
        Ok(record) => record,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound record");
            return;
        }
    };

    match record {
        WireMessage::Chat(message) => {
            debug!(%client_id, id = %message.id, "ws: recv chat");
            services::chat::publish(state, message).await;
        }
        other => {
            debug!(%client_id, kind = other.kind(), "ws: ignoring non-chat record");
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn send_record(socket: &mut WebSocket, record: &WireMessage) -> Result<(), ()> {
    let json = match frames::encode(record) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, "ws: failed to serialize record");
            return Err(());
        }
    };
    socket
        .send(Message::Text(json.into()))
        .await
        .map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
