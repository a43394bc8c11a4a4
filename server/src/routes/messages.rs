//! Read-only history query for clients that do not open a socket.

use axum::Json;
use axum::extract::State;
use frames::ChatMessage;

use crate::services;
use crate::state::AppState;

/// `GET /api/messages`: the current snapshot, oldest first.
pub async fn list_messages(State(state): State<AppState>) -> Json<Vec<ChatMessage>> {
    Json(services::chat::history(&state).await)
}
