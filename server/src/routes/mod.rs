//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! This module binds the relay socket, the history query, and a health
//! probe under a single Axum router. When a website directory is
//! configured, it is served as static files for every other path.

pub mod messages;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the relay router.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let website_dir = state.config.website_dir.clone();

    let router = Router::new()
        .route("/ws", get(ws::handle_ws))
        .route("/api/messages", get(messages::list_messages))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    match website_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir).append_index_html_on_directories(true)),
        None => router,
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "messages_test.rs"]
mod tests;
