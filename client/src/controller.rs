//! Chat client controller.
//!
//! LIFECYCLE
//! =========
//! `start` spawns one driver task that owns the connection:
//!
//! ```text
//! Connecting --connect ok--> Connected --stream ends--> Disconnected
//!     ^                                                  |
//!     +------------- reconnect_delay (dev) --------------+
//!
//! any failure in production --> StaticFallback (terminal)
//! ```
//!
//! While connected, inbound `init` snapshots are merged into the local
//! mirror and `update`/`chat` records are inserted one at a time. Only
//! messages new to the mirror reach the renderer, so a message delivered
//! twice is shown once.
//!
//! DESIGN
//! ======
//! Session state (outbound handle, mirror, admission policy) lives behind
//! one async mutex. `send_message` holds it across the forward, so two
//! concurrent sends are serialized and cannot both slip past the rate
//! limit. The renderer is called after the lock is released.
//!
//! The sender does not render its own message on send; it appears when the
//! relay's broadcast comes back, in relay order.
//!
//! Status callbacks fire before the matching state is published, so a
//! watcher that sees a new state knows the renderer has already been told.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use frames::{ChatMessage, WireMessage};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admission::{self, AdmissionPolicy, Overflow, Rejection};
use crate::config::ClientConfig;
use crate::fallback;
use crate::filter::ContentFilter;
use crate::history::History;
use crate::render::{Renderer, Status};
use crate::transport::{Transport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    Disconnected,
    StaticFallback,
}

/// Result of a send that did not hit a transport failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    /// Forwarded to the relay. It renders when the broadcast echo arrives.
    Sent(ChatMessage),
    /// Static mode: rendered locally, nothing left this process.
    Local(ChatMessage),
    /// The admission policy refused the message. Nothing was sent.
    Rejected(Rejection),
    /// No live connection and not in static mode.
    NotConnected,
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to forward message: {0}")]
    Transport(#[from] TransportError),
}

// =============================================================================
// SHARED STATE
// =============================================================================

struct SessionState {
    outbound: Option<mpsc::Sender<WireMessage>>,
    history: History,
    admission: AdmissionPolicy,
}

struct Shared {
    config: ClientConfig,
    renderer: Arc<dyn Renderer>,
    filter: ContentFilter,
    session: Mutex<SessionState>,
    state: watch::Sender<ConnectionState>,
    stopped: AtomicBool,
}

impl Shared {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Publish a state change unless the controller has been shut down.
    fn set_state(&self, next: ConnectionState) {
        self.state.send_if_modified(|current| {
            if self.stopped.load(Ordering::SeqCst) || *current == next {
                return false;
            }
            *current = next;
            true
        });
    }

    /// Insert messages into the mirror and render the new ones, in order.
    async fn merge(&self, messages: Vec<ChatMessage>) {
        let fresh: Vec<ChatMessage> = {
            let mut session = self.session.lock().await;
            messages.into_iter().filter(|m| session.history.insert(m.clone())).collect()
        };
        self.render_all(&fresh);
    }

    /// Merge a relay snapshot. Only its newest `history_limit` entries can
    /// be visible, so older ones are never rendered.
    async fn merge_snapshot(&self, messages: Vec<ChatMessage>) {
        let fresh = self.session.lock().await.history.merge_snapshot(messages);
        self.render_all(&fresh);
    }

    fn render_all(&self, messages: &[ChatMessage]) {
        for message in messages {
            self.renderer.on_message_rendered(message);
        }
    }

    async fn apply(&self, record: WireMessage) {
        match record {
            WireMessage::Init { messages } => {
                debug!(count = messages.len(), "chat: init snapshot received");
                self.merge_snapshot(messages).await;
            }
            WireMessage::Update { message } | WireMessage::Chat(message) => {
                self.merge(vec![message]).await;
            }
        }
    }

    async fn enter_static_mode(&self) {
        info!("chat: entering static mode");
        self.renderer.on_status_changed(Status::StaticMode);
        self.merge(fallback::welcome_messages()).await;
        self.set_state(ConnectionState::StaticFallback);
    }
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct ChatController {
    shared: Arc<Shared>,
    driver: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl ChatController {
    /// Spawn the connection driver on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start<T>(config: ClientConfig, transport: T, renderer: Arc<dyn Renderer>) -> Self
    where
        T: Transport + 'static,
    {
        let filter = ContentFilter::new(&config.blocked_words);
        let session = SessionState {
            outbound: None,
            history: History::new(config.history_limit),
            admission: AdmissionPolicy::new(config.admission),
        };
        let (state, _) = watch::channel(ConnectionState::Connecting);
        let shared = Arc::new(Shared {
            config,
            renderer,
            filter,
            session: Mutex::new(session),
            state,
            stopped: AtomicBool::new(false),
        });

        let driver = tokio::spawn(run_driver(Arc::clone(&shared), Box::new(transport)));
        Self { shared, driver: std::sync::Mutex::new(Some(driver)) }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Ordered copy of the local mirror, oldest first.
    pub async fn history(&self) -> Vec<ChatMessage> {
        self.shared.session.lock().await.history.snapshot()
    }

    /// Compose and send a message.
    ///
    /// `emoji` falls back to the configured default when absent or blank.
    ///
    /// # Errors
    ///
    /// Returns [`SendError::Transport`] when the connection dropped, or the
    /// controller shut down, before the message could be forwarded. The
    /// renderer sees `Status::Error`.
    pub async fn send_message(&self, text: &str, emoji: Option<&str>) -> Result<SendOutcome, SendError> {
        let shared = &self.shared;
        let cfg = &shared.config;
        let emoji = emoji
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .unwrap_or(&cfg.default_emoji);

        let mut session = shared.session.lock().await;

        if shared.state() == ConnectionState::StaticFallback {
            let message = fallback::local_message(admission::truncate(text, cfg.admission.max_length), emoji);
            let fresh = session.history.insert(message.clone());
            drop(session);
            if fresh {
                shared.renderer.on_message_rendered(&message);
            }
            return Ok(SendOutcome::Local(message));
        }

        let Some(outbound) = session.outbound.clone() else {
            return Ok(SendOutcome::NotConnected);
        };
        if shared.state() != ConnectionState::Connected || shared.stopped.load(Ordering::SeqCst) {
            return Ok(SendOutcome::NotConnected);
        }

        let (filtered_text, filtered) = shared.filter.apply(text);
        let text = match cfg.admission.overflow {
            Overflow::Truncate => admission::truncate(&filtered_text, cfg.admission.max_length),
            Overflow::Reject => filtered_text,
        };
        if let Err(reason) = session.admission.check(&text) {
            debug!(%reason, "chat: message rejected");
            return Ok(SendOutcome::Rejected(reason));
        }

        let message = ChatMessage::new(Uuid::new_v4().to_string(), text, emoji).with_filtered(filtered);
        let forwarded = outbound.send(WireMessage::Chat(message.clone())).await.is_ok();
        // A shutdown during the forward aborts the writer; the record may never leave.
        if !forwarded || shared.stopped.load(Ordering::SeqCst) {
            drop(session);
            warn!(id = %message.id, "chat: forward failed, connection gone");
            shared.renderer.on_status_changed(Status::Error);
            return Err(SendError::Transport(TransportError::Closed));
        }
        session.admission.record_sent();
        debug!(id = %message.id, filtered, "chat: message forwarded");
        Ok(SendOutcome::Sent(message))
    }

    /// Stop the driver, cancel any pending reconnect and drop the
    /// connection. Idempotent. Static mode survives shutdown.
    pub fn shutdown(&self) {
        let handle = self
            .driver
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        self.shared.stopped.store(true, Ordering::SeqCst);
        handle.abort();

        self.shared.state.send_if_modified(|current| {
            if *current == ConnectionState::StaticFallback || *current == ConnectionState::Disconnected {
                return false;
            }
            *current = ConnectionState::Disconnected;
            true
        });
        if let Ok(mut session) = self.shared.session.try_lock() {
            session.outbound = None;
        }
        info!("chat: controller shut down");
    }
}

impl Drop for ChatController {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// =============================================================================
// DRIVER
// =============================================================================

async fn run_driver(shared: Arc<Shared>, transport: Box<dyn Transport>) {
    loop {
        shared.set_state(ConnectionState::Connecting);

        match transport.connect().await {
            Ok(mut session) => {
                shared.session.lock().await.outbound = Some(session.sender());
                shared.renderer.on_status_changed(Status::Connected);
                shared.set_state(ConnectionState::Connected);
                info!("chat: connected");

                while let Some(record) = session.recv().await {
                    shared.apply(record).await;
                }

                shared.session.lock().await.outbound = None;
                drop(session);
                shared.renderer.on_status_changed(Status::Disconnected);
                shared.set_state(ConnectionState::Disconnected);
                info!("chat: disconnected");
            }
            Err(e) => {
                warn!(error = %e, "chat: connect failed");
                shared.renderer.on_status_changed(Status::Error);
                if !shared.config.production {
                    shared.set_state(ConnectionState::Disconnected);
                }
            }
        }

        if shared.config.production {
            shared.enter_static_mode().await;
            return;
        }

        debug!(delay = ?shared.config.reconnect_delay, "chat: reconnecting after delay");
        tokio::time::sleep(shared.config.reconnect_delay).await;
    }
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
