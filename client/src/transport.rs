//! Relay transports.
//!
//! DESIGN
//! ======
//! A [`Transport`] produces a [`Session`]: an outbound channel of records to
//! send and an inbound channel of records received. When the inbound
//! channel closes, the connection is over. Dropping a session aborts its
//! I/O tasks, which closes the underlying socket.
//!
//! `WebSocketTransport` speaks JSON text frames to one relay URL.
//! `TieredTransport` tries several transports in order (a hosted relay
//! first, the local relay second) and returns the first session that
//! connects.

use async_trait::async_trait;
use frames::WireMessage;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// Records buffered in each direction of a session.
const SESSION_BUFFER: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket connect to {url} failed: {source}")]
    Connect {
        url: String,
        #[source]
        source: Box<tokio_tungstenite::tungstenite::Error>,
    },
    #[error("no transports configured")]
    NoTiers,
    #[error("all {attempts} transports failed; last error: {last}")]
    Exhausted { attempts: usize, last: Box<TransportError> },
    #[error("connection closed")]
    Closed,
}

// =============================================================================
// SESSION
// =============================================================================

/// One live connection.
pub struct Session {
    outbound: mpsc::Sender<WireMessage>,
    inbound: mpsc::Receiver<WireMessage>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Wrap a pair of channels. Transports that run I/O tasks attach them
    /// with [`Session::with_task`].
    #[must_use]
    pub fn new(outbound: mpsc::Sender<WireMessage>, inbound: mpsc::Receiver<WireMessage>) -> Self {
        Self { outbound, inbound, tasks: Vec::new() }
    }

    #[must_use]
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.tasks.push(task);
        self
    }

    /// Handle for sending records on this session.
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<WireMessage> {
        self.outbound.clone()
    }

    /// Queue a record for sending.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the connection is gone.
    pub async fn send(&self, record: WireMessage) -> Result<(), TransportError> {
        self.outbound.send(record).await.map_err(|_| TransportError::Closed)
    }

    /// Next inbound record, or `None` once the connection has ended.
    pub async fn recv(&mut self) -> Option<WireMessage> {
        self.inbound.recv().await
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

// =============================================================================
// TRANSPORT
// =============================================================================

#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new session.
    async fn connect(&self) -> Result<Session, TransportError>;
}

/// Transport over a single relay WebSocket URL.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Session, TransportError> {
        let (stream, _) = tokio_tungstenite::connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect { url: self.url.clone(), source: Box::new(e) })?;
        info!(url = %self.url, "transport: websocket connected");

        let (mut sink, mut source) = stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<WireMessage>(SESSION_BUFFER);
        let (in_tx, in_rx) = mpsc::channel::<WireMessage>(SESSION_BUFFER);

        let writer = tokio::spawn(async move {
            while let Some(record) = out_rx.recv().await {
                let text = match frames::encode(&record) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "transport: failed to encode record");
                        continue;
                    }
                };
                if let Err(e) = sink.send(WsMessage::Text(text.into())).await {
                    warn!(error = %e, "transport: websocket send failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        let url = self.url.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = source.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => match frames::decode(text.as_str()) {
                        Ok(record) => {
                            if in_tx.send(record).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => warn!(error = %e, "transport: dropping malformed record"),
                    },
                    Ok(WsMessage::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "transport: websocket receive failed");
                        break;
                    }
                }
            }
            debug!(%url, "transport: websocket reader finished");
        });

        Ok(Session::new(out_tx, in_rx).with_task(writer).with_task(reader))
    }
}

/// Tries each transport in order and returns the first session.
pub struct TieredTransport {
    tiers: Vec<Box<dyn Transport>>,
}

impl TieredTransport {
    #[must_use]
    pub fn new(tiers: Vec<Box<dyn Transport>>) -> Self {
        Self { tiers }
    }

    /// One WebSocket tier per URL, in order.
    pub fn from_urls<I, S>(urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tiers = urls
            .into_iter()
            .map(|url| Box::new(WebSocketTransport::new(url)) as Box<dyn Transport>)
            .collect();
        Self { tiers }
    }
}

#[async_trait]
impl Transport for TieredTransport {
    async fn connect(&self) -> Result<Session, TransportError> {
        let mut last = None;
        for (tier, transport) in self.tiers.iter().enumerate() {
            match transport.connect().await {
                Ok(session) => {
                    debug!(tier, "transport: tier connected");
                    return Ok(session);
                }
                Err(e) => {
                    warn!(tier, error = %e, "transport: tier unavailable");
                    last = Some(e);
                }
            }
        }
        match last {
            Some(last) => Err(TransportError::Exhausted { attempts: self.tiers.len(), last: Box::new(last) }),
            None => Err(TransportError::NoTiers),
        }
    }
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
