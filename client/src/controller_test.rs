use super::*;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;
use tokio::time::timeout;

use crate::transport::Session;

// =============================================================================
// TEST DOUBLES
// =============================================================================

/// Relay side of an in-memory session.
struct Remote {
    to_client: mpsc::Sender<WireMessage>,
    from_client: mpsc::Receiver<WireMessage>,
}

impl Remote {
    async fn push(&self, record: WireMessage) {
        self.to_client.send(record).await.expect("controller hung up");
    }

    async fn next_sent(&mut self) -> WireMessage {
        timeout(Duration::from_millis(500), self.from_client.recv())
            .await
            .expect("nothing forwarded")
            .expect("controller closed the session")
    }

    async fn assert_nothing_sent(&mut self) {
        assert!(timeout(Duration::from_millis(80), self.from_client.recv()).await.is_err());
    }
}

fn session_pair() -> (Session, Remote) {
    session_pair_with_buffer(16)
}

fn session_pair_with_buffer(buffer: usize) -> (Session, Remote) {
    let (out_tx, out_rx) = mpsc::channel(buffer);
    let (in_tx, in_rx) = mpsc::channel(16);
    (Session::new(out_tx, in_rx), Remote { to_client: in_tx, from_client: out_rx })
}

/// Hands out queued sessions; fails once the queue is empty.
#[derive(Default)]
struct ScriptedTransport {
    sessions: std::sync::Mutex<VecDeque<Option<Session>>>,
    attempts: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    fn with(outcomes: Vec<Option<Session>>) -> Self {
        Self { sessions: std::sync::Mutex::new(outcomes.into()), attempts: Arc::default() }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn connect(&self) -> Result<Session, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let next = self.sessions.lock().unwrap().pop_front().flatten();
        next.ok_or(TransportError::Closed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Event {
    Message(String),
    Status(Status),
}

#[derive(Default)]
struct RecordingRenderer {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingRenderer {
    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn rendered_ids(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Message(id) => Some(id),
                Event::Status(_) => None,
            })
            .collect()
    }

    fn statuses(&self) -> Vec<Status> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Event::Status(s) => Some(s),
                Event::Message(_) => None,
            })
            .collect()
    }

    async fn wait_for_messages(&self, count: usize) {
        timeout(Duration::from_millis(500), async {
            while self.rendered_ids().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("messages were not rendered in time");
    }
}

impl Renderer for RecordingRenderer {
    fn on_message_rendered(&self, message: &ChatMessage) {
        self.events.lock().unwrap().push(Event::Message(message.id.clone()));
    }

    fn on_status_changed(&self, status: Status) {
        self.events.lock().unwrap().push(Event::Status(status));
    }
}

fn dev_config() -> ClientConfig {
    ClientConfig { reconnect_delay: Duration::from_secs(60), ..ClientConfig::default() }
}

fn prod_config() -> ClientConfig {
    ClientConfig { production: true, ..ClientConfig::default() }
}

fn msg(id: &str) -> ChatMessage {
    ChatMessage::new(id, format!("text {id}"), frames::DEFAULT_EMOJI)
}

async fn wait_state(controller: &ChatController, want: ConnectionState) {
    let mut rx = controller.watch_state();
    timeout(Duration::from_millis(500), rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("controller never reached {want:?}"))
        .expect("state channel closed");
}

/// Controller connected to one in-memory session.
async fn connected(config: ClientConfig) -> (ChatController, Remote, Arc<RecordingRenderer>) {
    let (session, remote) = session_pair();
    let renderer = Arc::new(RecordingRenderer::default());
    let controller = ChatController::start(config, ScriptedTransport::with(vec![Some(session)]), renderer.clone());
    wait_state(&controller, ConnectionState::Connected).await;
    (controller, remote, renderer)
}

fn sent_message(outcome: SendOutcome) -> ChatMessage {
    match outcome {
        SendOutcome::Sent(message) => message,
        other => panic!("expected Sent, got {other:?}"),
    }
}

// =============================================================================
// INBOUND
// =============================================================================

#[tokio::test]
async fn init_snapshot_is_rendered_in_order() {
    let (controller, remote, renderer) = connected(dev_config()).await;
    remote.push(WireMessage::Init { messages: vec![msg("m1"), msg("m2")] }).await;
    renderer.wait_for_messages(2).await;

    assert_eq!(renderer.rendered_ids(), ["m1", "m2"]);
    assert_eq!(renderer.statuses(), [Status::Connected]);
    assert_eq!(controller.history().await.len(), 2);
}

#[tokio::test]
async fn duplicate_delivery_renders_once() {
    let (controller, remote, renderer) = connected(dev_config()).await;
    remote.push(WireMessage::Init { messages: vec![msg("a")] }).await;
    remote.push(WireMessage::Update { message: msg("a") }).await;
    remote.push(WireMessage::Chat(msg("a"))).await;
    remote.push(WireMessage::Update { message: msg("b") }).await;
    renderer.wait_for_messages(2).await;

    assert_eq!(renderer.rendered_ids(), ["a", "b"]);
    assert_eq!(controller.history().await.len(), 2);
}

#[tokio::test]
async fn broadcast_order_is_render_order() {
    let (_controller, remote, renderer) = connected(dev_config()).await;
    remote.push(WireMessage::Update { message: msg("A") }).await;
    remote.push(WireMessage::Update { message: msg("B") }).await;
    renderer.wait_for_messages(2).await;
    assert_eq!(renderer.rendered_ids(), ["A", "B"]);
}

#[tokio::test]
async fn mirror_keeps_only_the_newest_messages() {
    let config = ClientConfig { history_limit: 2, ..dev_config() };
    let (controller, remote, renderer) = connected(config).await;
    remote.push(WireMessage::Init { messages: vec![msg("m1"), msg("m2"), msg("m3")] }).await;
    renderer.wait_for_messages(2).await;

    let ids: Vec<String> = controller.history().await.into_iter().map(|m| m.id).collect();
    assert_eq!(ids, ["m2", "m3"]);
    assert_eq!(renderer.rendered_ids(), ["m2", "m3"]);
}

/// Connect, receive `init`, lose the relay, reconnect and receive the same
/// `init` again. Returns what was rendered and the final mirror.
async fn replay_init_across_reconnect(history_limit: usize, snapshot: &[&str]) -> (Vec<String>, Vec<String>) {
    let (first, first_remote) = session_pair();
    let (second, second_remote) = session_pair();
    let renderer = Arc::new(RecordingRenderer::default());
    let config = ClientConfig { history_limit, reconnect_delay: Duration::from_millis(20), ..ClientConfig::default() };
    let controller = ChatController::start(config, ScriptedTransport::with(vec![Some(first), Some(second)]), renderer.clone());
    let init = || WireMessage::Init { messages: snapshot.iter().map(|id| msg(id)).collect() };
    let expected = snapshot.len().min(history_limit);

    wait_state(&controller, ConnectionState::Connected).await;
    first_remote.push(init()).await;
    renderer.wait_for_messages(expected).await;

    drop(first_remote);
    timeout(Duration::from_millis(500), async {
        while renderer.statuses().iter().filter(|s| **s == Status::Connected).count() < 2 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("controller should reconnect");

    second_remote.push(init()).await;
    second_remote.push(WireMessage::Update { message: msg("after") }).await;
    renderer.wait_for_messages(expected + 1).await;

    let history = controller.history().await.into_iter().map(|m| m.id).collect();
    (renderer.rendered_ids(), history)
}

#[tokio::test]
async fn reconnect_init_does_not_rerender_known_messages() {
    let (rendered, history) = replay_init_across_reconnect(10, &["a", "b"]).await;
    assert_eq!(rendered, ["a", "b", "after"]);
    assert_eq!(history, ["a", "b", "after"]);
}

#[tokio::test]
async fn reconnect_init_larger_than_mirror_renders_each_message_once() {
    let (rendered, history) = replay_init_across_reconnect(2, &["m1", "m2", "m3"]).await;
    assert_eq!(rendered, ["m2", "m3", "after"]);
    assert_eq!(history, ["m3", "after"]);
}

// =============================================================================
// SEND
// =============================================================================

#[tokio::test]
async fn send_forwards_chat_and_waits_for_echo() {
    let (controller, mut remote, renderer) = connected(dev_config()).await;

    let message = sent_message(controller.send_message("hello", None).await.unwrap());
    assert_eq!(message.text, "hello");
    assert_eq!(message.emoji, frames::DEFAULT_EMOJI);
    assert!(!message.filtered);
    assert_eq!(remote.next_sent().await, WireMessage::Chat(message.clone()));

    // Nothing rendered until the relay echoes it back.
    assert!(renderer.rendered_ids().is_empty());
    remote.push(WireMessage::Update { message: message.clone() }).await;
    renderer.wait_for_messages(1).await;
    assert_eq!(renderer.rendered_ids(), [message.id]);
}

#[tokio::test]
async fn explicit_emoji_is_kept() {
    let (controller, _remote, _renderer) = connected(dev_config()).await;
    let message = sent_message(controller.send_message("launch", Some("🚀")).await.unwrap());
    assert_eq!(message.emoji, "🚀");
}

#[tokio::test]
async fn second_send_inside_interval_is_rate_limited() {
    let (controller, mut remote, _renderer) = connected(dev_config()).await;

    sent_message(controller.send_message("first", None).await.unwrap());
    let second = controller.send_message("second", None).await.unwrap();
    assert!(matches!(second, SendOutcome::Rejected(Rejection::RateLimited { .. })), "got {second:?}");

    let _ = remote.next_sent().await;
    remote.assert_nothing_sent().await;
}

#[tokio::test]
async fn repeated_characters_are_never_forwarded() {
    let (controller, mut remote, renderer) = connected(dev_config()).await;

    let outcome = controller.send_message("nooooo", None).await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected(Rejection::RepeatedChars { max: 3 }));
    remote.assert_nothing_sent().await;
    assert!(renderer.rendered_ids().is_empty());
}

#[tokio::test]
async fn long_text_is_truncated_by_default() {
    let config = ClientConfig {
        admission: admission::AdmissionConfig { max_length: 5, ..admission::AdmissionConfig::default() },
        ..dev_config()
    };
    let (controller, _remote, _renderer) = connected(config).await;
    let message = sent_message(controller.send_message("hello world", None).await.unwrap());
    assert_eq!(message.text, "hello");
}

#[tokio::test]
async fn long_text_is_rejected_in_reject_mode() {
    let config = ClientConfig {
        admission: admission::AdmissionConfig {
            max_length: 5,
            overflow: Overflow::Reject,
            ..admission::AdmissionConfig::default()
        },
        ..dev_config()
    };
    let (controller, mut remote, _renderer) = connected(config).await;
    let outcome = controller.send_message("hello world", None).await.unwrap();
    assert_eq!(outcome, SendOutcome::Rejected(Rejection::TooLong { max: 5 }));
    remote.assert_nothing_sent().await;
}

#[tokio::test]
async fn blocked_words_are_masked_and_flagged() {
    let config = ClientConfig { blocked_words: vec!["bad".to_owned()], ..dev_config() };
    let (controller, _remote, _renderer) = connected(config).await;
    let message = sent_message(controller.send_message("so b4d", None).await.unwrap());
    assert_eq!(message.text, "so ***");
    assert!(message.filtered);
}

#[tokio::test]
async fn forward_failure_reports_error() {
    let (controller, remote, renderer) = connected(dev_config()).await;
    let Remote { to_client, from_client } = remote;
    drop(from_client);

    let err = controller.send_message("into the void", None).await.unwrap_err();
    assert!(matches!(err, SendError::Transport(TransportError::Closed)));
    assert_eq!(renderer.statuses(), [Status::Connected, Status::Error]);
    drop(to_client);
}

#[tokio::test]
async fn send_without_connection_is_a_no_op() {
    let renderer = Arc::new(RecordingRenderer::default());
    let controller = ChatController::start(dev_config(), ScriptedTransport::default(), renderer.clone());
    wait_state(&controller, ConnectionState::Disconnected).await;

    assert_eq!(controller.send_message("anyone?", None).await.unwrap(), SendOutcome::NotConnected);
    assert!(renderer.rendered_ids().is_empty());
    assert_eq!(renderer.statuses(), [Status::Error]);
}

// =============================================================================
// RECONNECT AND FALLBACK
// =============================================================================

#[tokio::test]
async fn dev_mode_reconnects_after_delay() {
    let (session, remote) = session_pair();
    let transport = ScriptedTransport::with(vec![None, Some(session)]);
    let attempts = Arc::clone(&transport.attempts);
    let renderer = Arc::new(RecordingRenderer::default());
    let config = ClientConfig { reconnect_delay: Duration::from_millis(20), ..ClientConfig::default() };
    let controller = ChatController::start(config, transport, renderer.clone());

    wait_state(&controller, ConnectionState::Connected).await;
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    assert_eq!(renderer.statuses(), [Status::Error, Status::Connected]);

    // Relay goes away: back to Disconnected, then another attempt.
    drop(remote);
    wait_state(&controller, ConnectionState::Disconnected).await;
    timeout(Duration::from_millis(500), async {
        while attempts.load(Ordering::SeqCst) < 3 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("controller should retry");
}

#[tokio::test]
async fn production_connect_error_enters_static_mode() {
    let transport = ScriptedTransport::default();
    let attempts = Arc::clone(&transport.attempts);
    let renderer = Arc::new(RecordingRenderer::default());
    let controller = ChatController::start(prod_config(), transport, renderer.clone());

    wait_state(&controller, ConnectionState::StaticFallback).await;
    renderer.wait_for_messages(3).await;
    assert_eq!(renderer.statuses(), [Status::Error, Status::StaticMode]);
    assert_eq!(renderer.rendered_ids(), ["static-welcome-1", "static-welcome-2", "static-welcome-3"]);

    let outcome = controller.send_message("hello?", Some("💫")).await.unwrap();
    let SendOutcome::Local(message) = outcome else {
        panic!("expected a local message");
    };
    assert_eq!(message.text, "hello?");
    assert_eq!(renderer.rendered_ids().last(), Some(&message.id));

    // Static sends skip the rate limit.
    assert!(matches!(controller.send_message("again", None).await.unwrap(), SendOutcome::Local(_)));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn production_disconnect_enters_static_mode() {
    let (controller, remote, renderer) = connected(prod_config()).await;
    drop(remote);

    wait_state(&controller, ConnectionState::StaticFallback).await;
    assert_eq!(renderer.statuses(), [Status::Connected, Status::Disconnected, Status::StaticMode]);
}

// =============================================================================
// SHUTDOWN
// =============================================================================

#[tokio::test]
async fn shutdown_closes_the_session_and_marks_disconnected() {
    let (controller, remote, _renderer) = connected(dev_config()).await;

    controller.shutdown();
    assert_eq!(controller.state(), ConnectionState::Disconnected);
    timeout(Duration::from_millis(500), remote.to_client.closed())
        .await
        .expect("session should be dropped");
    assert_eq!(controller.send_message("late", None).await.unwrap(), SendOutcome::NotConnected);

    // Idempotent.
    controller.shutdown();
}

#[tokio::test]
async fn shutdown_during_a_blocked_forward_is_not_reported_as_sent() {
    let (session, mut remote) = session_pair_with_buffer(1);
    let renderer = Arc::new(RecordingRenderer::default());
    let config = ClientConfig {
        admission: admission::AdmissionConfig { min_interval: Duration::ZERO, ..admission::AdmissionConfig::default() },
        ..dev_config()
    };
    let controller = ChatController::start(config, ScriptedTransport::with(vec![Some(session)]), renderer.clone());
    wait_state(&controller, ConnectionState::Connected).await;

    // Fill the one-slot outbound buffer so the next forward blocks.
    sent_message(controller.send_message("first", None).await.unwrap());

    let (blocked, ()) = tokio::join!(controller.send_message("second", None), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        controller.shutdown();
        let _ = remote.from_client.recv().await;
    });

    let err = blocked.unwrap_err();
    assert!(matches!(err, SendError::Transport(TransportError::Closed)));
    assert_eq!(renderer.statuses().last(), Some(&Status::Error));
}

#[tokio::test]
async fn shutdown_cancels_pending_reconnect() {
    let transport = ScriptedTransport::default();
    let attempts = Arc::clone(&transport.attempts);
    let renderer = Arc::new(RecordingRenderer::default());
    let config = ClientConfig { reconnect_delay: Duration::from_millis(30), ..ClientConfig::default() };
    let controller = ChatController::start(config, transport, renderer);
    wait_state(&controller, ConnectionState::Disconnected).await;

    drop(controller);
    let seen = attempts.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(120)).await;
    assert_eq!(attempts.load(Ordering::SeqCst), seen);
}

#[tokio::test]
async fn static_mode_survives_shutdown() {
    let renderer = Arc::new(RecordingRenderer::default());
    let controller = ChatController::start(prod_config(), ScriptedTransport::default(), renderer);
    wait_state(&controller, ConnectionState::StaticFallback).await;

    controller.shutdown();
    assert_eq!(controller.state(), ConnectionState::StaticFallback);
}
