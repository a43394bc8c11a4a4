use super::*;
use frames::ChatMessage;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::time::{Duration, timeout};

type ServerSocket = tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>;

/// Accept exactly one WebSocket connection and hand it to the test.
async fn one_shot_server() -> (SocketAddr, tokio::sync::oneshot::Receiver<ServerSocket>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let (tx, rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.expect("accept");
        let ws = tokio_tungstenite::accept_async(tcp).await.expect("handshake");
        let _ = tx.send(ws);
    });
    (addr, rx)
}

async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    listener.local_addr().expect("local addr")
}

fn url(addr: SocketAddr) -> String {
    format!("ws://{addr}/ws")
}

async fn recv_within(session: &mut Session) -> Option<WireMessage> {
    timeout(Duration::from_millis(500), session.recv())
        .await
        .expect("session receive timed out")
}

async fn server_send(socket: &mut ServerSocket, record: &WireMessage) {
    let text = frames::encode(record).expect("encode");
    socket.send(WsMessage::Text(text.into())).await.expect("server send");
}

fn msg(id: &str) -> ChatMessage {
    ChatMessage::new(id, "hi", frames::DEFAULT_EMOJI)
}

// =============================================================================
// WEBSOCKET
// =============================================================================

#[tokio::test]
async fn websocket_session_exchanges_json_records() {
    let (addr, accepted) = one_shot_server().await;
    let mut session = WebSocketTransport::new(url(addr)).connect().await.expect("connect");
    let mut server = accepted.await.expect("server socket");

    server_send(&mut server, &WireMessage::Init { messages: vec![msg("a")] }).await;
    match recv_within(&mut session).await {
        Some(WireMessage::Init { messages }) => assert_eq!(messages[0].id, "a"),
        other => panic!("expected init, got {other:?}"),
    }

    let outgoing = WireMessage::Chat(msg("b"));
    session.send(outgoing.clone()).await.expect("send");
    let frame = timeout(Duration::from_millis(500), server.next())
        .await
        .expect("server receive timed out")
        .expect("stream ended")
        .expect("frame error");
    let WsMessage::Text(text) = frame else {
        panic!("expected a text frame");
    };
    assert_eq!(frames::decode(text.as_str()).unwrap(), outgoing);
}

#[tokio::test]
async fn malformed_inbound_frames_are_skipped() {
    let (addr, accepted) = one_shot_server().await;
    let mut session = WebSocketTransport::new(url(addr)).connect().await.expect("connect");
    let mut server = accepted.await.expect("server socket");

    server.send(WsMessage::Text("not json".to_owned().into())).await.unwrap();
    server_send(&mut server, &WireMessage::Update { message: msg("after") }).await;

    match recv_within(&mut session).await {
        Some(WireMessage::Update { message }) => assert_eq!(message.id, "after"),
        other => panic!("expected update, got {other:?}"),
    }
}

#[tokio::test]
async fn inbound_ends_when_server_closes() {
    let (addr, accepted) = one_shot_server().await;
    let mut session = WebSocketTransport::new(url(addr)).connect().await.expect("connect");
    let mut server = accepted.await.expect("server socket");

    server.close(None).await.expect("close");
    assert!(recv_within(&mut session).await.is_none());
}

#[tokio::test]
async fn dropping_the_session_closes_the_socket() {
    let (addr, accepted) = one_shot_server().await;
    let session = WebSocketTransport::new(url(addr)).connect().await.expect("connect");
    let mut server = accepted.await.expect("server socket");

    drop(session);

    let ended = timeout(Duration::from_secs(1), async {
        loop {
            match server.next().await {
                None | Some(Err(_) | Ok(WsMessage::Close(_))) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(ended.is_ok(), "server should observe the connection ending");
}

#[tokio::test]
async fn connect_to_unreachable_relay_fails() {
    let addr = closed_port().await;
    let err = WebSocketTransport::new(url(addr)).connect().await.err().expect("connect should fail");
    assert!(matches!(err, TransportError::Connect { .. }), "got {err}");
}

// =============================================================================
// TIERED
// =============================================================================

#[tokio::test]
async fn tiered_transport_falls_through_to_next_tier() {
    let dead = closed_port().await;
    let (live, accepted) = one_shot_server().await;
    let tiered = TieredTransport::from_urls([url(dead), url(live)]);

    let mut session = tiered.connect().await.expect("second tier connects");
    let mut server = accepted.await.expect("server socket");
    server_send(&mut server, &WireMessage::Update { message: msg("via-local") }).await;
    assert!(matches!(recv_within(&mut session).await, Some(WireMessage::Update { .. })));
}

#[tokio::test]
async fn tiered_transport_reports_exhaustion() {
    let tiered = TieredTransport::from_urls([url(closed_port().await), url(closed_port().await)]);
    let err = tiered.connect().await.err().expect("all tiers fail");
    assert!(matches!(err, TransportError::Exhausted { attempts: 2, .. }), "got {err}");
}

#[tokio::test]
async fn tiered_transport_without_tiers_fails() {
    let tiered = TieredTransport::new(Vec::new());
    assert!(matches!(tiered.connect().await, Err(TransportError::NoTiers)));
}

// =============================================================================
// SESSION
// =============================================================================

#[tokio::test]
async fn send_after_peer_hangs_up_is_closed() {
    let (out_tx, out_rx) = mpsc::channel(1);
    let (_in_tx, in_rx) = mpsc::channel(1);
    let session = Session::new(out_tx, in_rx);
    drop(out_rx);
    assert!(matches!(session.send(WireMessage::Chat(msg("x"))).await, Err(TransportError::Closed)));
}
