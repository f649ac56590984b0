//! WebSocket transport tests against an in-process tungstenite server

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use supportchat_core::*;
use supportchat_ws::WsTransport;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

// ----------------------------------------------------------------------------
// Test Server
// ----------------------------------------------------------------------------

async fn listen() -> (TcpListener, TransportConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}/chat", listener.local_addr().unwrap());
    let mut config = TransportConfig::new(endpoint);
    config.connect_timeout = Duration::from_secs(2);
    (listener, config)
}

/// Accept one WebSocket client, returning the stream and the request URI
async fn accept_one(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
    let (tcp, _) = listener.accept().await.unwrap();
    let mut uri = String::new();
    let ws = accept_hdr_async(tcp, |req: &Request, resp: Response| -> std::result::Result<Response, ErrorResponse> {
        uri = req.uri().to_string();
        Ok(resp)
    })
    .await
    .unwrap();
    (ws, uri)
}

fn client() -> ClientId {
    ClientId::new("C1").unwrap()
}

fn agent_frame(content: &str) -> Message {
    let frame = wire::encode_inbound(Some(MessageId::generate()), &client(), content, Timestamp::now())
        .unwrap();
    Message::Text(frame)
}

// ----------------------------------------------------------------------------
// Transport
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_connect_routes_by_client_id_and_sends() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let (mut ws, uri) = accept_one(&listener).await;
        let frame = ws.next().await.unwrap().unwrap();
        (uri, frame.into_text().unwrap())
    });

    let mut transport = WsTransport::new(config);
    transport.connect(&client()).await.unwrap();
    assert!(transport.is_connected());
    assert_eq!(transport.client_id(), Some(client()));

    let msg = ChatMessage::local(client(), "hello").unwrap();
    transport.send(&msg).await.unwrap().await.unwrap();

    let (uri, text) = server.await.unwrap();
    assert_eq!(uri, "/chat?clientId=C1");
    assert_eq!(wire::decode_outbound(&text).unwrap(), msg);
}

#[tokio::test]
async fn test_second_connect_rejected() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut transport = WsTransport::new(config);
    transport.connect(&client()).await.unwrap();
    assert!(matches!(
        transport.connect(&client()).await,
        Err(ChatError::AlreadyConnected { .. })
    ));

    transport.disconnect().await.unwrap();
    assert!(!transport.is_connected());
    assert_eq!(*transport.link_state().borrow(), LinkState::Down);
    server.await.unwrap();
}

#[tokio::test]
async fn test_inbound_frames_reach_subscribers_in_order() {
    let (listener, config) = listen().await;
    let (ready_tx, ready_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        ready_rx.await.unwrap();
        ws.send(agent_frame("one")).await.unwrap();
        ws.send(Message::Text("{not json".to_string())).await.unwrap();
        ws.send(agent_frame("two")).await.unwrap();
        ws.send(agent_frame("three")).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut transport = WsTransport::new(config);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = tokio::sync::mpsc::unbounded_channel();
    let sink = Arc::clone(&seen);
    transport.subscribe(Arc::new(move |m: &ChatMessage| {
        sink.lock().unwrap().push(m.content().to_string());
        let _ = done_tx.send(());
    }));

    transport.connect(&client()).await.unwrap();
    ready_tx.send(()).unwrap();

    let mut done_rx = done_rx;
    for _ in 0..3 {
        tokio::time::timeout(Duration::from_secs(2), done_rx.recv())
            .await
            .unwrap()
            .unwrap();
    }
    assert_eq!(*seen.lock().unwrap(), vec!["one", "two", "three"]);

    transport.disconnect().await.unwrap();
    server.await.unwrap();
}

#[tokio::test]
async fn test_stalled_socket_reports_backpressure() {
    let (listener, mut config) = listen().await;
    config.outbound_buffer = 1;
    let (release_tx, release_rx) = oneshot::channel::<()>();
    // Accept the channel but never read from it
    let server = tokio::spawn(async move {
        let (_ws, _) = accept_one(&listener).await;
        let _ = release_rx.await;
    });

    let mut transport = WsTransport::new(config);
    transport.connect(&client()).await.unwrap();

    let content = "x".repeat(1024 * 1024);
    let mut refused = None;
    for _ in 0..256 {
        let msg = ChatMessage::local(client(), content.as_str()).unwrap();
        let sent = tokio::time::timeout(Duration::from_millis(500), transport.send(&msg))
            .await
            .expect("send must not wait on a stalled socket");
        if let Err(e) = sent {
            refused = Some(e);
            break;
        }
    }

    assert!(matches!(
        refused,
        Some(ChatError::Backpressure { capacity: 1 })
    ));
    assert!(transport.is_connected());

    release_tx.send(()).unwrap();
    drop(transport);
    server.await.unwrap();
}

#[tokio::test]
async fn test_refused_connection() {
    let (listener, config) = listen().await;
    drop(listener);

    let mut transport = WsTransport::new(config);
    assert!(matches!(
        transport.connect(&client()).await,
        Err(ChatError::Connection { .. })
    ));
    assert!(!transport.is_connected());
}

#[tokio::test]
async fn test_handshake_timeout() {
    let (listener, mut config) = listen().await;
    config.connect_timeout = Duration::from_millis(200);
    // Accept TCP but never complete the WebSocket handshake
    let server = tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        drop(tcp);
    });

    let mut transport = WsTransport::new(config);
    match transport.connect(&client()).await {
        Err(ChatError::Connection { reason, .. }) => assert!(reason.contains("timed out")),
        other => panic!("expected timeout, got {:?}", other),
    }
    server.abort();
}

// ----------------------------------------------------------------------------
// Sessions over WebSocket
// ----------------------------------------------------------------------------

#[tokio::test]
async fn test_session_hello_then_reply() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        let hello = ws.next().await.unwrap().unwrap().into_text().unwrap();
        let hello = wire::decode_outbound(&hello).unwrap();
        // Echo the client's own message, then reply
        let echo = wire::encode_inbound(
            Some(hello.id()),
            hello.client_id(),
            hello.content(),
            hello.timestamp(),
        )
        .unwrap();
        ws.send(Message::Text(echo)).await.unwrap();
        ws.send(agent_frame("hi there")).await.unwrap();
        while let Some(Ok(_)) = ws.next().await {}
    });

    let mut session = ChatSession::open(client(), WsTransport::new(config), SessionConfig::default())
        .await
        .unwrap();
    assert!(session.is_connected());

    match session.send_outbound("hello").await.unwrap() {
        SendOutcome::Dispatched { receipt, .. } => receipt.await.unwrap(),
        other => panic!("unexpected outcome: {:?}", other),
    }

    let reply = tokio::time::timeout(Duration::from_secs(2), session.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reply.content(), "hi there");
    assert_eq!(reply.origin(), Origin::Remote);

    let log: Vec<(&str, Origin)> = session
        .messages()
        .iter()
        .map(|m| (m.content(), m.origin()))
        .collect();
    assert_eq!(log, vec![("hello", Origin::Local), ("hi there", Origin::Remote)]);

    session.close().await;
    assert_eq!(session.state(), SessionState::Disconnected);
    server.await.unwrap();
}

#[tokio::test]
async fn test_server_close_disconnects_session() {
    let (listener, config) = listen().await;
    let server = tokio::spawn(async move {
        let (mut ws, _) = accept_one(&listener).await;
        ws.send(agent_frame("goodbye")).await.unwrap();
        ws.close(None).await.unwrap();
    });

    let mut session = ChatSession::open(client(), WsTransport::new(config), SessionConfig::default())
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_secs(2), session.recv())
        .await
        .unwrap()
        .map(|m| m.content().to_string());
    assert_eq!(first.as_deref(), Some("goodbye"));

    let next = tokio::time::timeout(Duration::from_secs(2), session.recv())
        .await
        .unwrap();
    assert!(next.is_none());
    assert_eq!(session.state(), SessionState::Disconnected);
    assert!(matches!(
        session.send_outbound("too late").await.unwrap(),
        SendOutcome::Dropped
    ));
    assert!(matches!(
        *session.transport().link_state().borrow(),
        LinkState::Dropped { .. }
    ));
    server.await.unwrap();
}
