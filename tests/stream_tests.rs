//! End-to-end tests for the streaming client against a local WebSocket
//! server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use voxstream::session::Session;
use voxstream::settings::Settings;
use voxstream::streaming::{
    ClientConfig, ConnectionState, ControlAction, EventReceiver, StreamClient, StreamEvent,
    StreamHandle,
};

const WAIT: Duration = Duration::from_secs(5);

async fn bind_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    (listener, endpoint)
}

async fn accept_ws(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("no client connected")
        .unwrap();
    timeout(WAIT, tokio_tungstenite::accept_async(stream))
        .await
        .expect("handshake timed out")
        .unwrap()
}

fn test_config(endpoint: &str) -> ClientConfig {
    ClientConfig {
        endpoint: endpoint.to_string(),
        reconnect_delay: Duration::from_millis(100),
    }
}

async fn wait_for_state(handle: &StreamHandle, want: ConnectionState) {
    let mut rx = handle.state_watch();
    timeout(WAIT, rx.wait_for(|s| *s == want))
        .await
        .unwrap_or_else(|_| panic!("timed out waiting for state {:?}", want))
        .expect("streaming task ended");
}

async fn next_event(events: &mut EventReceiver) -> StreamEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

async fn next_transcript(events: &mut EventReceiver) -> String {
    loop {
        if let StreamEvent::Transcript(text) = next_event(events).await {
            return text;
        }
    }
}

/// Read the next data-bearing message, skipping pings.
async fn next_data_message(server: &mut WebSocketStream<TcpStream>) -> Message {
    loop {
        let msg = timeout(WAIT, server.next())
            .await
            .expect("timed out waiting for client message")
            .expect("connection ended")
            .unwrap();
        match msg {
            Message::Ping(_) | Message::Pong(_) => continue,
            other => return other,
        }
    }
}

#[tokio::test]
async fn test_client_opens_connection() {
    let (listener, endpoint) = bind_server().await;
    let (client, mut events) = StreamClient::spawn(test_config(&endpoint));
    let handle = client.handle();

    let _server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    assert!(matches!(next_event(&mut events).await, StreamEvent::Connected));

    client.shutdown().await;
}

#[tokio::test]
async fn test_frames_reach_server_in_order() {
    let (listener, endpoint) = bind_server().await;
    let (client, _events) = StreamClient::spawn(test_config(&endpoint));
    let handle = client.handle();

    let mut server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    handle.send_frame(vec![0x01, 0x02, 0x03, 0x04]);
    handle.send_frame(vec![0xaa, 0xbb]);

    assert_eq!(
        next_data_message(&mut server).await,
        Message::Binary(vec![0x01, 0x02, 0x03, 0x04])
    );
    assert_eq!(
        next_data_message(&mut server).await,
        Message::Binary(vec![0xaa, 0xbb])
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_control_stop_wire_shape() {
    let (listener, endpoint) = bind_server().await;
    let (client, _events) = StreamClient::spawn(test_config(&endpoint));
    let handle = client.handle();

    let mut server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    handle.send_control(ControlAction::Stop);

    match next_data_message(&mut server).await {
        Message::Text(text) => {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            assert_eq!(
                value,
                serde_json::json!({"type": "control", "action": "stop"})
            );
        }
        other => panic!("expected text control message, got {:?}", other),
    }

    client.shutdown().await;
}

#[tokio::test]
async fn test_transcripts_are_delivered_in_order() {
    let (listener, endpoint) = bind_server().await;
    let (client, mut events) = StreamClient::spawn(test_config(&endpoint));
    let handle = client.handle();

    let mut server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    server
        .send(Message::Text(r#"{"text":"hello"}"#.to_string()))
        .await
        .unwrap();
    server
        .send(Message::Text(r#"{"text":"world"}"#.to_string()))
        .await
        .unwrap();

    assert_eq!(next_transcript(&mut events).await, "hello");
    assert_eq!(next_transcript(&mut events).await, "world");

    client.shutdown().await;
}

#[tokio::test]
async fn test_malformed_payload_surfaces_decode_error_and_session_continues() {
    let (listener, endpoint) = bind_server().await;
    let (client, mut events) = StreamClient::spawn(test_config(&endpoint));
    let handle = client.handle();

    let mut server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    server
        .send(Message::Text("this is not json".to_string()))
        .await
        .unwrap();

    loop {
        match next_event(&mut events).await {
            StreamEvent::DecodeError(_) => break,
            StreamEvent::Connected => continue,
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    // The connection must survive a bad payload.
    assert_eq!(handle.state(), ConnectionState::Open);

    server
        .send(Message::Text(r#"{"text":"still alive"}"#.to_string()))
        .await
        .unwrap();
    assert_eq!(next_transcript(&mut events).await, "still alive");

    client.shutdown().await;
}

#[tokio::test]
async fn test_client_reconnects_after_server_drop() {
    let (listener, endpoint) = bind_server().await;
    let (client, mut events) = StreamClient::spawn(test_config(&endpoint));
    let handle = client.handle();

    let mut server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    server.close(None).await.unwrap();
    drop(server);

    loop {
        if let StreamEvent::Disconnected { .. } = next_event(&mut events).await {
            break;
        }
    }

    // A fresh accept must see the client come back on its own.
    let _server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    client.shutdown().await;
}

#[tokio::test]
async fn test_frames_while_connecting_are_dropped_not_queued() {
    let (listener, endpoint) = bind_server().await;
    let (client, _events) = StreamClient::spawn(test_config(&endpoint));
    let handle = client.handle();

    // The handshake cannot complete until the server accepts, so the
    // client is still connecting here.
    assert_ne!(handle.state(), ConnectionState::Open);
    handle.send_frame(vec![0xde, 0xad]);

    let mut server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    handle.send_frame(vec![0x10, 0x20]);

    // Only the frame sent while open arrives.
    assert_eq!(
        next_data_message(&mut server).await,
        Message::Binary(vec![0x10, 0x20])
    );

    client.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_closes_an_open_connection() {
    let (listener, endpoint) = bind_server().await;
    let (client, _events) = StreamClient::spawn(test_config(&endpoint));
    let handle = client.handle();

    let mut server = accept_ws(&listener).await;
    wait_for_state(&handle, ConnectionState::Open).await;

    client.shutdown().await;

    // The server observes the close handshake rather than a hang.
    let msg = timeout(WAIT, server.next())
        .await
        .expect("timed out waiting for close");
    match msg {
        Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {}
        other => panic!("expected close, got {:?}", other),
    }
}

#[tokio::test]
async fn test_session_accumulates_transcript_from_live_server() {
    let (listener, endpoint) = bind_server().await;

    let settings = Settings {
        endpoint,
        reconnect_delay_ms: 100,
        ..Settings::default()
    };
    let mut session = Session::start(settings);

    let mut server = accept_ws(&listener).await;

    server
        .send(Message::Text(r#"{"text":"hello"}"#.to_string()))
        .await
        .unwrap();
    server
        .send(Message::Text(r#"{"text":"world"}"#.to_string()))
        .await
        .unwrap();

    timeout(WAIT, async {
        while session.transcript() != " hello world" {
            session.next_update().await.expect("event stream ended");
        }
    })
    .await
    .expect("transcript never accumulated");

    assert_eq!(session.transcript(), " hello world");
    session.shutdown().await;
}
