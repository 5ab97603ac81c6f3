//! End-to-end tests of the playground server over real sockets.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use marker_reservation::server::{AppState, Playground, create_router};
use marker_reservation::{CoordinatorConfig, ServerConfig, SlotId};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn spawn_server() -> (AppState, String) {
    let config = ServerConfig {
        coordinator: CoordinatorConfig::default()
            .with_sync_delay(Duration::ZERO)
            .with_claim_timeout(Duration::from_millis(500)),
        ..ServerConfig::default()
    };
    let state = Playground::new(config);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (state, format!("ws://{addr}"))
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

/// Reads messages until one of the given type arrives.
async fn next_of_type(client: &mut Client, kind: &str) -> Value {
    loop {
        let value = next_json(client).await;
        if value["type"] == kind {
            return value;
        }
    }
}

#[tokio::test]
async fn test_stream_starts_with_snapshot() {
    let (state, base) = spawn_server().await;
    let a = state.join_player().unwrap();
    let b = state.join_player().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(a.claim(SlotId::new(2).unwrap()).await.unwrap().is_claimed());
    tokio::time::sleep(Duration::from_millis(50)).await;

    let url = format!("{base}/players/{}/ws", b.self_id());
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();

    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["playerId"], b.self_id().as_str());
    assert_eq!(snapshot["reservations"]["2"], a.self_id().as_str());
}

#[tokio::test]
async fn test_remote_claim_is_forwarded() {
    let (state, base) = spawn_server().await;
    let a = state.join_player().unwrap();
    let b = state.join_player().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let url = format!("{base}/players/{}/ws", b.self_id());
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    next_of_type(&mut client, "snapshot").await;

    assert!(a.claim(SlotId::new(6).unwrap()).await.unwrap().is_claimed());

    let event = next_of_type(&mut client, "slot-claimed").await;
    assert_eq!(event["slotId"], 6);
    assert_eq!(event["owner"], a.self_id().as_str());
}

#[tokio::test]
async fn test_claim_command_over_socket() {
    let (state, base) = spawn_server().await;
    let a = state.join_player().unwrap();
    let b = state.join_player().unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let url = format!("{base}/players/{}/ws", a.self_id());
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    next_of_type(&mut client, "snapshot").await;

    let command = json!({ "type": "claim", "slotId": 3 }).to_string();
    client.send(Message::Text(command)).await.unwrap();

    let result = next_of_type(&mut client, "claim-result").await;
    assert_eq!(result["claimed"], true);
    assert_eq!(result["owner"], a.self_id().as_str());
    assert_eq!(b.owner_of(SlotId::new(3).unwrap()), Some(a.self_id().clone()));

    // The same slot cannot be taken from the other side.
    let outcome = b.claim(SlotId::new(3).unwrap()).await.unwrap();
    assert!(!outcome.is_claimed());
}

#[tokio::test]
async fn test_bad_commands_keep_stream_open() {
    let (state, base) = spawn_server().await;
    let a = state.join_player().unwrap();

    let url = format!("{base}/players/{}/ws", a.self_id());
    let (mut client, _) = connect_async(url.as_str()).await.unwrap();
    next_of_type(&mut client, "snapshot").await;

    client
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    let error = next_of_type(&mut client, "error").await;
    assert!(error["message"].is_string());

    let out_of_range = json!({ "type": "claim", "slotId": 9 }).to_string();
    client.send(Message::Text(out_of_range)).await.unwrap();
    next_of_type(&mut client, "error").await;

    let release = json!({ "type": "release", "slotId": 1 }).to_string();
    client.send(Message::Text(release)).await.unwrap();
    let result = next_of_type(&mut client, "release-result").await;
    assert_eq!(result["released"], false);
}

#[tokio::test]
async fn test_unknown_player_is_rejected() {
    let (_state, base) = spawn_server().await;
    let url = format!("{base}/players/player_404/ws");
    assert!(connect_async(url.as_str()).await.is_err());
}
