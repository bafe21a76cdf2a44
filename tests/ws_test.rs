//! Integration tests for WebSocket admission, event routing, and room
//! presence fan-out.

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use beacon_server::store::{memory::MemoryStore, Collaborators, RoomVisibility};

type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Start the server on a random port with a seeded store.
/// Returns (addr, jwt_secret, store).
async fn start_test_server() -> (SocketAddr, Vec<u8>, Arc<MemoryStore>) {
    let tmp_dir = tempfile::tempdir().expect("failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();
    let jwt_secret =
        beacon_server::auth::jwt::load_or_generate_jwt_secret(&data_dir).expect("jwt secret");

    let store = Arc::new(MemoryStore::new());
    store.insert_room("lobby", "Lobby", RoomVisibility::Public);
    store.insert_user("alice", "alice");
    store.insert_user("bob", "bob");

    let state = beacon_server::state::AppState::new(
        jwt_secret.clone(),
        Arc::new(Collaborators::from_memory(store.clone())),
        Duration::from_secs(3600),
        Duration::from_secs(1800),
    );

    let app = beacon_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (addr, jwt_secret, store)
}

async fn connect(addr: SocketAddr, secret: &[u8], user_id: &str) -> WsClient {
    let token = beacon_server::auth::jwt::issue_access_token(secret, user_id).unwrap();
    let ws_url = format!("ws://{}/ws?token={}", addr, token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("failed to connect to WebSocket");
    ws_stream
}

/// Read frames until an event with the given `type` tag arrives, skipping
/// unrelated events (room counts, presence announcements).
async fn recv_event(client: &mut WsClient, event_type: &str) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), client.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {}", event_type))
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            let value: Value = serde_json::from_str(text.as_str()).unwrap();
            if value["type"] == event_type {
                return value;
            }
        }
    }
}

async fn send_event(client: &mut WsClient, event: Value) {
    client
        .send(Message::Text(event.to_string().into()))
        .await
        .expect("failed to send event");
}

#[tokio::test]
async fn connection_with_valid_jwt_stays_open() {
    let (addr, secret, _store) = start_test_server().await;
    let mut client = connect(addr, &secret, "alice").await;

    // No snapshot is pushed on connect; the connection should simply idle.
    let result = tokio::time::timeout(Duration::from_millis(300), client.next()).await;
    assert!(result.is_err(), "expected no unsolicited messages");
}

#[tokio::test]
async fn missing_token_is_refused_with_close_code() {
    let (addr, _secret, _store) = start_test_server().await;

    let ws_url = format!("ws://{}/ws", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("upgrade should succeed even without a token");
    let (_, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("expected close within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(
                frame.code,
                tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(4002),
            );
        }
        Some(Ok(Message::Close(None))) | None => {}
        other => panic!("expected close frame, got: {:?}", other),
    }
}

#[tokio::test]
async fn invalid_token_is_refused_with_close_code() {
    let (addr, _secret, _store) = start_test_server().await;

    let ws_url = format!("ws://{}/ws?token=not_a_jwt", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url).await.unwrap();
    let (_, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("expected close within timeout");

    if let Some(Ok(Message::Close(Some(frame)))) = msg {
        assert_eq!(
            frame.code,
            tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(4002),
        );
    }
}

#[tokio::test]
async fn unrecognized_event_yields_scoped_error() {
    let (addr, secret, _store) = start_test_server().await;
    let mut client = connect(addr, &secret, "alice").await;

    send_event(&mut client, json!({ "type": "definitelyNotAnEvent" })).await;
    let error = recv_event(&mut client, "error").await;
    assert_eq!(error["code"].as_u64(), Some(400));
}

#[tokio::test]
async fn join_unknown_room_yields_not_found() {
    let (addr, secret, _store) = start_test_server().await;
    let mut client = connect(addr, &secret, "alice").await;

    send_event(&mut client, json!({ "type": "joinRoom", "roomId": "nope" })).await;
    let error = recv_event(&mut client, "error").await;
    assert_eq!(error["code"].as_u64(), Some(404));
}

#[tokio::test]
async fn join_room_emits_roster_and_counts() {
    let (addr, secret, _store) = start_test_server().await;
    let mut alice = connect(addr, &secret, "alice").await;

    send_event(&mut alice, json!({ "type": "joinRoom", "roomId": "lobby" })).await;

    let roster = recv_event(&mut alice, "roomUsersUpdate").await;
    assert_eq!(roster["roomId"], "lobby");
    assert_eq!(roster["users"][0]["username"], "alice");

    let count = recv_event(&mut alice, "roomUserCount").await;
    assert_eq!(count["count"].as_u64(), Some(1));

    let counts = recv_event(&mut alice, "allRoomCounts").await;
    assert_eq!(counts["counts"][0]["roomId"], "lobby");
    assert_eq!(counts["counts"][0]["count"].as_u64(), Some(1));

    // A second user joining pushes an updated, name-sorted roster.
    let mut bob = connect(addr, &secret, "bob").await;
    send_event(&mut bob, json!({ "type": "joinRoom", "roomId": "lobby" })).await;

    let roster = recv_event(&mut alice, "roomUsersUpdate").await;
    let users: Vec<&str> = roster["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(users, vec!["alice", "bob"]);
}

#[tokio::test]
async fn room_message_fans_out_to_all_members() {
    let (addr, secret, _store) = start_test_server().await;
    let mut alice = connect(addr, &secret, "alice").await;
    let mut bob = connect(addr, &secret, "bob").await;

    send_event(&mut alice, json!({ "type": "joinRoom", "roomId": "lobby" })).await;
    send_event(&mut bob, json!({ "type": "joinRoom", "roomId": "lobby" })).await;
    recv_event(&mut bob, "roomUsersUpdate").await;

    send_event(
        &mut alice,
        json!({ "type": "sendMessage", "roomId": "lobby", "content": "hello room" }),
    )
    .await;

    let to_alice = recv_event(&mut alice, "newMessage").await;
    let to_bob = recv_event(&mut bob, "newMessage").await;
    assert_eq!(to_alice["message"]["content"], "hello room");
    assert_eq!(to_bob["message"]["content"], "hello room");
    assert_eq!(to_bob["message"]["sender"]["username"], "alice");
}

#[tokio::test]
async fn empty_message_is_rejected_without_side_effects() {
    let (addr, secret, _store) = start_test_server().await;
    let mut alice = connect(addr, &secret, "alice").await;
    let mut bob = connect(addr, &secret, "bob").await;

    // Sequence the joins so bob's queue is known to be empty afterwards:
    // bob's own join burst, then the burst from alice joining his room.
    send_event(&mut bob, json!({ "type": "joinRoom", "roomId": "lobby" })).await;
    recv_event(&mut bob, "allRoomCounts").await;
    send_event(&mut alice, json!({ "type": "joinRoom", "roomId": "lobby" })).await;
    recv_event(&mut bob, "allRoomCounts").await;

    send_event(
        &mut alice,
        json!({ "type": "sendMessage", "roomId": "lobby", "content": "   " }),
    )
    .await;

    let error = recv_event(&mut alice, "error").await;
    assert_eq!(error["code"].as_u64(), Some(400));

    // The failure is scoped to the sender: bob sees nothing.
    let result = tokio::time::timeout(Duration::from_millis(300), bob.next()).await;
    assert!(result.is_err(), "bob should receive no message");
}

#[tokio::test]
async fn disconnect_cleans_up_room_presence() {
    let (addr, secret, _store) = start_test_server().await;
    let mut alice = connect(addr, &secret, "alice").await;
    let mut bob = connect(addr, &secret, "bob").await;

    send_event(&mut alice, json!({ "type": "joinRoom", "roomId": "lobby" })).await;
    // Consume alice's own join burst before bob enters.
    recv_event(&mut alice, "allRoomCounts").await;
    send_event(&mut bob, json!({ "type": "joinRoom", "roomId": "lobby" })).await;

    // Alice sees the two-member roster from bob's join.
    let roster = recv_event(&mut alice, "roomUsersUpdate").await;
    assert_eq!(roster["users"].as_array().unwrap().len(), 2);
    recv_event(&mut alice, "allRoomCounts").await;

    // Bob disconnects abruptly; alice sees the roster shrink.
    drop(bob);

    let roster = recv_event(&mut alice, "roomUsersUpdate").await;
    let users: Vec<&str> = roster["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert_eq!(users, vec!["alice"]);

    let count = recv_event(&mut alice, "roomUserCount").await;
    assert_eq!(count["count"].as_u64(), Some(1));
}
