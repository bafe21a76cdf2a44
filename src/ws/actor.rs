use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, timeout};
use uuid::Uuid;

use crate::auth::Identity;
use crate::fanout::broadcast;
use crate::presence::{Connection, Transition};
use crate::state::AppState;
use crate::ws::dispatch::{self, EventContext};
use crate::ws::protocol::{ClientEvent, ServerEvent};

/// Ping interval: server sends WebSocket ping every 30 seconds to detect
/// abrupt disconnects.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Pong timeout: if pong not received within 10 seconds after ping, close.
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Run the actor-per-connection pattern for an authenticated WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: processes incoming events in arrival order (per-connection
///   FIFO), dispatching each to its handler
///
/// The mpsc channel allows any part of the system to push events to this
/// client by cloning the sender.
pub async fn run_connection(socket: WebSocket, state: AppState, identity: Identity) {
    let user_id = identity.user_id;
    let conn_id = Uuid::now_v7().to_string();

    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let transition = state
        .registry
        .register(Connection::new(conn_id.clone(), user_id.clone(), tx.clone()));
    state.activity.touch(&user_id);

    // Announce "online" to the friend audience only on the user's first
    // connection, not every tab.
    if transition == Transition::Online {
        announce_to_friends(&state, &user_id, true).await;
    }

    tracing::info!(user_id = %user_id, conn_id = %conn_id, "WebSocket actor started");

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).is_err() {
                // Writer task has died — connection is gone
                break;
            }

            match timeout(PONG_TIMEOUT, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!("Pong timeout, closing connection");
                    let _ = ping_tx.send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
    });

    let ctx = EventContext {
        state: state.clone(),
        user_id: user_id.clone(),
        conn_id: conn_id.clone(),
        tx: tx.clone(),
    };

    // Reader loop: process incoming WebSocket messages in arrival order.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    // Every qualifying inbound event resets the idle timers.
                    state.activity.touch(&user_id);
                    match serde_json::from_str::<ClientEvent>(text.as_str()) {
                        Ok(event) => dispatch::handle_event(&ctx, event).await,
                        Err(e) => {
                            tracing::debug!(
                                user_id = %user_id,
                                error = %e,
                                "unrecognized client event"
                            );
                            let _ = tx.send(
                                ServerEvent::Error {
                                    code: 400,
                                    message: "unrecognized event".to_string(),
                                }
                                .to_message(),
                            );
                        }
                    }
                }
                Message::Binary(_) => {
                    tracing::debug!(
                        user_id = %user_id,
                        "received binary message (expected JSON text)"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(user_id = %user_id, reason = ?frame, "client initiated close");
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(user_id = %user_id, error = %e, "WebSocket receive error");
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks
    writer_handle.abort();
    ping_handle.abort();

    // Room cleanup first: every room membership of this connection ends,
    // emitting roster/count updates where the user's presence ended.
    let affected_rooms = state.rooms.disconnect_cleanup(&conn_id, &user_id);
    for room_id in &affected_rooms {
        if let Err(e) = dispatch::emit_room_presence_update(&state, room_id).await {
            tracing::warn!(room_id = %room_id, error = %e, "room update after disconnect failed");
        }
    }
    if !affected_rooms.is_empty() {
        if let Err(e) = dispatch::broadcast_room_counts(&state).await {
            tracing::warn!(error = %e, "room count broadcast after disconnect failed");
        }
    }

    // Then presence: if that was the user's last connection, announce
    // "offline" to the friend audience and discard the activity record.
    if let Some((owner, Transition::Offline)) = state.registry.unregister(&conn_id) {
        state.activity.discard(&owner);
        announce_to_friends(&state, &owner, false).await;
    }

    tracing::info!(user_id = %user_id, conn_id = %conn_id, "WebSocket actor stopped");
}

/// Writer task: receives messages from the mpsc channel and forwards them
/// to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            // WebSocket send failed — connection is broken
            break;
        }
    }
}

async fn announce_to_friends(state: &AppState, user_id: &str, is_online: bool) {
    let audience =
        match broadcast::to_friends(&state.registry, &state.store.friendships, user_id).await {
            Ok(conn_ids) => conn_ids,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "friend audience lookup failed");
                return;
            }
        };
    broadcast::deliver(
        &state.registry,
        &audience,
        &ServerEvent::FriendOnlineStatusUpdate {
            user_id: user_id.to_string(),
            is_online,
        },
    );
}
