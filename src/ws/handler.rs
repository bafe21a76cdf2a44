use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use serde::Deserialize;

use crate::auth;
use crate::state::AppState;
use crate::ws::actor;

/// Query parameters for WebSocket connection. Auth is via `?token=JWT`.
#[derive(Debug, Deserialize)]
pub struct WsAuthQuery {
    pub token: Option<String>,
}

/// GET /ws?token=JWT
/// WebSocket upgrade endpoint. Authenticates before any registry mutation:
/// on failure the socket is upgraded and immediately closed with the
/// admission close code (4001 expired / 4002 invalid or missing) and an
/// explicit reason.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsAuthQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    match auth::admit(&state.jwt_secret, params.token.as_deref()) {
        Ok(identity) => {
            tracing::info!(user_id = %identity.user_id, "WebSocket connection authenticated");
            ws.on_upgrade(move |socket| handle_authenticated(socket, state, identity))
        }
        Err(err) => {
            let close_code = err.close_code();
            let reason = err.to_string();
            tracing::warn!(close_code = close_code, reason = %reason, "WebSocket auth failed");

            ws.on_upgrade(move |mut socket| async move {
                let close_frame = CloseFrame {
                    code: close_code,
                    reason: reason.into(),
                };
                let _ = socket.send(Message::Close(Some(close_frame))).await;
            })
        }
    }
}

async fn handle_authenticated(socket: WebSocket, state: AppState, identity: auth::Identity) {
    actor::run_connection(socket, state, identity).await;
}
