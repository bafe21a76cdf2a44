use axum::{routing::get, Router};

use crate::state::AppState;
use crate::ws;

/// Build the application router. The real-time surface is the WebSocket
/// endpoint; HTTP is limited to a health probe.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(ws::handler::ws_upgrade))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
