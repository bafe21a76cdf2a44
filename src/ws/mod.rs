pub mod actor;
pub mod dispatch;
pub mod handler;
pub mod protocol;

use tokio::sync::mpsc;

/// Sender half of a WebSocket connection's channel. Any part of the system
/// can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;
