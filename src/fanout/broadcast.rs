//! Fan-out delivery to resolved audiences.
//!
//! Delivery is fire-and-forget: a successful call means only "attempted
//! delivery to N currently-live connections", never "received". A
//! connection that unregisters between audience resolution and delivery is
//! silently skipped; nothing is queued or retried. A user with N live
//! connections receives N independent copies.

use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message};

use crate::friends::graph::FriendGraphQuery;
use crate::presence::{ConnId, ConnectionRegistry, RoomPresenceTracker};
use crate::store::{FriendshipStore, StoreError};
use crate::ws::protocol::ServerEvent;

/// Deliver one event to every connection id still present in the registry.
/// Returns the number of connections delivery was attempted to.
pub fn deliver(registry: &ConnectionRegistry, conn_ids: &[ConnId], event: &ServerEvent) -> usize {
    let msg = event.to_message();
    let mut attempted = 0;
    for conn_id in conn_ids {
        if let Some(sender) = registry.sender_of(conn_id) {
            let _ = sender.send(msg.clone());
            attempted += 1;
        }
    }
    attempted
}

/// Push an event to every live connection of one user.
pub fn send_to_user(registry: &ConnectionRegistry, user_id: &str, event: &ServerEvent) -> usize {
    let msg = event.to_message();
    let senders = registry.senders_of(user_id);
    for sender in &senders {
        let _ = sender.send(msg.clone());
    }
    senders.len()
}

/// Push an event to every connection of every online user.
pub fn send_to_all(registry: &ConnectionRegistry, event: &ServerEvent) {
    for user_id in registry.online_user_ids() {
        send_to_user(registry, &user_id, event);
    }
}

/// Force-close all connections of a user with the given close code.
pub fn force_close_user(
    registry: &ConnectionRegistry,
    user_id: &str,
    close_code: u16,
    reason: &str,
) {
    let close_frame = CloseFrame {
        code: close_code,
        reason: reason.to_string().into(),
    };
    for sender in registry.senders_of(user_id) {
        let _ = sender.send(Message::Close(Some(close_frame.clone())));
    }
}

/// Audience: one user's current connections.
pub fn to_user(registry: &ConnectionRegistry, user_id: &str) -> Vec<ConnId> {
    registry.connections_of(user_id)
}

/// Audience: every connection currently joined to a room.
pub fn to_room(rooms: &RoomPresenceTracker, room_id: &str) -> Vec<ConnId> {
    rooms.connections_in(room_id)
}

/// Audience: the union of connections of a user's confirmed friends.
pub async fn to_friends(
    registry: &ConnectionRegistry,
    friendships: &Arc<dyn FriendshipStore>,
    user_id: &str,
) -> Result<Vec<ConnId>, StoreError> {
    let graph = FriendGraphQuery::new(friendships.clone());
    let mut conn_ids = Vec::new();
    for friend_id in graph.friends_of(user_id).await? {
        conn_ids.extend(registry.connections_of(&friend_id));
    }
    Ok(conn_ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::presence::Connection;
    use tokio::sync::mpsc;

    fn register(
        registry: &ConnectionRegistry,
        conn_id: &str,
        user_id: &str,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        registry.register(Connection::new(conn_id.into(), user_id.into(), tx));
        rx
    }

    fn count_frames(rx: &mut mpsc::UnboundedReceiver<Message>) -> usize {
        let mut n = 0;
        while rx.try_recv().is_ok() {
            n += 1;
        }
        n
    }

    #[tokio::test]
    async fn delivers_one_copy_per_connection() {
        let registry = ConnectionRegistry::new();
        let mut rx_a1 = register(&registry, "a1", "u1");
        let mut rx_a2 = register(&registry, "a2", "u1");
        let mut rx_b1 = register(&registry, "b1", "u2");

        let audience = vec!["a1".to_string(), "a2".to_string(), "b1".to_string()];
        let attempted = deliver(&registry, &audience, &ServerEvent::InactivityDisconnect);

        assert_eq!(attempted, 3);
        assert_eq!(count_frames(&mut rx_a1), 1);
        assert_eq!(count_frames(&mut rx_a2), 1);
        assert_eq!(count_frames(&mut rx_b1), 1);
    }

    #[tokio::test]
    async fn unregistered_connection_is_skipped_silently() {
        let registry = ConnectionRegistry::new();
        let mut rx_a1 = register(&registry, "a1", "u1");
        let mut rx_a2 = register(&registry, "a2", "u1");

        // Audience resolved while a2 was alive; a2 disconnects before
        // delivery and must receive zero copies.
        let audience = vec!["a1".to_string(), "a2".to_string()];
        registry.unregister("a2");

        let attempted = deliver(&registry, &audience, &ServerEvent::InactivityDisconnect);
        assert_eq!(attempted, 1);
        assert_eq!(count_frames(&mut rx_a1), 1);
        assert_eq!(count_frames(&mut rx_a2), 0);
    }
}
