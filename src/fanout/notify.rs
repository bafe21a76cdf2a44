//! Notification dispatch: push to live connections, or create exactly one
//! durable record for offline recipients.

use std::sync::Arc;

use crate::fanout::broadcast;
use crate::presence::ConnectionRegistry;
use crate::store::{Notification, NotificationDraft, NotificationStore, StoreError};
use crate::ws::protocol::ServerEvent;

/// Outcome of a dispatch, mostly for logging and tests.
#[derive(Debug)]
pub enum Dispatched {
    /// Pushed to this many live connections; nothing was persisted.
    Pushed(usize),
    /// Recipient was offline; exactly one durable record was created.
    Stored(Notification),
}

/// Deliver an addressed event: push `event` to every live connection of the
/// recipient, or — if they have none — create one durable record from
/// `draft`.
///
/// The online check happens exactly once. A recipient connecting
/// immediately after the check receives neither the push nor a record until
/// their next fetch; this is an accepted best-effort boundary.
pub async fn dispatch(
    registry: &ConnectionRegistry,
    notifications: &Arc<dyn NotificationStore>,
    recipient_id: &str,
    event: &ServerEvent,
    draft: NotificationDraft,
) -> Result<Dispatched, StoreError> {
    let conn_ids = registry.connections_of(recipient_id);

    if conn_ids.is_empty() {
        let notification = notifications.create_notification(draft).await?;
        tracing::debug!(
            recipient = %recipient_id,
            notification_id = %notification.id,
            "recipient offline, notification stored"
        );
        return Ok(Dispatched::Stored(notification));
    }

    let attempted = broadcast::deliver(registry, &conn_ids, event);
    tracing::debug!(recipient = %recipient_id, connections = attempted, "notification pushed");
    Ok(Dispatched::Pushed(attempted))
}
