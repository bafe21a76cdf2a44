use std::sync::Arc;
use std::time::Duration;

use crate::friends::{FriendGraphQuery, FriendRequestWorkflow};
use crate::presence::{ActivityMonitor, ConnectionRegistry, RoomPresenceTracker};
use crate::store::Collaborators;

/// Shared application state passed to all handlers via axum State extractor.
///
/// Every shared table is owned by exactly one component here and injected
/// by reference into its consumers — no process-wide singletons.
#[derive(Clone)]
pub struct AppState {
    /// JWT signing secret (256-bit random key).
    pub jwt_secret: Vec<u8>,
    /// Authoritative user -> live connections map.
    pub registry: Arc<ConnectionRegistry>,
    /// Ephemeral room membership.
    pub rooms: Arc<RoomPresenceTracker>,
    /// Per-user two-stage idle timers.
    pub activity: Arc<ActivityMonitor>,
    /// Durable-state collaborators.
    pub store: Arc<Collaborators>,
}

impl AppState {
    pub fn new(
        jwt_secret: Vec<u8>,
        store: Arc<Collaborators>,
        idle_timeout: Duration,
        warning_lead: Duration,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let activity = Arc::new(ActivityMonitor::new(
            registry.clone(),
            idle_timeout,
            warning_lead,
        ));
        Self {
            jwt_secret,
            registry,
            rooms: Arc::new(RoomPresenceTracker::new()),
            activity,
            store,
        }
    }

    pub fn friend_graph(&self) -> FriendGraphQuery {
        FriendGraphQuery::new(self.store.friendships.clone())
    }

    pub fn friend_requests(&self) -> FriendRequestWorkflow {
        FriendRequestWorkflow::new(
            self.registry.clone(),
            self.store.users.clone(),
            self.store.friendships.clone(),
            self.store.friend_requests.clone(),
            self.store.notifications.clone(),
        )
    }
}
