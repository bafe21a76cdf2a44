//! Connection registry: the authoritative map of user -> live connections.
//!
//! A user can have multiple concurrent connections (multiple devices/tabs).
//! The registry is the sole source of "is this user online", and the sole
//! detector of the 0->1 ("online") and 1->0 ("offline") transitions.

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::{ConnId, UserId};
use crate::ws::ConnectionSender;

/// One live transport session, bound to exactly one authenticated user for
/// its lifetime. Created at admission, destroyed at transport close.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnId,
    pub user_id: UserId,
    pub established_at: DateTime<Utc>,
    pub sender: ConnectionSender,
}

impl Connection {
    pub fn new(id: ConnId, user_id: UserId, sender: ConnectionSender) -> Self {
        Self {
            id,
            user_id,
            established_at: Utc::now(),
            sender,
        }
    }
}

/// Presence transition caused by a register/unregister call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The user's first connection: they just came online.
    Online,
    /// The user's last connection left: they just went offline.
    Offline,
    /// Additional connection registered or removed; presence unchanged.
    None,
}

#[derive(Default)]
pub struct ConnectionRegistry {
    /// user id -> live connections. Invariant: a key is present iff its
    /// vector is non-empty.
    users: DashMap<UserId, Vec<Connection>>,
    /// Reverse index for constant-time owner lookup on disconnect.
    owners: DashMap<ConnId, UserId>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection for a user. Returns [`Transition::Online`] iff this
    /// was the 0->1 transition. The check and the mutation happen under the
    /// per-user entry lock, so two connections racing to register a
    /// previously-offline user yield exactly one online signal.
    pub fn register(&self, conn: Connection) -> Transition {
        self.owners.insert(conn.id.clone(), conn.user_id.clone());

        let mut connections = self.users.entry(conn.user_id.clone()).or_default();
        let was_empty = connections.is_empty();
        connections.push(conn);

        if was_empty {
            Transition::Online
        } else {
            Transition::None
        }
    }

    /// Remove a connection. Returns the owning user and whether this was the
    /// user's last connection (1->0 transition). Unknown ids are a no-op.
    pub fn unregister(&self, conn_id: &str) -> Option<(UserId, Transition)> {
        let (_, user_id) = self.owners.remove(conn_id)?;

        let mut went_offline = false;
        if let Some(mut connections) = self.users.get_mut(&user_id) {
            connections.retain(|c| c.id != conn_id);
            went_offline = connections.is_empty();
        }
        if went_offline {
            // Re-checked under the entry lock: a concurrent register may
            // have repopulated the vector since the guard was dropped.
            went_offline = self.users.remove_if(&user_id, |_, v| v.is_empty()).is_some();
        }

        let transition = if went_offline {
            Transition::Offline
        } else {
            Transition::None
        };
        Some((user_id, transition))
    }

    /// Connection ids of a user's live connections. Never errors; unknown
    /// users yield an empty vector.
    pub fn connections_of(&self, user_id: &str) -> Vec<ConnId> {
        self.users
            .get(user_id)
            .map(|v| v.iter().map(|c| c.id.clone()).collect())
            .unwrap_or_default()
    }

    /// Senders for every live connection of a user.
    pub fn senders_of(&self, user_id: &str) -> Vec<ConnectionSender> {
        self.users
            .get(user_id)
            .map(|v| v.iter().map(|c| c.sender.clone()).collect())
            .unwrap_or_default()
    }

    /// Sender for one connection id, if still registered.
    pub fn sender_of(&self, conn_id: &str) -> Option<ConnectionSender> {
        let user_id = self.owners.get(conn_id)?.value().clone();
        self.users
            .get(&user_id)
            .and_then(|v| v.iter().find(|c| c.id == conn_id).map(|c| c.sender.clone()))
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users
            .get(user_id)
            .map(|v| !v.is_empty())
            .unwrap_or(false)
    }

    pub fn online_user_ids(&self) -> Vec<UserId> {
        self.users.iter().map(|entry| entry.key().clone()).collect()
    }
}
