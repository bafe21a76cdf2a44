//! Ephemeral room presence: which users and connections are "in" a room.
//!
//! Distinct from the durable room configuration — the tracker is rebuilt
//! empty on process start and evicts a room the moment its last user
//! leaves. A reverse index (connection -> rooms) makes disconnect cleanup
//! constant per joined room instead of a scan over every room.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;

use super::{ConnId, RoomId, UserId};

/// Live membership of one room. Invariant: a user id is in `users` iff at
/// least one of their connections is in `connections`.
#[derive(Debug, Default)]
struct RoomRoster {
    users: HashSet<UserId>,
    /// connection id -> owning user id.
    connections: HashMap<ConnId, UserId>,
}

#[derive(Default)]
pub struct RoomPresenceTracker {
    rooms: DashMap<RoomId, RoomRoster>,
    conn_rooms: DashMap<ConnId, HashSet<RoomId>>,
}

impl RoomPresenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join a connection to a room. Returns true iff this made the user
    /// newly present in the room (their first connection there) — the
    /// caller only emits roster updates in that case.
    pub fn join(&self, room_id: &str, user_id: &str, conn_id: &str) -> bool {
        self.conn_rooms
            .entry(conn_id.to_string())
            .or_default()
            .insert(room_id.to_string());

        let mut roster = self.rooms.entry(room_id.to_string()).or_default();
        roster
            .connections
            .insert(conn_id.to_string(), user_id.to_string());
        roster.users.insert(user_id.to_string())
    }

    /// Remove a connection from a room. Returns true iff the user is no
    /// longer present in the room at all. Evicts the room entry once its
    /// user set is empty.
    pub fn leave(&self, room_id: &str, user_id: &str, conn_id: &str) -> bool {
        if let Some(mut joined) = self.conn_rooms.get_mut(conn_id) {
            joined.remove(room_id);
        }
        self.conn_rooms.remove_if(conn_id, |_, set| set.is_empty());

        self.remove_from_roster(room_id, user_id, conn_id)
    }

    /// Remove every room membership of a disconnecting connection.
    /// Returns the rooms where the user's presence actually ended.
    pub fn disconnect_cleanup(&self, conn_id: &str, user_id: &str) -> Vec<RoomId> {
        let joined = match self.conn_rooms.remove(conn_id) {
            Some((_, rooms)) => rooms,
            None => return Vec::new(),
        };

        joined
            .into_iter()
            .filter(|room_id| self.remove_from_roster(room_id, user_id, conn_id))
            .collect()
    }

    fn remove_from_roster(&self, room_id: &str, user_id: &str, conn_id: &str) -> bool {
        let mut user_left = false;
        if let Some(mut roster) = self.rooms.get_mut(room_id) {
            roster.connections.remove(conn_id);
            let still_present = roster.connections.values().any(|owner| owner == user_id);
            if !still_present {
                user_left = roster.users.remove(user_id);
            }
        }
        // Ephemeral rooms with no presence do not persist in memory.
        self.rooms.remove_if(room_id, |_, roster| roster.users.is_empty());
        user_left
    }

    pub fn users_in(&self, room_id: &str) -> Vec<UserId> {
        self.rooms
            .get(room_id)
            .map(|roster| roster.users.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connections_in(&self, room_id: &str) -> Vec<ConnId> {
        self.rooms
            .get(room_id)
            .map(|roster| roster.connections.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn user_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map(|roster| roster.users.len())
            .unwrap_or(0)
    }

    /// Live user count per room, for every room currently in memory.
    pub fn counts(&self) -> Vec<(RoomId, usize)> {
        self.rooms
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().users.len()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_join_reports_new_presence() {
        let tracker = RoomPresenceTracker::new();
        assert!(tracker.join("r1", "u1", "c1"));
        // Second tab of the same user: no roster change.
        assert!(!tracker.join("r1", "u1", "c2"));
        assert_eq!(tracker.user_count("r1"), 1);
        assert_eq!(tracker.connections_in("r1").len(), 2);
    }

    #[test]
    fn user_stays_present_until_last_connection_leaves() {
        let tracker = RoomPresenceTracker::new();
        tracker.join("r1", "u1", "c1");
        tracker.join("r1", "u1", "c2");

        assert!(!tracker.leave("r1", "u1", "c1"));
        assert_eq!(tracker.users_in("r1"), vec!["u1".to_string()]);

        assert!(tracker.leave("r1", "u1", "c2"));
        // Room emptied: the entry itself must be evicted.
        assert!(tracker.counts().is_empty());
    }

    #[test]
    fn disconnect_cleanup_covers_all_joined_rooms() {
        let tracker = RoomPresenceTracker::new();
        tracker.join("r1", "u1", "c1");
        tracker.join("r2", "u1", "c1");
        tracker.join("r1", "u1", "c2");
        tracker.join("r1", "u2", "c3");

        let mut affected = tracker.disconnect_cleanup("c1", "u1");
        affected.sort();
        // u1 still has c2 in r1, so only r2 presence ended.
        assert_eq!(affected, vec!["r2".to_string()]);
        assert_eq!(tracker.user_count("r1"), 2);

        let affected = tracker.disconnect_cleanup("c2", "u1");
        assert_eq!(affected, vec!["r1".to_string()]);
        assert_eq!(tracker.users_in("r1"), vec!["u2".to_string()]);
    }

    #[test]
    fn leave_without_join_is_noop() {
        let tracker = RoomPresenceTracker::new();
        assert!(!tracker.leave("r1", "u1", "c1"));
        assert!(tracker.disconnect_cleanup("c1", "u1").is_empty());
    }
}
