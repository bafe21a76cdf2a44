//! Read-only resolver of a user's confirmed friends.

use std::sync::Arc;

use crate::presence::UserId;
use crate::store::{FriendshipStore, StoreError};

/// Pure query over the friendship collaborator; no mutation capability.
pub struct FriendGraphQuery {
    friendships: Arc<dyn FriendshipStore>,
}

impl FriendGraphQuery {
    pub fn new(friendships: Arc<dyn FriendshipStore>) -> Self {
        Self { friendships }
    }

    /// Ids of every user sharing a friendship edge with `user_id`, whichever
    /// symmetric slot they occupy.
    pub async fn friends_of(&self, user_id: &str) -> Result<Vec<UserId>, StoreError> {
        let friendships = self.friendships.friendships_of(user_id).await?;
        Ok(friendships
            .iter()
            .filter_map(|f| f.counterpart(user_id))
            .map(|id| id.to_string())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    #[tokio::test]
    async fn resolves_both_slots_of_the_edge() {
        let store = Arc::new(MemoryStore::new());
        store.insert_friendship("u1", "u2");
        store.insert_friendship("u3", "u1");

        let graph = FriendGraphQuery::new(store);
        let mut friends = graph.friends_of("u1").await.unwrap();
        friends.sort();
        assert_eq!(friends, vec!["u2".to_string(), "u3".to_string()]);

        let graph_store = Arc::new(MemoryStore::new());
        let graph = FriendGraphQuery::new(graph_store);
        assert!(graph.friends_of("nobody").await.unwrap().is_empty());
    }
}
