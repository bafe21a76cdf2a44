//! In-memory implementation of the storage collaborators.
//!
//! Backs the binary and the test suite. All maps are keyed by entity id;
//! uniqueness checks that a database would enforce (one pending request per
//! pair, one friendship per pair) are the workflow's responsibility.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use super::{
    DirectMessage, DirectMessageStore, FriendRequest, FriendRequestStatus, FriendRequestStore,
    Friendship, FriendshipStore, Message, MessageStore, Notification, NotificationDraft,
    NotificationStore, Room, RoomStore, RoomVisibility, StoreError, UserProfile, UserStore,
};

#[derive(Default)]
pub struct MemoryStore {
    rooms: DashMap<String, Room>,
    users: DashMap<String, UserProfile>,
    friendships: DashMap<String, Friendship>,
    friend_requests: DashMap<String, FriendRequest>,
    messages: DashMap<String, Message>,
    direct_messages: DashMap<String, DirectMessage>,
    notifications: DashMap<String, Notification>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_room(&self, id: &str, name: &str, visibility: RoomVisibility) {
        self.rooms.insert(
            id.to_string(),
            Room {
                id: id.to_string(),
                name: name.to_string(),
                visibility,
            },
        );
    }

    pub fn insert_user(&self, id: &str, username: &str) {
        self.users.insert(
            id.to_string(),
            UserProfile {
                id: id.to_string(),
                username: username.to_string(),
                avatar: None,
            },
        );
    }

    pub fn insert_friendship(&self, a: &str, b: &str) -> Friendship {
        let friendship = Friendship {
            id: Uuid::now_v7().to_string(),
            user_a: a.to_string(),
            user_b: b.to_string(),
            created_at: Utc::now(),
        };
        self.friendships
            .insert(friendship.id.clone(), friendship.clone());
        friendship
    }

    pub fn notifications_of(&self, user_id: &str) -> Vec<Notification> {
        self.notifications
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[async_trait]
impl RoomStore for MemoryStore {
    async fn room_by_id(&self, room_id: &str) -> Result<Option<Room>, StoreError> {
        Ok(self.rooms.get(room_id).map(|r| r.value().clone()))
    }

    async fn public_room_ids(&self) -> Result<Vec<String>, StoreError> {
        Ok(self
            .rooms
            .iter()
            .filter(|entry| entry.value().visibility == RoomVisibility::Public)
            .map(|entry| entry.key().clone())
            .collect())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn user_by_id(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError> {
        Ok(self.users.get(user_id).map(|u| u.value().clone()))
    }

    async fn users_by_ids(&self, user_ids: &[String]) -> Result<Vec<UserProfile>, StoreError> {
        Ok(user_ids
            .iter()
            .filter_map(|id| self.users.get(id).map(|u| u.value().clone()))
            .collect())
    }
}

#[async_trait]
impl FriendshipStore for MemoryStore {
    async fn friendship_by_id(&self, id: &str) -> Result<Option<Friendship>, StoreError> {
        Ok(self.friendships.get(id).map(|f| f.value().clone()))
    }

    async fn friendships_of(&self, user_id: &str) -> Result<Vec<Friendship>, StoreError> {
        Ok(self
            .friendships
            .iter()
            .filter(|entry| entry.value().involves(user_id))
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn friendship_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<Friendship>, StoreError> {
        Ok(self
            .friendships
            .iter()
            .find(|entry| {
                let f = entry.value();
                (f.user_a == a && f.user_b == b) || (f.user_a == b && f.user_b == a)
            })
            .map(|entry| entry.value().clone()))
    }

    async fn create_friendship(&self, a: &str, b: &str) -> Result<Friendship, StoreError> {
        Ok(self.insert_friendship(a, b))
    }

    async fn delete_friendship(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.friendships.remove(id).is_some())
    }
}

#[async_trait]
impl FriendRequestStore for MemoryStore {
    async fn request_by_id(&self, id: &str) -> Result<Option<FriendRequest>, StoreError> {
        Ok(self.friend_requests.get(id).map(|r| r.value().clone()))
    }

    async fn pending_between(
        &self,
        a: &str,
        b: &str,
    ) -> Result<Option<FriendRequest>, StoreError> {
        Ok(self
            .friend_requests
            .iter()
            .find(|entry| {
                let r = entry.value();
                r.status == FriendRequestStatus::Pending
                    && ((r.sender_id == a && r.recipient_id == b)
                        || (r.sender_id == b && r.recipient_id == a))
            })
            .map(|entry| entry.value().clone()))
    }

    async fn create_request(
        &self,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<FriendRequest, StoreError> {
        let request = FriendRequest {
            id: Uuid::now_v7().to_string(),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            status: FriendRequestStatus::Pending,
            created_at: Utc::now(),
        };
        self.friend_requests
            .insert(request.id.clone(), request.clone());
        Ok(request)
    }

    async fn delete_request(&self, id: &str) -> Result<bool, StoreError> {
        Ok(self.friend_requests.remove(id).is_some())
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn create_message(
        &self,
        room_id: &str,
        sender: &UserProfile,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<Message, StoreError> {
        let message = Message {
            id: Uuid::now_v7().to_string(),
            room_id: room_id.to_string(),
            sender: sender.clone(),
            content: content.to_string(),
            image_url: image_url.map(|s| s.to_string()),
            created_at: Utc::now(),
        };
        self.messages.insert(message.id.clone(), message.clone());
        Ok(message)
    }
}

#[async_trait]
impl DirectMessageStore for MemoryStore {
    async fn create_direct_message(
        &self,
        sender: &UserProfile,
        receiver_id: &str,
        content: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<DirectMessage, StoreError> {
        let message = DirectMessage {
            id: Uuid::now_v7().to_string(),
            sender: sender.clone(),
            receiver_id: receiver_id.to_string(),
            content: content.map(|s| s.to_string()),
            image_url: image_url.map(|s| s.to_string()),
            read: false,
            created_at: Utc::now(),
        };
        self.direct_messages
            .insert(message.id.clone(), message.clone());
        Ok(message)
    }

    async fn mark_read(
        &self,
        message_id: &str,
        reader_id: &str,
    ) -> Result<Option<DirectMessage>, StoreError> {
        if let Some(mut entry) = self.direct_messages.get_mut(message_id) {
            if entry.receiver_id == reader_id {
                entry.read = true;
                return Ok(Some(entry.clone()));
            }
        }
        Ok(None)
    }

    async fn mark_all_read(
        &self,
        sender_id: &str,
        reader_id: &str,
    ) -> Result<usize, StoreError> {
        let mut updated = 0;
        for mut entry in self.direct_messages.iter_mut() {
            let dm = entry.value_mut();
            if !dm.read && dm.sender.id == sender_id && dm.receiver_id == reader_id {
                dm.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create_notification(
        &self,
        draft: NotificationDraft,
    ) -> Result<Notification, StoreError> {
        let notification = Notification {
            id: Uuid::now_v7().to_string(),
            user_id: draft.user_id,
            kind: draft.kind,
            message: draft.message,
            reference_id: draft.reference_id,
            read: false,
            created_at: Utc::now(),
        };
        self.notifications
            .insert(notification.id.clone(), notification.clone());
        Ok(notification)
    }

    async fn mark_notification_read(
        &self,
        notification_id: &str,
        owner_id: &str,
    ) -> Result<bool, StoreError> {
        if let Some(mut entry) = self.notifications.get_mut(notification_id) {
            if entry.user_id == owner_id {
                entry.read = true;
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn mark_all_notifications_read(&self, owner_id: &str) -> Result<usize, StoreError> {
        let mut updated = 0;
        for mut entry in self.notifications.iter_mut() {
            let n = entry.value_mut();
            if !n.read && n.user_id == owner_id {
                n.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_notification(
        &self,
        notification_id: &str,
        owner_id: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .notifications
            .remove_if(notification_id, |_, n| n.user_id == owner_id)
            .is_some())
    }
}
