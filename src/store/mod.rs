//! Collaborator interfaces for durable state.
//!
//! The live-connection core never owns persistence: rooms, users, messages,
//! friendships, friend requests and notifications live behind these traits.
//! The shipped implementation is [`memory::MemoryStore`]; a database-backed
//! store can be substituted without touching any caller.

pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure from a storage collaborator. Handlers surface this to the
/// originating connection only.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// User projection used everywhere the core needs to show a user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomVisibility {
    Public,
    Private,
}

/// Durable room configuration. Distinct from the in-memory roster: this is
/// what `joinRoom` validates against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub id: String,
    pub name: String,
    pub visibility: RoomVisibility,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub room_id: String,
    pub sender: UserProfile,
    pub content: String,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessage {
    pub id: String,
    pub sender: UserProfile,
    pub receiver_id: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Confirmed friendship. The pair is unordered; either slot may hold either
/// user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Friendship {
    pub id: String,
    pub user_a: String,
    pub user_b: String,
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    pub fn involves(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The other side of the edge, if `user_id` is a party.
    pub fn counterpart(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestStatus {
    Pending,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendRequest {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub status: FriendRequestStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    /// Owner of the notification (the recipient).
    pub user_id: String,
    /// Notification kind, e.g. "friendRequest", "directMessage".
    pub kind: String,
    pub message: String,
    /// Id of the entity the notification refers to, if any.
    pub reference_id: Option<String>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a durable notification record.
#[derive(Debug, Clone)]
pub struct NotificationDraft {
    pub user_id: String,
    pub kind: String,
    pub message: String,
    pub reference_id: Option<String>,
}

#[async_trait]
pub trait RoomStore: Send + Sync {
    async fn room_by_id(&self, room_id: &str) -> Result<Option<Room>, StoreError>;
    async fn public_room_ids(&self) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn user_by_id(&self, user_id: &str) -> Result<Option<UserProfile>, StoreError>;
    /// Batch lookup. Unknown ids are silently absent from the result.
    async fn users_by_ids(&self, user_ids: &[String]) -> Result<Vec<UserProfile>, StoreError>;
}

#[async_trait]
pub trait FriendshipStore: Send + Sync {
    async fn friendship_by_id(&self, id: &str) -> Result<Option<Friendship>, StoreError>;
    /// All friendships where `user_id` occupies either slot.
    async fn friendships_of(&self, user_id: &str) -> Result<Vec<Friendship>, StoreError>;
    /// The friendship between two users, regardless of slot order.
    async fn friendship_between(&self, a: &str, b: &str)
        -> Result<Option<Friendship>, StoreError>;
    async fn create_friendship(&self, a: &str, b: &str) -> Result<Friendship, StoreError>;
    async fn delete_friendship(&self, id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait FriendRequestStore: Send + Sync {
    async fn request_by_id(&self, id: &str) -> Result<Option<FriendRequest>, StoreError>;
    /// Pending request between two users, in either direction.
    async fn pending_between(&self, a: &str, b: &str)
        -> Result<Option<FriendRequest>, StoreError>;
    async fn create_request(
        &self,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<FriendRequest, StoreError>;
    async fn delete_request(&self, id: &str) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn create_message(
        &self,
        room_id: &str,
        sender: &UserProfile,
        content: &str,
        image_url: Option<&str>,
    ) -> Result<Message, StoreError>;
}

#[async_trait]
pub trait DirectMessageStore: Send + Sync {
    async fn create_direct_message(
        &self,
        sender: &UserProfile,
        receiver_id: &str,
        content: Option<&str>,
        image_url: Option<&str>,
    ) -> Result<DirectMessage, StoreError>;
    /// Mark one message read. Returns the updated message if it exists and
    /// `reader_id` is its receiver.
    async fn mark_read(
        &self,
        message_id: &str,
        reader_id: &str,
    ) -> Result<Option<DirectMessage>, StoreError>;
    /// Mark all messages from `sender_id` to `reader_id` read. Returns how
    /// many were updated.
    async fn mark_all_read(&self, sender_id: &str, reader_id: &str)
        -> Result<usize, StoreError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create_notification(
        &self,
        draft: NotificationDraft,
    ) -> Result<Notification, StoreError>;
    /// Mark read; returns false if the notification does not exist or is not
    /// owned by `owner_id`.
    async fn mark_notification_read(
        &self,
        notification_id: &str,
        owner_id: &str,
    ) -> Result<bool, StoreError>;
    async fn mark_all_notifications_read(&self, owner_id: &str) -> Result<usize, StoreError>;
    async fn delete_notification(
        &self,
        notification_id: &str,
        owner_id: &str,
    ) -> Result<bool, StoreError>;
}

/// Bundle of collaborator handles injected into the core components.
pub struct Collaborators {
    pub rooms: std::sync::Arc<dyn RoomStore>,
    pub users: std::sync::Arc<dyn UserStore>,
    pub friendships: std::sync::Arc<dyn FriendshipStore>,
    pub friend_requests: std::sync::Arc<dyn FriendRequestStore>,
    pub messages: std::sync::Arc<dyn MessageStore>,
    pub direct_messages: std::sync::Arc<dyn DirectMessageStore>,
    pub notifications: std::sync::Arc<dyn NotificationStore>,
}

impl Collaborators {
    /// Wire every collaborator to a single [`memory::MemoryStore`].
    pub fn from_memory(store: std::sync::Arc<memory::MemoryStore>) -> Self {
        Self {
            rooms: store.clone(),
            users: store.clone(),
            friendships: store.clone(),
            friend_requests: store.clone(),
            messages: store.clone(),
            direct_messages: store.clone(),
            notifications: store,
        }
    }
}
