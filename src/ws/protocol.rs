//! WebSocket protocol types.
//!
//! JSON envelopes, internally tagged by `type` with camelCase event names.
//! [`ClientEvent`] covers everything a connection may send; [`ServerEvent`]
//! covers everything the server pushes.

use axum::extract::ws::Message;
use serde::{Deserialize, Serialize};

use crate::store::{DirectMessage, FriendRequest, Message as RoomMessage, Notification, UserProfile};

/// Events sent FROM the client TO the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    SendMessage {
        room_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    SendDirectMessage {
        receiver_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_url: Option<String>,
    },
    MarkDirectMessageAsRead {
        message_id: String,
    },
    MarkAllDirectMessagesAsRead {
        sender_id: String,
    },
    SendFriendRequest {
        recipient_id: String,
    },
    AcceptFriendRequest {
        request_id: String,
    },
    RejectFriendRequest {
        request_id: String,
    },
    EndFriendship {
        friendship_id: String,
        friend_id: String,
    },
    MarkNotificationAsRead {
        notification_id: String,
    },
    MarkAllNotificationsAsRead,
    DeleteNotification {
        notification_id: String,
    },
    GetOnlineFriends,
    GetRoomUsers {
        room_id: String,
    },
    GetRoomCounts,
    UserActivity,
}

/// Live user count of one room, as carried in `allRoomCounts`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomCount {
    pub room_id: String,
    pub count: usize,
}

/// Events pushed FROM the server TO clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    NewMessage {
        message: RoomMessage,
    },
    NewDirectMessage {
        message: DirectMessage,
    },
    DirectMessageRead {
        message_id: String,
        reader_id: String,
    },
    AllDirectMessagesRead {
        reader_id: String,
        count: usize,
    },
    NewFriendRequest {
        request: FriendRequest,
        sender: UserProfile,
    },
    FriendRequestSent {
        request: FriendRequest,
    },
    FriendRequestError {
        message: String,
    },
    FriendRequestAccepted {
        friendship_id: String,
        friend: UserProfile,
    },
    FriendRequestRejected {
        request_id: String,
    },
    FriendshipEnded {
        friendship_id: String,
        user_id: String,
    },
    FriendshipError {
        message: String,
    },
    NewNotification {
        notification: Notification,
    },
    NotificationMarkedAsRead {
        notification_id: String,
    },
    AllNotificationsMarkedAsRead {
        count: usize,
    },
    NotificationDeleted {
        notification_id: String,
    },
    RoomUserCount {
        room_id: String,
        count: usize,
    },
    RoomUsersUpdate {
        room_id: String,
        users: Vec<UserProfile>,
    },
    AllRoomCounts {
        counts: Vec<RoomCount>,
    },
    OnlineFriends {
        friends: Vec<UserProfile>,
    },
    FriendOnlineStatusUpdate {
        user_id: String,
        is_online: bool,
    },
    InactivityWarning {
        /// Seconds until the forced disconnect.
        time_left: u64,
    },
    InactivityDisconnect,
    Error {
        code: u16,
        message: String,
    },
}

impl ServerEvent {
    /// Encode as a text WebSocket frame. Serialization of these enums
    /// cannot fail; the fallback is never expected to be hit.
    pub fn to_message(&self) -> Message {
        let json = serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"type":"error","code":500,"message":"encoding failure"}"#.into());
        Message::Text(json.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_camel_case_tags() {
        let event: ClientEvent =
            serde_json::from_str(r#"{"type":"joinRoom","roomId":"r1"}"#).unwrap();
        assert!(matches!(event, ClientEvent::JoinRoom { room_id } if room_id == "r1"));

        let event: ClientEvent = serde_json::from_str(r#"{"type":"userActivity"}"#).unwrap();
        assert!(matches!(event, ClientEvent::UserActivity));
    }

    #[test]
    fn optional_payload_fields_default() {
        let event: ClientEvent = serde_json::from_str(
            r#"{"type":"sendDirectMessage","receiverId":"u2","content":"hi"}"#,
        )
        .unwrap();
        let ClientEvent::SendDirectMessage {
            receiver_id,
            content,
            image_url,
        } = event
        else {
            panic!("wrong variant");
        };
        assert_eq!(receiver_id, "u2");
        assert_eq!(content.as_deref(), Some("hi"));
        assert!(image_url.is_none());
    }

    #[test]
    fn server_events_tag_as_camel_case() {
        let json = serde_json::to_string(&ServerEvent::FriendOnlineStatusUpdate {
            user_id: "u1".into(),
            is_online: true,
        })
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["type"], "friendOnlineStatusUpdate");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["isOnline"], true);
    }
}
