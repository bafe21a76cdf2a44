//! Friend-request state machine: send / accept / reject / end.
//!
//! Storage lives with the collaborators; this workflow enforces the
//! transition rules and emits the real-time events. Send is idempotent
//! while a pending record exists between the pair; accept and reject are
//! legal only for the request's recipient.

use std::sync::Arc;

use crate::error::EventError;
use crate::fanout::{broadcast, notify};
use crate::presence::ConnectionRegistry;
use crate::store::{
    FriendRequest, FriendRequestStatus, FriendRequestStore, Friendship, FriendshipStore,
    NotificationDraft, NotificationStore, UserProfile, UserStore,
};
use crate::ws::protocol::ServerEvent;

/// Result of [`FriendRequestWorkflow::send`].
#[derive(Debug)]
pub enum SendOutcome {
    /// A new pending request was created and the recipient was notified.
    Created(FriendRequest),
    /// A pending request already existed between the pair (either
    /// direction); it is returned unchanged and nothing is re-sent.
    AlreadyPending(FriendRequest),
    /// The two users are already friends; no request exists or is created.
    AlreadyFriends(Friendship),
}

pub struct FriendRequestWorkflow {
    registry: Arc<ConnectionRegistry>,
    users: Arc<dyn UserStore>,
    friendships: Arc<dyn FriendshipStore>,
    requests: Arc<dyn FriendRequestStore>,
    notifications: Arc<dyn NotificationStore>,
}

impl FriendRequestWorkflow {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        users: Arc<dyn UserStore>,
        friendships: Arc<dyn FriendshipStore>,
        requests: Arc<dyn FriendRequestStore>,
        notifications: Arc<dyn NotificationStore>,
    ) -> Self {
        Self {
            registry,
            users,
            friendships,
            requests,
            notifications,
        }
    }

    pub async fn send(
        &self,
        sender_id: &str,
        recipient_id: &str,
    ) -> Result<SendOutcome, EventError> {
        if sender_id == recipient_id {
            return Err(EventError::Validation(
                "cannot send a friend request to yourself".into(),
            ));
        }

        let sender = self.profile_of(sender_id).await?;
        if self.users.user_by_id(recipient_id).await?.is_none() {
            return Err(EventError::NotFound("user"));
        }

        if let Some(existing) = self.requests.pending_between(sender_id, recipient_id).await? {
            return Ok(SendOutcome::AlreadyPending(existing));
        }
        if let Some(friendship) = self
            .friendships
            .friendship_between(sender_id, recipient_id)
            .await?
        {
            return Ok(SendOutcome::AlreadyFriends(friendship));
        }

        let request = self.requests.create_request(sender_id, recipient_id).await?;
        tracing::info!(
            request_id = %request.id,
            sender = %sender_id,
            recipient = %recipient_id,
            "friend request created"
        );

        notify::dispatch(
            &self.registry,
            &self.notifications,
            recipient_id,
            &ServerEvent::NewFriendRequest {
                request: request.clone(),
                sender: sender.clone(),
            },
            NotificationDraft {
                user_id: recipient_id.to_string(),
                kind: "friendRequest".to_string(),
                message: format!("{} sent you a friend request", sender.username),
                reference_id: Some(request.id.clone()),
            },
        )
        .await?;

        Ok(SendOutcome::Created(request))
    }

    /// Accept: recipient-only while pending. The friendship is created and
    /// the request deleted before either party is notified.
    pub async fn accept(
        &self,
        actor_id: &str,
        request_id: &str,
    ) -> Result<Friendship, EventError> {
        let request = self.pending_request(request_id).await?;
        if request.recipient_id != actor_id {
            return Err(EventError::Authorization(
                "only the recipient can accept a friend request".into(),
            ));
        }

        let friendship = self
            .friendships
            .create_friendship(&request.sender_id, &request.recipient_id)
            .await?;
        self.requests.delete_request(&request.id).await?;
        tracing::info!(
            friendship_id = %friendship.id,
            request_id = %request.id,
            "friend request accepted"
        );

        let sender = self.profile_of(&request.sender_id).await?;
        let recipient = self.profile_of(&request.recipient_id).await?;
        broadcast::send_to_user(
            &self.registry,
            &request.recipient_id,
            &ServerEvent::FriendRequestAccepted {
                friendship_id: friendship.id.clone(),
                friend: sender,
            },
        );
        broadcast::send_to_user(
            &self.registry,
            &request.sender_id,
            &ServerEvent::FriendRequestAccepted {
                friendship_id: friendship.id.clone(),
                friend: recipient,
            },
        );

        Ok(friendship)
    }

    /// Reject: recipient-only while pending. Deletes the record and
    /// notifies the sender only.
    pub async fn reject(
        &self,
        actor_id: &str,
        request_id: &str,
    ) -> Result<FriendRequest, EventError> {
        let request = self.pending_request(request_id).await?;
        if request.recipient_id != actor_id {
            return Err(EventError::Authorization(
                "only the recipient can reject a friend request".into(),
            ));
        }

        self.requests.delete_request(&request.id).await?;
        tracing::info!(request_id = %request.id, "friend request rejected");

        broadcast::send_to_user(
            &self.registry,
            &request.sender_id,
            &ServerEvent::FriendRequestRejected {
                request_id: request.id.clone(),
            },
        );

        Ok(request)
    }

    /// End a friendship: legal for either party. Notifies both.
    pub async fn end(&self, actor_id: &str, friendship_id: &str) -> Result<(), EventError> {
        let friendship = self
            .friendships
            .friendship_by_id(friendship_id)
            .await?
            .ok_or(EventError::NotFound("friendship"))?;
        let Some(counterpart) = friendship.counterpart(actor_id).map(|s| s.to_string()) else {
            return Err(EventError::Authorization(
                "not a party to this friendship".into(),
            ));
        };

        self.friendships.delete_friendship(&friendship.id).await?;
        tracing::info!(friendship_id = %friendship.id, "friendship ended");

        broadcast::send_to_user(
            &self.registry,
            actor_id,
            &ServerEvent::FriendshipEnded {
                friendship_id: friendship.id.clone(),
                user_id: counterpart.clone(),
            },
        );
        broadcast::send_to_user(
            &self.registry,
            &counterpart,
            &ServerEvent::FriendshipEnded {
                friendship_id: friendship.id.clone(),
                user_id: actor_id.to_string(),
            },
        );

        Ok(())
    }

    async fn pending_request(&self, request_id: &str) -> Result<FriendRequest, EventError> {
        let request = self
            .requests
            .request_by_id(request_id)
            .await?
            .ok_or(EventError::NotFound("friend request"))?;
        if request.status != FriendRequestStatus::Pending {
            return Err(EventError::Validation("request is no longer pending".into()));
        }
        Ok(request)
    }

    async fn profile_of(&self, user_id: &str) -> Result<UserProfile, EventError> {
        self.users
            .user_by_id(user_id)
            .await?
            .ok_or(EventError::NotFound("user"))
    }
}
