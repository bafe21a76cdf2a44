//! Per-connection event routing.
//!
//! Every inbound event is dispatched here after an activity touch. A
//! handler failure is caught per-event: logged, and reflected back only to
//! the originating connection as a scoped error event. It never terminates
//! the connection or affects other users.

use crate::error::EventError;
use crate::fanout::{broadcast, notify};
use crate::friends::requests::SendOutcome;
use crate::state::AppState;
use crate::store::NotificationDraft;
use crate::ws::protocol::{ClientEvent, RoomCount, ServerEvent};
use crate::ws::ConnectionSender;

/// Context of the connection an event arrived on: verified identity plus
/// handles to the shared components.
pub struct EventContext {
    pub state: AppState,
    pub user_id: String,
    pub conn_id: String,
    pub tx: ConnectionSender,
}

impl EventContext {
    fn reply(&self, event: &ServerEvent) {
        let _ = self.tx.send(event.to_message());
    }
}

/// Route one inbound event, converting any failure into a scoped error
/// event to the originator.
pub async fn handle_event(ctx: &EventContext, event: ClientEvent) {
    if let Err(err) = route(ctx, &event).await {
        tracing::warn!(
            user_id = %ctx.user_id,
            conn_id = %ctx.conn_id,
            error = %err,
            "event handler failed"
        );
        let scoped = match event {
            ClientEvent::SendFriendRequest { .. }
            | ClientEvent::AcceptFriendRequest { .. }
            | ClientEvent::RejectFriendRequest { .. } => ServerEvent::FriendRequestError {
                message: err.to_string(),
            },
            ClientEvent::EndFriendship { .. } => ServerEvent::FriendshipError {
                message: err.to_string(),
            },
            _ => ServerEvent::Error {
                code: err.code(),
                message: err.to_string(),
            },
        };
        ctx.reply(&scoped);
    }
}

async fn route(ctx: &EventContext, event: &ClientEvent) -> Result<(), EventError> {
    match event {
        ClientEvent::JoinRoom { room_id } => join_room(ctx, room_id).await,
        ClientEvent::LeaveRoom { room_id } => leave_room(ctx, room_id).await,
        ClientEvent::SendMessage {
            room_id,
            content,
            image_url,
        } => send_message(ctx, room_id, content, image_url.as_deref()).await,
        ClientEvent::SendDirectMessage {
            receiver_id,
            content,
            image_url,
        } => send_direct_message(ctx, receiver_id, content.as_deref(), image_url.as_deref()).await,
        ClientEvent::MarkDirectMessageAsRead { message_id } => {
            mark_direct_message_read(ctx, message_id).await
        }
        ClientEvent::MarkAllDirectMessagesAsRead { sender_id } => {
            mark_all_direct_messages_read(ctx, sender_id).await
        }
        ClientEvent::SendFriendRequest { recipient_id } => {
            send_friend_request(ctx, recipient_id).await
        }
        ClientEvent::AcceptFriendRequest { request_id } => {
            ctx.state
                .friend_requests()
                .accept(&ctx.user_id, request_id)
                .await?;
            Ok(())
        }
        ClientEvent::RejectFriendRequest { request_id } => {
            ctx.state
                .friend_requests()
                .reject(&ctx.user_id, request_id)
                .await?;
            Ok(())
        }
        ClientEvent::EndFriendship { friendship_id, .. } => {
            ctx.state
                .friend_requests()
                .end(&ctx.user_id, friendship_id)
                .await
        }
        ClientEvent::MarkNotificationAsRead { notification_id } => {
            mark_notification_read(ctx, notification_id).await
        }
        ClientEvent::MarkAllNotificationsAsRead => mark_all_notifications_read(ctx).await,
        ClientEvent::DeleteNotification { notification_id } => {
            delete_notification(ctx, notification_id).await
        }
        ClientEvent::GetOnlineFriends => get_online_friends(ctx).await,
        ClientEvent::GetRoomUsers { room_id } => get_room_users(ctx, room_id).await,
        ClientEvent::GetRoomCounts => {
            ctx.reply(&all_room_counts(&ctx.state).await?);
            Ok(())
        }
        // Pure keep-alive: the activity touch already happened in the actor.
        ClientEvent::UserActivity => Ok(()),
    }
}

async fn join_room(ctx: &EventContext, room_id: &str) -> Result<(), EventError> {
    let state = &ctx.state;
    state
        .store
        .rooms
        .room_by_id(room_id)
        .await?
        .ok_or(EventError::NotFound("room"))?;

    let newly_present = state.rooms.join(room_id, &ctx.user_id, &ctx.conn_id);
    tracing::debug!(
        user_id = %ctx.user_id,
        room_id = %room_id,
        newly_present = newly_present,
        "joined room"
    );

    if newly_present {
        emit_room_presence_update(state, room_id).await?;
        broadcast_room_counts(state).await?;
    }
    Ok(())
}

async fn leave_room(ctx: &EventContext, room_id: &str) -> Result<(), EventError> {
    let state = &ctx.state;
    let presence_ended = state.rooms.leave(room_id, &ctx.user_id, &ctx.conn_id);
    tracing::debug!(
        user_id = %ctx.user_id,
        room_id = %room_id,
        presence_ended = presence_ended,
        "left room"
    );

    if presence_ended {
        emit_room_presence_update(state, room_id).await?;
        broadcast_room_counts(state).await?;
    }
    Ok(())
}

async fn send_message(
    ctx: &EventContext,
    room_id: &str,
    content: &str,
    image_url: Option<&str>,
) -> Result<(), EventError> {
    if content.trim().is_empty() && image_url.is_none() {
        return Err(EventError::Validation("message content is required".into()));
    }
    let state = &ctx.state;
    state
        .store
        .rooms
        .room_by_id(room_id)
        .await?
        .ok_or(EventError::NotFound("room"))?;
    let sender = state
        .store
        .users
        .user_by_id(&ctx.user_id)
        .await?
        .ok_or(EventError::NotFound("user"))?;

    let message = state
        .store
        .messages
        .create_message(room_id, &sender, content, image_url)
        .await?;

    let audience = broadcast::to_room(&state.rooms, room_id);
    broadcast::deliver(&state.registry, &audience, &ServerEvent::NewMessage { message });
    Ok(())
}

async fn send_direct_message(
    ctx: &EventContext,
    receiver_id: &str,
    content: Option<&str>,
    image_url: Option<&str>,
) -> Result<(), EventError> {
    if content.map(|c| c.trim().is_empty()).unwrap_or(true) && image_url.is_none() {
        return Err(EventError::Validation("message content is required".into()));
    }
    let state = &ctx.state;
    state
        .store
        .users
        .user_by_id(receiver_id)
        .await?
        .ok_or(EventError::NotFound("user"))?;
    let sender = state
        .store
        .users
        .user_by_id(&ctx.user_id)
        .await?
        .ok_or(EventError::NotFound("user"))?;

    let message = state
        .store
        .direct_messages
        .create_direct_message(&sender, receiver_id, content, image_url)
        .await?;
    let event = ServerEvent::NewDirectMessage {
        message: message.clone(),
    };

    // Echo to every tab of the sender, then push-or-store for the receiver.
    broadcast::send_to_user(&state.registry, &ctx.user_id, &event);
    notify::dispatch(
        &state.registry,
        &state.store.notifications,
        receiver_id,
        &event,
        NotificationDraft {
            user_id: receiver_id.to_string(),
            kind: "directMessage".to_string(),
            message: format!("new message from {}", sender.username),
            reference_id: Some(message.id.clone()),
        },
    )
    .await?;
    Ok(())
}

async fn mark_direct_message_read(ctx: &EventContext, message_id: &str) -> Result<(), EventError> {
    let state = &ctx.state;
    let message = state
        .store
        .direct_messages
        .mark_read(message_id, &ctx.user_id)
        .await?
        .ok_or(EventError::NotFound("direct message"))?;

    let event = ServerEvent::DirectMessageRead {
        message_id: message.id.clone(),
        reader_id: ctx.user_id.clone(),
    };
    broadcast::send_to_user(&state.registry, &message.sender.id, &event);
    ctx.reply(&event);
    Ok(())
}

async fn mark_all_direct_messages_read(
    ctx: &EventContext,
    sender_id: &str,
) -> Result<(), EventError> {
    let state = &ctx.state;
    let count = state
        .store
        .direct_messages
        .mark_all_read(sender_id, &ctx.user_id)
        .await?;

    let event = ServerEvent::AllDirectMessagesRead {
        reader_id: ctx.user_id.clone(),
        count,
    };
    broadcast::send_to_user(&state.registry, sender_id, &event);
    ctx.reply(&event);
    Ok(())
}

async fn send_friend_request(ctx: &EventContext, recipient_id: &str) -> Result<(), EventError> {
    match ctx
        .state
        .friend_requests()
        .send(&ctx.user_id, recipient_id)
        .await?
    {
        SendOutcome::Created(request) | SendOutcome::AlreadyPending(request) => {
            ctx.reply(&ServerEvent::FriendRequestSent { request });
        }
        SendOutcome::AlreadyFriends(friendship) => {
            tracing::debug!(
                user_id = %ctx.user_id,
                friendship_id = %friendship.id,
                "friend request skipped, already friends"
            );
            // The originator still gets a reply; leaving the client waiting
            // on a silently dropped request is worse than a soft error.
            ctx.reply(&ServerEvent::FriendRequestError {
                message: "you are already friends with this user".to_string(),
            });
        }
    }
    Ok(())
}

async fn mark_notification_read(ctx: &EventContext, notification_id: &str) -> Result<(), EventError> {
    let updated = ctx
        .state
        .store
        .notifications
        .mark_notification_read(notification_id, &ctx.user_id)
        .await?;
    if !updated {
        return Err(EventError::NotFound("notification"));
    }
    ctx.reply(&ServerEvent::NotificationMarkedAsRead {
        notification_id: notification_id.to_string(),
    });
    Ok(())
}

async fn mark_all_notifications_read(ctx: &EventContext) -> Result<(), EventError> {
    let count = ctx
        .state
        .store
        .notifications
        .mark_all_notifications_read(&ctx.user_id)
        .await?;
    ctx.reply(&ServerEvent::AllNotificationsMarkedAsRead { count });
    Ok(())
}

async fn delete_notification(ctx: &EventContext, notification_id: &str) -> Result<(), EventError> {
    let deleted = ctx
        .state
        .store
        .notifications
        .delete_notification(notification_id, &ctx.user_id)
        .await?;
    if !deleted {
        return Err(EventError::NotFound("notification"));
    }
    ctx.reply(&ServerEvent::NotificationDeleted {
        notification_id: notification_id.to_string(),
    });
    Ok(())
}

async fn get_online_friends(ctx: &EventContext) -> Result<(), EventError> {
    let state = &ctx.state;
    let online_ids: Vec<String> = state
        .friend_graph()
        .friends_of(&ctx.user_id)
        .await?
        .into_iter()
        .filter(|id| state.registry.is_online(id))
        .collect();
    let mut friends = state.store.users.users_by_ids(&online_ids).await?;
    friends.sort_by(|a, b| a.username.cmp(&b.username));

    ctx.reply(&ServerEvent::OnlineFriends { friends });
    Ok(())
}

async fn get_room_users(ctx: &EventContext, room_id: &str) -> Result<(), EventError> {
    let state = &ctx.state;
    state
        .store
        .rooms
        .room_by_id(room_id)
        .await?
        .ok_or(EventError::NotFound("room"))?;

    ctx.reply(&room_users_update(state, room_id).await?);
    Ok(())
}

/// Push the room's roster (sorted by display name) and live-user count to
/// everyone currently joined to it.
pub(crate) async fn emit_room_presence_update(
    state: &AppState,
    room_id: &str,
) -> Result<(), EventError> {
    let roster = room_users_update(state, room_id).await?;
    let count = ServerEvent::RoomUserCount {
        room_id: room_id.to_string(),
        count: state.rooms.user_count(room_id),
    };

    let audience = broadcast::to_room(&state.rooms, room_id);
    broadcast::deliver(&state.registry, &audience, &roster);
    broadcast::deliver(&state.registry, &audience, &count);
    Ok(())
}

async fn room_users_update(state: &AppState, room_id: &str) -> Result<ServerEvent, EventError> {
    let user_ids = state.rooms.users_in(room_id);
    let mut users = state.store.users.users_by_ids(&user_ids).await?;
    users.sort_by(|a, b| a.username.cmp(&b.username));
    Ok(ServerEvent::RoomUsersUpdate {
        room_id: room_id.to_string(),
        users,
    })
}

/// Live user counts for all rooms with durable "public" visibility.
pub(crate) async fn all_room_counts(state: &AppState) -> Result<ServerEvent, EventError> {
    let public_ids = state.store.rooms.public_room_ids().await?;
    let counts = state
        .rooms
        .counts()
        .into_iter()
        .filter(|(room_id, _)| public_ids.contains(room_id))
        .map(|(room_id, count)| RoomCount { room_id, count })
        .collect();
    Ok(ServerEvent::AllRoomCounts { counts })
}

/// Broadcast the public room counts to every connection; called after every
/// join/leave that changed a roster.
pub(crate) async fn broadcast_room_counts(state: &AppState) -> Result<(), EventError> {
    let event = all_room_counts(state).await?;
    broadcast::send_to_all(&state.registry, &event);
    Ok(())
}
