use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use thutalk_types::{
    Conversation, EditMessageRequest, Message, Notification, NotificationKind, SendMessageRequest,
    UserStatus,
};

use super::{get_user_from_headers, parse_uuid, ApiError, ApiResult};
use crate::bot;
use crate::db::repositories::{
    BlockRepository, MessageRepository, NotificationRepository, ProfileRepository, UserRepository,
};
use crate::state::AppState;

/// A user counts as online this long after their last request
const PRESENCE_WINDOW_MINUTES: i64 = 5;

#[derive(Deserialize)]
pub struct MessageSearchQuery {
    pub q: String,
}

fn lookup_partner(
    state: &AppState,
    me: &Uuid,
    username: &str,
) -> Result<thutalk_types::User, ApiError> {
    let user = UserRepository::new(state.db.pool.clone())
        .get_by_username(username)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let blocked = BlockRepository::new(state.db.pool.clone())
        .is_blocked_either_way(me, &user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    if blocked {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    Ok(user)
}

/// GET /chats - Conversation list with last message and unread counts
pub async fn chat_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Conversation>>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let messages = MessageRepository::new(state.db.pool.clone());
    let users = UserRepository::new(state.db.pool.clone());
    let profiles = ProfileRepository::new(state.db.pool.clone());

    let partner_ids = messages
        .get_partners(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let mut conversations = Vec::new();
    for other_id in partner_ids {
        let other = users
            .get_by_id(&other_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        let avatar = profiles
            .get_by_user_id(&other_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .and_then(|p| p.avatar);

        let thread = messages
            .get_conversation(&user_id, &other_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?;

        let unread_count = thread
            .iter()
            .filter(|m| m.receiver_id == user_id && !m.is_read)
            .count();

        if thread.is_empty() {
            continue;
        }

        let (last_message, last_message_time) = match thread.last() {
            Some(last) => {
                // Attachments without text still need a preview line
                let preview = last
                    .content
                    .clone()
                    .unwrap_or_else(|| {
                        if last.voice_note.is_some() {
                            "🎤 Voice message".to_string()
                        } else {
                            "📷 Photo".to_string()
                        }
                    });
                (preview, last.created_at.to_rfc3339())
            }
            None => ("No messages yet".to_string(), Utc::now().to_rfc3339()),
        };

        conversations.push(Conversation {
            other_user_id: other_id,
            other_username: other.username,
            other_avatar: avatar,
            last_message,
            last_message_time,
            unread_count,
        });
    }

    Ok(Json(conversations))
}

/// GET /chat/:username - Full conversation; marks their messages read
pub async fn chat_room(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Message>>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let other = lookup_partner(&state, &user_id, &username)?;

    let messages = MessageRepository::new(state.db.pool.clone());
    let thread = messages
        .get_conversation(&user_id, &other.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    messages
        .mark_read(&user_id, &other.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(thread))
}

/// GET /api/get_messages/:username - Poll endpoint for the open chat
pub async fn get_messages(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Message>>> {
    chat_room(State(state), Path(username), headers).await
}

/// POST /api/send_message/:username - Send a direct message
///
/// Messages to the chat bot get an immediate scripted reply.
pub async fn send_message(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<SendMessageRequest>,
) -> ApiResult<Json<Vec<Message>>> {
    let sender_id = get_user_from_headers(&state, &headers)?;

    if payload.is_empty() {
        return Err(ApiError::BadRequest(
            "You cannot send an empty message".to_string(),
        ));
    }

    let receiver = lookup_partner(&state, &sender_id, &username)?;
    if receiver.id == sender_id {
        return Err(ApiError::BadRequest(
            "You cannot message yourself".to_string(),
        ));
    }

    let messages = MessageRepository::new(state.db.pool.clone());

    if let Some(parent_id) = payload.parent_id {
        let parent = messages
            .get_by_id(&parent_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound("Message to reply to not found".to_string()))?;
        let in_thread = (parent.sender_id == sender_id && parent.receiver_id == receiver.id)
            || (parent.sender_id == receiver.id && parent.receiver_id == sender_id);
        if !in_thread {
            return Err(ApiError::BadRequest(
                "You can only reply within this conversation".to_string(),
            ));
        }
    }

    let message = Message {
        id: Uuid::new_v4(),
        sender_id,
        receiver_id: receiver.id,
        sender_username: String::new(),
        content: payload.content.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        image: payload.image,
        voice_note: payload.voice_note,
        parent_id: payload.parent_id,
        is_read: false,
        is_edited: false,
        created_at: Utc::now(),
    };
    messages
        .create(&message)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let mut sent = vec![message];

    if receiver.username == bot::CHAT_BOT_USERNAME {
        let incoming = sent[0].content.clone().unwrap_or_default();
        let reply = bot::reply_to_message(&state.db, &sender_id, &incoming)
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
        sent.push(reply);
    } else if !receiver.is_bot {
        NotificationRepository::new(state.db.pool.clone())
            .create(&Notification {
                id: Uuid::new_v4(),
                recipient_id: receiver.id,
                sender_id,
                sender_username: String::new(),
                kind: NotificationKind::Message,
                content: None,
                post_id: None,
                is_seen: false,
                created_at: Utc::now(),
            })
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
    }

    Ok(Json(sent))
}

/// PUT /chat/edit_message/:message_id - Edit own text message
pub async fn edit_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<EditMessageRequest>,
) -> ApiResult<Json<Message>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let message_id = parse_uuid(&message_id)?;

    if payload.content.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "Message text cannot be empty".to_string(),
        ));
    }

    let messages = MessageRepository::new(state.db.pool.clone());
    let message = messages
        .get_by_id(&message_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

    if message.sender_id != user_id {
        return Err(ApiError::Forbidden(
            "Only the sender can edit a message".to_string(),
        ));
    }

    messages
        .update_content(&message_id, payload.content.trim())
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let updated = messages
        .get_by_id(&message_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

    Ok(Json(updated))
}

/// DELETE /chat/delete_message/:message_id - Delete own message
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let message_id = parse_uuid(&message_id)?;

    let messages = MessageRepository::new(state.db.pool.clone());
    let message = messages
        .get_by_id(&message_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Message not found".to_string()))?;

    if message.sender_id != user_id {
        return Err(ApiError::Forbidden(
            "Only the sender can delete a message".to_string(),
        ));
    }

    messages
        .delete(&message_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Message deleted"
    })))
}

/// GET /chat/search/:username?q= - Search within one conversation
pub async fn search_messages(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Query(query): Query<MessageSearchQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Message>>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let other = lookup_partner(&state, &user_id, &username)?;

    let term = query.q.trim();
    if term.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let hits = MessageRepository::new(state.db.pool.clone())
        .search_conversation(&user_id, &other.id, term)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(hits))
}

/// GET /api/user_status/:username - Presence for the chat header
pub async fn user_status(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<UserStatus>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let other = lookup_partner(&state, &user_id, &username)?;

    // Bots are always around
    if other.is_bot {
        return Ok(Json(UserStatus {
            username: other.username,
            last_seen: Some(Utc::now()),
            online: true,
        }));
    }

    let profile = ProfileRepository::new(state.db.pool.clone())
        .get_by_user_id(&other.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    let online = profile
        .last_seen
        .is_some_and(|seen| Utc::now() - seen < Duration::minutes(PRESENCE_WINDOW_MINUTES));

    Ok(Json(UserStatus {
        username: other.username,
        last_seen: profile.last_seen,
        online,
    }))
}
