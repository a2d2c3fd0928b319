use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use thutalk_types::{FriendRequest, Notification, NotificationKind, Profile};

use super::{get_user_from_headers, parse_uuid, ApiError, ApiResult};
use crate::db::repositories::{
    BlockRepository, FriendRepository, NotificationRepository, ProfileRepository, UserRepository,
};
use crate::state::AppState;

/// POST /friend/request/:user_id - Send a friend request
pub async fn send_friend_request(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let from_user_id = get_user_from_headers(&state, &headers)?;
    let to_user_id = parse_uuid(&user_id)?;

    if from_user_id == to_user_id {
        return Err(ApiError::BadRequest(
            "You cannot friend yourself".to_string(),
        ));
    }

    let target = UserRepository::new(state.db.pool.clone())
        .get_by_id(&to_user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    if target.is_bot {
        return Err(ApiError::BadRequest(
            "You cannot friend a bot account".to_string(),
        ));
    }

    if BlockRepository::new(state.db.pool.clone())
        .is_blocked_either_way(&from_user_id, &to_user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
    {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let friends = FriendRepository::new(state.db.pool.clone());
    if friends
        .are_friends(&from_user_id, &to_user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
    {
        return Err(ApiError::BadRequest("You are already friends".to_string()));
    }
    if friends
        .get_request_between(&from_user_id, &to_user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .is_some()
    {
        return Err(ApiError::BadRequest("Request already sent".to_string()));
    }
    // If they already asked first, point the caller at their pending request
    if friends
        .get_request_between(&to_user_id, &from_user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .is_some()
    {
        return Err(ApiError::BadRequest(
            "This user has already sent you a request".to_string(),
        ));
    }

    friends
        .create_request(&FriendRequest {
            id: Uuid::new_v4(),
            from_user_id,
            to_user_id,
            from_username: String::new(),
            created_at: Utc::now(),
        })
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Friend request sent"
    })))
}

/// POST /friend/accept/:request_id - Accept an incoming request
pub async fn accept_friend(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let request_id = parse_uuid(&request_id)?;

    let friends = FriendRepository::new(state.db.pool.clone());
    let request = friends
        .get_request_by_id(&request_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Friend request not found".to_string()))?;

    if request.to_user_id != user_id {
        return Err(ApiError::Forbidden(
            "This request was not sent to you".to_string(),
        ));
    }

    friends
        .add_friendship(&request.from_user_id, &request.to_user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    friends
        .delete_request(&request_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    NotificationRepository::new(state.db.pool.clone())
        .create(&Notification {
            id: Uuid::new_v4(),
            recipient_id: request.from_user_id,
            sender_id: user_id,
            sender_username: String::new(),
            kind: NotificationKind::FriendAccept,
            content: None,
            post_id: None,
            is_seen: false,
            created_at: Utc::now(),
        })
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Friend request accepted"
    })))
}

/// DELETE /friend/delete/:request_id - Reject an incoming request
pub async fn delete_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let request_id = parse_uuid(&request_id)?;

    let friends = FriendRepository::new(state.db.pool.clone());
    let request = friends
        .get_request_by_id(&request_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Friend request not found".to_string()))?;

    if request.to_user_id != user_id {
        return Err(ApiError::Forbidden(
            "This request was not sent to you".to_string(),
        ));
    }

    friends
        .delete_request(&request_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Friend request removed"
    })))
}

/// DELETE /friend/cancel/:user_id - Cancel a request you sent
pub async fn cancel_friend_request(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let from_user_id = get_user_from_headers(&state, &headers)?;
    let to_user_id = parse_uuid(&user_id)?;

    let friends = FriendRepository::new(state.db.pool.clone());
    let request_id = friends
        .get_request_between(&from_user_id, &to_user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("No pending request to cancel".to_string()))?;

    friends
        .delete_request(&request_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Friend request cancelled"
    })))
}

/// DELETE /unfriend/:user_id - End a friendship (both directions)
pub async fn unfriend_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let caller_id = get_user_from_headers(&state, &headers)?;
    let other_id = parse_uuid(&user_id)?;

    let removed = FriendRepository::new(state.db.pool.clone())
        .remove_friendship(&caller_id, &other_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    if removed == 0 {
        return Err(ApiError::NotFound("You are not friends".to_string()));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Unfriended"
    })))
}

/// POST /block/:user_id - Block a user
///
/// Severs any friendship and pending requests between the pair.
pub async fn block_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let blocker_id = get_user_from_headers(&state, &headers)?;
    let blocked_id = parse_uuid(&user_id)?;

    if blocker_id == blocked_id {
        return Err(ApiError::BadRequest("You cannot block yourself".to_string()));
    }

    let target = UserRepository::new(state.db.pool.clone())
        .get_by_id(&blocked_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    if target.is_bot {
        return Err(ApiError::BadRequest(
            "You cannot block a bot account".to_string(),
        ));
    }

    BlockRepository::new(state.db.pool.clone())
        .block(&blocker_id, &blocked_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "User blocked"
    })))
}

/// GET /settings/blocked - Users you have blocked
pub async fn list_blocked(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Profile>>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let blocked_ids = BlockRepository::new(state.db.pool.clone())
        .list_blocked(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let profiles = ProfileRepository::new(state.db.pool.clone());
    let mut blocked = Vec::new();
    for blocked_id in blocked_ids {
        if let Some(profile) = profiles
            .get_by_user_id(&blocked_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
        {
            blocked.push(profile);
        }
    }

    Ok(Json(blocked))
}

/// DELETE /unblock/:user_id - Remove your block on a user
pub async fn unblock_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let blocker_id = get_user_from_headers(&state, &headers)?;
    let blocked_id = parse_uuid(&user_id)?;

    let removed = BlockRepository::new(state.db.pool.clone())
        .unblock(&blocker_id, &blocked_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    if removed == 0 {
        return Err(ApiError::NotFound(
            "You have not blocked this user".to_string(),
        ));
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "User unblocked"
    })))
}
