use axum::{extract::State, http::HeaderMap, Json};

use thutalk_types::{FriendRequest, Notification, UnreadCounts};

use super::{get_user_from_headers, ApiError, ApiResult};
use crate::db::repositories::{FriendRepository, MessageRepository, NotificationRepository};
use crate::state::AppState;

/// GET /notifications - Notifications plus pending friend requests
pub async fn list_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let notifications: Vec<Notification> = NotificationRepository::new(state.db.pool.clone())
        .list_for_user(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let friend_requests: Vec<FriendRequest> = FriendRepository::new(state.db.pool.clone())
        .incoming_requests(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "notifications": notifications,
        "friend_requests": friend_requests,
    })))
}

/// POST /notifications/mark-all-read - Clear the bell badge
pub async fn mark_all_read(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let marked = NotificationRepository::new(state.db.pool.clone())
        .mark_all_seen(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "marked": marked,
    })))
}

/// GET /get_unread_count - Badge counters for the bell and chat icons
///
/// The bell counts unseen non-message notifications plus pending friend
/// requests; message traffic gets its own chat badge.
pub async fn get_unread_count(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<UnreadCounts>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let general = NotificationRepository::new(state.db.pool.clone())
        .unseen_general_count(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    let friend_requests = FriendRepository::new(state.db.pool.clone())
        .incoming_count(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    let unread_chats = MessageRepository::new(state.db.pool.clone())
        .unread_total(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(UnreadCounts {
        unread_notifications: general + friend_requests,
        unread_chats,
    }))
}
