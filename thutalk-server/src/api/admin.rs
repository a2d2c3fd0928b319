use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use thutalk_types::{AdminBroadcast, BanRequest, BroadcastRequest, ChangeRoleRequest, Role};

use super::{parse_uuid, require_staff, ApiError, ApiResult};
use crate::bot;
use crate::db::repositories::{
    BroadcastRepository, ProfileRepository, UserRepository,
};
use crate::state::AppState;

/// POST /admin/ban-user/:user_id - Ban a user, optionally until a date
///
/// Their sessions are revoked so the ban takes effect immediately.
pub async fn ban_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<BanRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let staff = require_staff(&state, &headers)?;
    let target_id = parse_uuid(&user_id)?;

    if staff.id == target_id {
        return Err(ApiError::BadRequest("You cannot ban yourself".to_string()));
    }

    let target = UserRepository::new(state.db.pool.clone())
        .get_by_id(&target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if target.is_staff || target.is_bot {
        return Err(ApiError::BadRequest(
            "Staff and bot accounts cannot be banned".to_string(),
        ));
    }

    if payload.reason.trim().is_empty() {
        return Err(ApiError::BadRequest("A ban needs a reason".to_string()));
    }

    ProfileRepository::new(state.db.pool.clone())
        .set_ban(&target_id, payload.reason.trim(), payload.until)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let revoked = state
        .session_manager
        .delete_sessions_for_user(&target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!(
        "Staff {} banned {} ({} sessions revoked)",
        staff.username,
        target.username,
        revoked
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("{} banned", target.username),
    })))
}

/// POST /admin/unban-user/:user_id - Lift a ban manually
pub async fn unban_user(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    require_staff(&state, &headers)?;
    let target_id = parse_uuid(&user_id)?;

    ProfileRepository::new(state.db.pool.clone())
        .lift_ban(&target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Ban lifted",
    })))
}

/// POST /admin/change-role/:user_id - Assign one of the profile roles
pub async fn change_user_role(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<ChangeRoleRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    require_staff(&state, &headers)?;
    let target_id = parse_uuid(&user_id)?;

    let role = Role::parse(&payload.role)
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown role '{}'", payload.role)))?;

    UserRepository::new(state.db.pool.clone())
        .get_by_id(&target_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    ProfileRepository::new(state.db.pool.clone())
        .set_role(&target_id, role)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": format!("Role changed to {}", role.as_str()),
    })))
}

/// GET /official-broadcast - Past broadcasts
pub async fn list_broadcasts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<AdminBroadcast>>> {
    require_staff(&state, &headers)?;

    let broadcasts = BroadcastRepository::new(state.db.pool.clone())
        .list()
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(broadcasts))
}

/// POST /official-broadcast - Send an announcement to everyone
///
/// Saves the broadcast record, then fans it out from TalkOfficialBot as a
/// DM plus a notification to every non-bot user.
pub async fn send_broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<BroadcastRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let staff = require_staff(&state, &headers)?;

    let subject = payload.subject.trim();
    let message = payload.message.trim();
    if subject.is_empty() || message.is_empty() {
        return Err(ApiError::BadRequest(
            "Broadcast needs a subject and a message".to_string(),
        ));
    }

    let repo = BroadcastRepository::new(state.db.pool.clone());
    let broadcast = AdminBroadcast {
        id: Uuid::new_v4(),
        subject: subject.to_string(),
        message: message.to_string(),
        created_at: Utc::now(),
    };
    repo.create(&broadcast)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let official = bot::official_bot(&state.db)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let recipients = UserRepository::new(state.db.pool.clone())
        .list_non_bot_ids()
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let message_body = format!("📢 *{}*\n\n{}", broadcast.subject, broadcast.message);
    let notification_text = format!("Official News: {}", broadcast.subject);

    let sent = repo
        .fan_out(&official.id, &recipients, &message_body, &notification_text)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!(
        "Staff {} broadcast '{}' to {} users",
        staff.username,
        broadcast.subject,
        sent
    );

    Ok(Json(serde_json::json!({
        "success": true,
        "recipients": sent,
    })))
}
