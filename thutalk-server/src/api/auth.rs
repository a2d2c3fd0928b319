use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use uuid::Uuid;

use thutalk_types::{
    ChangePasswordRequest, LoginRequest, LoginResponse, Profile, RegisterRequest, Role, User,
};

use super::{get_user_from_headers, ApiError, ApiResult};
use crate::bot;
use crate::db::repositories::{ProfileRepository, UserRepository};
use crate::state::AppState;

/// POST /auth/register - Create an account
///
/// Provisions the profile alongside the user (unique talk id included) and
/// has the chat bot greet the new member, then logs them straight in.
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let username = payload.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("Username cannot be empty".to_string()));
    }
    if bot::is_bot_username(username) {
        return Err(ApiError::BadRequest("This username is reserved".to_string()));
    }
    if payload.password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    if payload.password != payload.confirm_password {
        return Err(ApiError::BadRequest("Passwords do not match".to_string()));
    }

    let users = UserRepository::new(state.db.pool.clone());
    let profiles = ProfileRepository::new(state.db.pool.clone());

    if users
        .get_by_username(username)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .is_some()
    {
        return Err(ApiError::BadRequest("Username is already taken".to_string()));
    }

    let password_hash = bcrypt::hash(&payload.password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let user = User {
        id: Uuid::new_v4(),
        username: username.to_string(),
        email: payload.email.filter(|e| !e.trim().is_empty()),
        is_staff: false,
        is_bot: false,
        created_at: Utc::now(),
    };
    users
        .create(&user, &password_hash)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let profile = Profile {
        user_id: user.id,
        username: user.username.clone(),
        talk_id: profiles
            .generate_talk_id()
            .map_err(|e| ApiError::InternalError(e.to_string()))?,
        bio: None,
        avatar: None,
        role: Role::User,
        is_verified: false,
        is_banned: false,
        ban_reason: None,
        banned_until: None,
        last_seen: None,
    };
    profiles
        .create(&profile)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    // The bot greets every new registrant
    if let Err(e) = bot::welcome_new_user(&state.db, &user.id) {
        tracing::warn!("Failed to send welcome message to {}: {}", user.username, e);
    }

    let session_token = state
        .session_manager
        .create_session(user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!("Registered new user {}", user.username);

    Ok(Json(LoginResponse {
        user,
        profile,
        session_token,
    }))
}

/// POST /auth/login - Log in with username and password
///
/// Active bans reject the login; bans whose expiry has passed are lifted
/// on the way through.
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let users = UserRepository::new(state.db.pool.clone());
    let profiles = ProfileRepository::new(state.db.pool.clone());

    let user = users
        .get_by_username(payload.username.trim())
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .filter(|u| !u.is_bot)
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;

    let stored_hash = users
        .get_password_hash(&user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;

    // verify errors on malformed hashes (e.g. the bots' unusable marker);
    // either way the credentials are wrong
    if !bcrypt::verify(&payload.password, &stored_hash).unwrap_or(false) {
        return Err(ApiError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    }

    let mut profile = profiles
        .get_by_user_id(&user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::InternalError("Profile missing for user".to_string()))?;

    if profile.is_banned {
        let expired = profile.banned_until.is_some_and(|until| until <= Utc::now());
        if expired {
            profiles
                .lift_ban(&user.id)
                .map_err(|e| ApiError::InternalError(e.to_string()))?;
            profile.is_banned = false;
            profile.ban_reason = None;
            profile.banned_until = None;
        } else {
            let reason = profile
                .ban_reason
                .clone()
                .unwrap_or_else(|| "No reason given".to_string());
            return Err(ApiError::Forbidden(format!(
                "This account is banned: {reason}"
            )));
        }
    }

    let session_token = state
        .session_manager
        .create_session(user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(LoginResponse {
        user,
        profile,
        session_token,
    }))
}

/// POST /auth/logout - Log out current user
pub async fn logout(
    State(state): State<AppState>,
    Json(session_token): Json<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .session_manager
        .delete_session(&session_token)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "message": "Logged out successfully"
    })))
}

/// GET /auth/validate - Validate session token
pub async fn validate_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<LoginResponse>> {
    let token = headers
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?
        .to_string();

    let user_id = state
        .get_authenticated_user_id_from_token(&token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid or expired session".to_string()))?;

    let user = UserRepository::new(state.db.pool.clone())
        .get_by_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
    let profile = ProfileRepository::new(state.db.pool.clone())
        .get_by_user_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    Ok(Json(LoginResponse {
        user,
        profile,
        session_token: token,
    }))
}

/// POST /settings/password - Change the account password
pub async fn change_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    if payload.new_password.len() < 8 {
        return Err(ApiError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let users = UserRepository::new(state.db.pool.clone());
    let stored_hash = users
        .get_password_hash(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !bcrypt::verify(&payload.old_password, &stored_hash).unwrap_or(false) {
        return Err(ApiError::BadRequest(
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = bcrypt::hash(&payload.new_password, bcrypt::DEFAULT_COST)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    users
        .set_password_hash(&user_id, &new_hash)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Password changed"
    })))
}

/// POST /settings/delete - Delete the account
///
/// Posts, stories, messages, notifications and relationships all go with
/// it through the cascading foreign keys.
pub async fn delete_account(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    UserRepository::new(state.db.pool.clone())
        .delete(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    tracing::info!("Deleted account {}", user_id);

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Account deleted"
    })))
}
