pub mod admin;
pub mod auth;
pub mod chat;
pub mod comments;
pub mod error;
pub mod friends;
pub mod notifications;
pub mod posts;
pub mod profile;
pub mod stories;

pub use error::{ApiError, ApiResult};

use axum::http::HeaderMap;
use uuid::Uuid;

use crate::db::repositories::UserRepository;
use crate::state::AppState;
use thutalk_types::User;

/// Extract the authenticated user ID from the session token header
pub fn get_user_from_headers(state: &AppState, headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = headers
        .get("X-Session-Token")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing session token".to_string()))?;

    state
        .get_authenticated_user_id_from_token(token)
        .ok_or_else(|| ApiError::Unauthorized("Invalid session token".to_string()))
}

/// Like get_user_from_headers, but requires a staff account
pub fn require_staff(state: &AppState, headers: &HeaderMap) -> Result<User, ApiError> {
    let user_id = get_user_from_headers(state, headers)?;
    let user = UserRepository::new(state.db.pool.clone())
        .get_by_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    if !user.is_staff {
        return Err(ApiError::Forbidden(
            "Staff access required".to_string(),
        ));
    }
    Ok(user)
}

/// Parse a path segment into a UUID with a uniform error
pub fn parse_uuid(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest("Invalid ID format".to_string()))
}
