use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use thutalk_types::{Post, Profile, ProfileView, RelationshipStatus, UpdateProfileRequest};

use super::{get_user_from_headers, ApiError, ApiResult};
use crate::db::repositories::{
    BlockRepository, FriendRepository, PostRepository, ProfileRepository, UserRepository,
};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: String,
}

#[derive(Deserialize)]
pub struct TalkIdQuery {
    pub talk_id: String,
}

fn relationship(
    state: &AppState,
    viewer: &uuid::Uuid,
    other: &uuid::Uuid,
) -> Result<RelationshipStatus, ApiError> {
    if viewer == other {
        return Ok(RelationshipStatus::Self_);
    }
    let friends = FriendRepository::new(state.db.pool.clone());
    if friends
        .are_friends(viewer, other)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
    {
        return Ok(RelationshipStatus::Friends);
    }
    if friends
        .get_request_between(viewer, other)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .is_some()
    {
        return Ok(RelationshipStatus::RequestSent);
    }
    if friends
        .get_request_between(other, viewer)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .is_some()
    {
        return Ok(RelationshipStatus::RequestReceived);
    }
    Ok(RelationshipStatus::None)
}

/// GET /profile/:username - View a profile with their posts
///
/// A block in either direction makes the profile a 404, same as the feed.
pub async fn profile_view(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let viewer_id = get_user_from_headers(&state, &headers)?;

    let user = UserRepository::new(state.db.pool.clone())
        .get_by_username(&username)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let blocks = BlockRepository::new(state.db.pool.clone());
    if blocks
        .is_blocked_either_way(&viewer_id, &user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
    {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let profile = ProfileRepository::new(state.db.pool.clone())
        .get_by_user_id(&user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    let friend_count = FriendRepository::new(state.db.pool.clone())
        .friend_count(&user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let posts_repo = PostRepository::new(state.db.pool.clone());
    let posts: Vec<Post> = posts_repo
        .get_by_author(&viewer_id, &user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let view = ProfileView {
        user_id: user.id,
        username: user.username,
        talk_id: profile.talk_id,
        bio: profile.bio,
        avatar: profile.avatar,
        role: profile.role,
        is_verified: profile.is_verified,
        friend_count,
        post_count: posts.len(),
        relationship: relationship(&state, &viewer_id, &user.id)?,
    };

    Ok(Json(serde_json::json!({
        "profile": view,
        "posts": posts,
    })))
}

/// PUT /settings/profile - Edit account and profile fields
///
/// Covers the whole settings form: username/email on the account, bio,
/// avatar and talk id on the profile.
pub async fn update_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateProfileRequest>,
) -> ApiResult<Json<Profile>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let repo = ProfileRepository::new(state.db.pool.clone());
    let users = UserRepository::new(state.db.pool.clone());

    if payload.username.is_some() || payload.email.is_some() {
        let current = users
            .get_by_id(&user_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

        let username = payload
            .username
            .as_deref()
            .map(str::trim)
            .unwrap_or(&current.username);
        if username.is_empty() {
            return Err(ApiError::BadRequest("Username cannot be empty".to_string()));
        }
        if crate::bot::is_bot_username(username) {
            return Err(ApiError::BadRequest("This username is reserved".to_string()));
        }
        if username != current.username
            && users
                .get_by_username(username)
                .map_err(|e| ApiError::InternalError(e.to_string()))?
                .is_some()
        {
            return Err(ApiError::BadRequest("Username is already taken".to_string()));
        }

        let email = payload
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .or(current.email.as_deref());

        users
            .update_account(&user_id, username, email)
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
    }

    if let Some(talk_id) = payload.talk_id.as_deref() {
        if !talk_id
            .strip_prefix("talk-")
            .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|c| c.is_ascii_alphanumeric()))
        {
            return Err(ApiError::BadRequest(
                "Talk ID must look like talk-XXXX".to_string(),
            ));
        }
        if repo
            .talk_id_taken(talk_id, Some(&user_id))
            .map_err(|e| ApiError::InternalError(e.to_string()))?
        {
            return Err(ApiError::BadRequest(
                "This Talk ID is already taken".to_string(),
            ));
        }
    }

    repo.update(
        &user_id,
        payload.bio.as_deref(),
        payload.avatar.as_deref(),
        payload.talk_id.as_deref(),
    )
    .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let profile = repo
        .get_by_user_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Profile not found".to_string()))?;

    Ok(Json(profile))
}

/// GET /profile/:username/friends - The user's full friends list
pub async fn all_friends(
    State(state): State<AppState>,
    Path(username): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Profile>>> {
    let viewer_id = get_user_from_headers(&state, &headers)?;

    let user = UserRepository::new(state.db.pool.clone())
        .get_by_username(&username)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let blocks = BlockRepository::new(state.db.pool.clone());
    if blocks
        .is_blocked_either_way(&viewer_id, &user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
    {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    let friend_ids = FriendRepository::new(state.db.pool.clone())
        .get_friends(&user.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let profiles = ProfileRepository::new(state.db.pool.clone());
    let mut friends = Vec::new();
    for friend_id in friend_ids {
        if let Some(profile) = profiles
            .get_by_user_id(&friend_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
        {
            friends.push(profile);
        }
    }

    Ok(Json(friends))
}

/// GET /search?q= - Search users by username
pub async fn search_users(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Profile>>> {
    let viewer_id = get_user_from_headers(&state, &headers)?;

    let term = query.q.trim();
    if term.is_empty() {
        return Ok(Json(Vec::new()));
    }

    let users = UserRepository::new(state.db.pool.clone())
        .search(&viewer_id, term)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let profiles = ProfileRepository::new(state.db.pool.clone());
    let mut results = Vec::new();
    for user in users {
        if let Some(profile) = profiles
            .get_by_user_id(&user.id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
        {
            results.push(profile);
        }
    }

    Ok(Json(results))
}

/// GET /search-by-id?talk_id= - Exact talk id lookup
pub async fn search_by_id(
    State(state): State<AppState>,
    Query(query): Query<TalkIdQuery>,
    headers: HeaderMap,
) -> ApiResult<Json<Profile>> {
    let viewer_id = get_user_from_headers(&state, &headers)?;

    let profile = ProfileRepository::new(state.db.pool.clone())
        .get_by_talk_id(query.talk_id.trim())
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("No user with that Talk ID".to_string()))?;

    let blocked = BlockRepository::new(state.db.pool.clone())
        .is_blocked_either_way(&viewer_id, &profile.user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;
    if blocked {
        return Err(ApiError::NotFound("No user with that Talk ID".to_string()));
    }

    Ok(Json(profile))
}
