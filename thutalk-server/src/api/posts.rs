use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use thutalk_types::{CreatePostRequest, NotificationKind, Notification, Post, UpdatePostRequest};

use super::{get_user_from_headers, parse_uuid, ApiError, ApiResult};
use crate::db::repositories::{
    NotificationRepository, PostRepository, StoryRepository, UserRepository,
};
use crate::state::AppState;

/// How many posts the home feed returns at most
const FEED_LIMIT: i64 = 100;

/// GET /feed - Home feed: posts plus the active story rail
pub async fn get_feed(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    let posts = PostRepository::new(state.db.pool.clone())
        .get_feed(&user_id, FEED_LIMIT)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let stories = StoryRepository::new(state.db.pool.clone())
        .get_active_grouped(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "posts": posts,
        "stories": stories,
    })))
}

/// POST /post/add - Create a post
pub async fn add_post(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePostRequest>,
) -> ApiResult<Json<Post>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    if payload.content.trim().is_empty() && payload.image.is_none() {
        return Err(ApiError::BadRequest("Post cannot be empty".to_string()));
    }

    let author = UserRepository::new(state.db.pool.clone())
        .get_by_id(&user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let now = Utc::now();
    let mut post = Post {
        id: Uuid::new_v4(),
        author_id: user_id,
        author_username: author.username,
        author_avatar: None,
        content: payload.content,
        image: payload.image,
        created_at: now,
        updated_at: now,
        like_count: 0,
        liked_by_viewer: false,
        comment_count: 0,
    };

    let repo = PostRepository::new(state.db.pool.clone());
    repo.create(&post)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    // Return the stored row so avatar enrichment comes along
    if let Some(stored) = repo
        .get_by_id(&user_id, &post.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
    {
        post = stored;
    }

    Ok(Json(post))
}

/// PUT /post/edit/:id - Edit own post
pub async fn edit_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<UpdatePostRequest>,
) -> ApiResult<Json<Post>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let post_id = parse_uuid(&post_id)?;

    if payload.content.trim().is_empty() && payload.image.is_none() {
        return Err(ApiError::BadRequest("Post cannot be empty".to_string()));
    }

    let repo = PostRepository::new(state.db.pool.clone());
    let post = repo
        .get_by_id(&user_id, &post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    if post.author_id != user_id {
        return Err(ApiError::Forbidden(
            "Only the author can edit this post".to_string(),
        ));
    }

    repo.update(&post_id, &payload.content, payload.image.as_deref())
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let updated = repo
        .get_by_id(&user_id, &post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    Ok(Json(updated))
}

/// DELETE /post/delete/:id - Delete a post (author or staff)
pub async fn delete_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let post_id = parse_uuid(&post_id)?;

    let repo = PostRepository::new(state.db.pool.clone());
    let post = repo
        .get_by_id(&user_id, &post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    if post.author_id != user_id {
        let caller = UserRepository::new(state.db.pool.clone())
            .get_by_id(&user_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;
        if !caller.is_staff {
            return Err(ApiError::Forbidden(
                "Only the author can delete this post".to_string(),
            ));
        }
    }

    repo.delete(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Post deleted"
    })))
}

/// POST /like/:id - Toggle a like, notifying the author on like
pub async fn like_post(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let post_id = parse_uuid(&post_id)?;

    let repo = PostRepository::new(state.db.pool.clone());
    let post = repo
        .get_by_id(&user_id, &post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    let (liked, like_count) = repo
        .toggle_like(&post_id, &user_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    // Unlikes and self-likes stay silent
    if liked && post.author_id != user_id {
        NotificationRepository::new(state.db.pool.clone())
            .create(&Notification {
                id: Uuid::new_v4(),
                recipient_id: post.author_id,
                sender_id: user_id,
                sender_username: String::new(),
                kind: NotificationKind::Like,
                content: None,
                post_id: Some(post_id),
                is_seen: false,
                created_at: Utc::now(),
            })
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
    }

    Ok(Json(serde_json::json!({
        "liked": liked,
        "like_count": like_count,
    })))
}
