use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use thutalk_types::{Comment, CreateCommentRequest, Notification, NotificationKind};

use super::{get_user_from_headers, parse_uuid, ApiError, ApiResult};
use crate::db::repositories::{CommentRepository, NotificationRepository, PostRepository};
use crate::state::AppState;

/// GET /post/:post_id/comments - All comments on a post
pub async fn get_comments(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<Vec<Comment>>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let post_id = parse_uuid(&post_id)?;

    PostRepository::new(state.db.pool.clone())
        .get_by_id(&user_id, &post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    let comments = CommentRepository::new(state.db.pool.clone())
        .get_by_post(&post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(comments))
}

/// POST /add_comment/:post_id - Comment on a post, optionally replying to
/// another comment (one level only)
pub async fn add_comment(
    State(state): State<AppState>,
    Path(post_id): Path<String>,
    headers: HeaderMap,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<Json<Comment>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let post_id = parse_uuid(&post_id)?;

    if payload.content.trim().is_empty() {
        return Err(ApiError::BadRequest("Comment cannot be empty".to_string()));
    }

    let post = PostRepository::new(state.db.pool.clone())
        .get_by_id(&user_id, &post_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;

    let repo = CommentRepository::new(state.db.pool.clone());

    if let Some(parent_id) = payload.parent_id {
        let parent = repo
            .get_by_id(&parent_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound("Parent comment not found".to_string()))?;
        if parent.post_id != post_id {
            return Err(ApiError::BadRequest(
                "Parent comment belongs to another post".to_string(),
            ));
        }
        if parent.parent_id.is_some() {
            return Err(ApiError::BadRequest(
                "Replies can only go one level deep".to_string(),
            ));
        }
    }

    let comment = Comment {
        id: Uuid::new_v4(),
        post_id,
        user_id,
        username: String::new(),
        content: payload.content,
        parent_id: payload.parent_id,
        created_at: Utc::now(),
    };
    repo.create(&comment)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    if post.author_id != user_id {
        NotificationRepository::new(state.db.pool.clone())
            .create(&Notification {
                id: Uuid::new_v4(),
                recipient_id: post.author_id,
                sender_id: user_id,
                sender_username: String::new(),
                kind: NotificationKind::Comment,
                content: Some(comment.content.clone()),
                post_id: Some(post_id),
                is_seen: false,
                created_at: Utc::now(),
            })
            .map_err(|e| ApiError::InternalError(e.to_string()))?;
    }

    let stored = repo
        .get_by_id(&comment.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .unwrap_or(comment);

    Ok(Json(stored))
}

/// DELETE /comment/delete/:comment_id - Delete a comment
///
/// Allowed for the comment's author and for the post's author.
pub async fn delete_comment(
    State(state): State<AppState>,
    Path(comment_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let comment_id = parse_uuid(&comment_id)?;

    let repo = CommentRepository::new(state.db.pool.clone());
    let comment = repo
        .get_by_id(&comment_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Comment not found".to_string()))?;

    if comment.user_id != user_id {
        let post = PostRepository::new(state.db.pool.clone())
            .get_by_id(&user_id, &comment.post_id)
            .map_err(|e| ApiError::InternalError(e.to_string()))?
            .ok_or_else(|| ApiError::NotFound("Post not found".to_string()))?;
        if post.author_id != user_id {
            return Err(ApiError::Forbidden(
                "You cannot delete this comment".to_string(),
            ));
        }
    }

    repo.delete(&comment_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Comment deleted"
    })))
}
