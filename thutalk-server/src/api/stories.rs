use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use thutalk_types::{CreateStoryRequest, Story};

use super::{get_user_from_headers, parse_uuid, ApiError, ApiResult};
use crate::db::repositories::StoryRepository;
use crate::state::AppState;

/// POST /story/add - Post a story
pub async fn add_story(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateStoryRequest>,
) -> ApiResult<Json<Story>> {
    let user_id = get_user_from_headers(&state, &headers)?;

    if payload.image.trim().is_empty() {
        return Err(ApiError::BadRequest("A story needs an image".to_string()));
    }

    let story = Story {
        id: Uuid::new_v4(),
        user_id,
        username: String::new(),
        user_avatar: None,
        image: payload.image,
        caption: payload.caption,
        created_at: Utc::now(),
    };

    let repo = StoryRepository::new(state.db.pool.clone());
    repo.create(&story)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    let stored = repo
        .get_by_id(&story.id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .unwrap_or(story);

    Ok(Json(stored))
}

/// DELETE /delete-story/:story_id - Remove own story
pub async fn delete_story(
    State(state): State<AppState>,
    Path(story_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Json<serde_json::Value>> {
    let user_id = get_user_from_headers(&state, &headers)?;
    let story_id = parse_uuid(&story_id)?;

    let repo = StoryRepository::new(state.db.pool.clone());
    let story = repo
        .get_by_id(&story_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Story not found".to_string()))?;

    if story.user_id != user_id {
        return Err(ApiError::Forbidden(
            "Only the owner can delete this story".to_string(),
        ));
    }

    repo.delete(&story_id)
        .map_err(|e| ApiError::InternalError(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Story deleted"
    })))
}
