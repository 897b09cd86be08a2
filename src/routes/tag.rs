use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::required;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, Tag};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TagNameRequest {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AttachTagRequest {
    #[serde(default)]
    tag_id: Option<i64>,
    #[serde(default)]
    video_id: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct VideoTag {
    pub video_id: i64,
    pub tag_id: i64,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/get", get(list_tags))
        .route("/create", post(create_tag))
        .route("/video", post(attach_tag))
        .route("/update/:id", put(rename_tag))
        .route("/delete/:id", delete(delete_tag))
        .with_state(state)
}

async fn find_tag(state: &AppState, id: i64) -> AppResult<Tag> {
    state
        .store
        .get_tag(id)
        .await?
        .ok_or_else(|| AppError::not_found("Tag not found"))
}

async fn list_tags(State(state): State<AppState>) -> AppResult<Json<ApiResponse<Vec<Tag>>>> {
    let tags = state.store.list_tags().await?;
    if tags.is_empty() {
        return Err(AppError::not_found("No tags found"));
    }
    Ok(Json(ApiResponse::success(tags)))
}

async fn create_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<TagNameRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Tag>>)> {
    let name = required(req.name, "Tag name is required")?;

    if state.store.find_tag_by_name(&name).await?.is_some() {
        return Err(AppError::conflict("Tag already exists"));
    }

    let tag = state.store.create_tag(&name, auth.user_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Tag created", tag)),
    ))
}

async fn attach_tag(
    State(state): State<AppState>,
    _auth: AuthUser,
    Json(req): Json<AttachTagRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<VideoTag>>)> {
    let (Some(tag_id), Some(video_id)) = (req.tag_id, req.video_id) else {
        return Err(AppError::bad_request("tag_id and video_id are required"));
    };

    if state.store.get_video(video_id).await?.is_none() {
        return Err(AppError::not_found("Video not found"));
    }
    find_tag(&state, tag_id).await?;

    if state.store.video_has_tag(video_id, tag_id).await? {
        return Err(AppError::conflict("Tag is already attached to this video"));
    }

    state.store.attach_tag(video_id, tag_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Tag attached",
            VideoTag { video_id, tag_id },
        )),
    ))
}

async fn rename_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<TagNameRequest>,
) -> AppResult<Json<ApiResponse<Tag>>> {
    let name = required(req.name, "Tag name is required")?;
    let tag = find_tag(&state, id).await?;
    if !auth.can_modify(tag.creator_id) {
        return Err(AppError::forbidden("Only the tag creator can change it"));
    }

    if let Some(existing) = state.store.find_tag_by_name(&name).await? {
        if existing.id != id {
            return Err(AppError::conflict("Tag already exists"));
        }
    }

    if !state.store.rename_tag(id, &name).await? {
        return Err(AppError::not_found("Tag not found"));
    }
    let tag = find_tag(&state, id).await?;
    Ok(Json(ApiResponse::with_message("Tag updated", tag)))
}

async fn delete_tag(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let tag = find_tag(&state, id).await?;
    if !auth.can_modify(tag.creator_id) {
        return Err(AppError::forbidden("Only the tag creator can delete it"));
    }

    let usage = state.store.tag_usage(id).await?;
    if usage > 0 {
        return Err(AppError::bad_request(format!(
            "Tag is still used by {} video(s)",
            usage
        )));
    }

    if !state.store.delete_tag(id).await? {
        return Err(AppError::not_found("Tag not found"));
    }
    Ok(Json(ApiResponse::<()>::message("Tag deleted")))
}
