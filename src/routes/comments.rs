use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;

use super::required;
use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, Comment, Reply};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NewCommentRequest {
    #[serde(default)]
    video_id: Option<i64>,
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BodyRequest {
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewReplyRequest {
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    parent_reply_id: Option<i64>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", post(add_comment))
        .route("/video/:id", get(comments_for_video))
        .route(
            "/:id",
            get(get_comment).put(update_comment).delete(delete_comment),
        )
        .route("/:id/replies", get(list_replies).post(add_reply))
        .route("/reply/:id", put(update_reply).delete(delete_reply))
        .with_state(state)
}

async fn find_comment(state: &AppState, id: i64) -> AppResult<Comment> {
    state
        .store
        .get_comment(id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment not found"))
}

async fn find_reply(state: &AppState, id: i64) -> AppResult<Reply> {
    state
        .store
        .get_reply(id)
        .await?
        .ok_or_else(|| AppError::not_found("Reply not found"))
}

async fn comments_for_video(
    State(state): State<AppState>,
    Path(video_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<Comment>>>> {
    let comments = state.store.comments_for_video(video_id).await?;
    Ok(Json(ApiResponse::success(comments)))
}

async fn get_comment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<Comment>>> {
    Ok(Json(ApiResponse::success(find_comment(&state, id).await?)))
}

async fn add_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<NewCommentRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Comment>>)> {
    let video_id = req
        .video_id
        .ok_or_else(|| AppError::bad_request("video_id and body are required"))?;
    let body = required(req.body, "video_id and body are required")?;

    if state.store.get_video(video_id).await?.is_none() {
        return Err(AppError::not_found("Video not found"));
    }

    let comment = state
        .store
        .create_comment(video_id, auth.user_id, &body)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Comment added", comment)),
    ))
}

async fn update_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<BodyRequest>,
) -> AppResult<Json<ApiResponse<Comment>>> {
    let body = required(req.body, "body is required")?;
    let comment = find_comment(&state, id).await?;
    if !auth.can_modify(comment.author_id) {
        return Err(AppError::forbidden("You can only edit your own comments"));
    }

    if !state.store.update_comment(id, &body).await? {
        return Err(AppError::not_found("Comment not found"));
    }
    let comment = find_comment(&state, id).await?;
    Ok(Json(ApiResponse::with_message("Comment updated", comment)))
}

async fn delete_comment(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let comment = find_comment(&state, id).await?;
    if !auth.can_modify(comment.author_id) {
        return Err(AppError::forbidden("You can only delete your own comments"));
    }

    if !state.store.delete_comment(id).await? {
        return Err(AppError::not_found("Comment not found"));
    }
    Ok(Json(ApiResponse::<()>::message("Comment deleted")))
}

async fn list_replies(
    State(state): State<AppState>,
    Path(comment_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Vec<Reply>>>> {
    let replies = state.store.replies_for_comment(comment_id).await?;
    Ok(Json(ApiResponse::success(replies)))
}

async fn add_reply(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(comment_id): Path<i64>,
    Json(req): Json<NewReplyRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<Reply>>)> {
    let body = required(req.body, "body is required")?;
    find_comment(&state, comment_id).await?;

    if let Some(parent_id) = req.parent_reply_id {
        let parent = find_reply(&state, parent_id).await?;
        if parent.comment_id != comment_id {
            return Err(AppError::bad_request("Parent reply belongs to another comment"));
        }
    }

    let reply = state
        .store
        .create_reply(comment_id, auth.user_id, req.parent_reply_id, &body)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("Reply added", reply)),
    ))
}

async fn update_reply(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    Json(req): Json<BodyRequest>,
) -> AppResult<Json<ApiResponse<Reply>>> {
    let body = required(req.body, "body is required")?;
    let reply = find_reply(&state, id).await?;
    if !auth.can_modify(reply.author_id) {
        return Err(AppError::forbidden("You can only edit your own replies"));
    }

    if !state.store.update_reply(id, &body).await? {
        return Err(AppError::not_found("Reply not found"));
    }
    let reply = find_reply(&state, id).await?;
    Ok(Json(ApiResponse::with_message("Reply updated", reply)))
}

async fn delete_reply(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let reply = find_reply(&state, id).await?;
    if !auth.can_modify(reply.author_id) {
        return Err(AppError::forbidden("You can only delete your own replies"));
    }

    if !state.store.delete_reply(id).await? {
        return Err(AppError::not_found("Reply not found"));
    }
    Ok(Json(ApiResponse::<()>::message("Reply deleted")))
}
