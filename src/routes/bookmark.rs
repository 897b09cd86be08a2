use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, BookmarkEntry};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct BookmarkCreated {
    pub bookmark_id: Option<i64>,
    pub video_id: i64,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/get", get(list_bookmarks))
        .route("/:id", post(add_bookmark).delete(remove_bookmark))
        .with_state(state)
}

async fn list_bookmarks(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<BookmarkEntry>>>> {
    let bookmarks = state.store.bookmarks_for_user(auth.user_id).await?;
    Ok(Json(ApiResponse::success(bookmarks)))
}

async fn add_bookmark(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(video_id): Path<i64>,
) -> AppResult<(StatusCode, Json<ApiResponse<BookmarkCreated>>)> {
    if state.store.get_video(video_id).await?.is_none() {
        return Err(AppError::not_found("Video not found"));
    }

    if state.store.bookmark_exists(auth.user_id, video_id).await? {
        return Ok((
            StatusCode::OK,
            Json(ApiResponse::with_message(
                "Already bookmarked",
                BookmarkCreated {
                    bookmark_id: None,
                    video_id,
                },
            )),
        ));
    }

    let bookmark_id = state.store.add_bookmark(auth.user_id, video_id).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(
            "Bookmark added",
            BookmarkCreated {
                bookmark_id: Some(bookmark_id),
                video_id,
            },
        )),
    ))
}

async fn remove_bookmark(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(video_id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    if !state.store.remove_bookmark(auth.user_id, video_id).await? {
        return Err(AppError::not_found("Bookmark not found"));
    }
    Ok(Json(ApiResponse::<()>::message("Bookmark removed")))
}
