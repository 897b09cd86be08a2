use axum::{
    extract::{multipart::Field, Multipart, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::base_url;
use crate::auth::{issue_stream_token, verify_stream_token, AdminUser, AuthUser};
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, NewVideo, Video, VideoUpdate};
use crate::services::media::{self, resolve_mime};
use crate::services::storage::{MediaKind, Storage};
use crate::state::AppState;

const LATEST_LIMIT: i64 = 20;

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(list_videos))
        .route("/new", get(latest_videos))
        .route("/url/:id", get(stream_url))
        .route("/stream/:id", get(stream_video))
        .route("/watch/:id", get(watch_video))
        .route("/description/:id", get(video_description))
        .route("/video", post(upload_video))
        .route("/video/:id", put(update_video).delete(delete_video))
        .with_state(state)
}

#[derive(Debug, Serialize)]
pub struct VideoListItem {
    #[serde(flatten)]
    pub video: Video,
    pub thumbnail_url: Option<String>,
    pub video_url: String,
}

#[derive(Debug, Serialize)]
pub struct StreamUrlResponse {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub video_url: String,
    pub requires_auth: bool,
    pub expires_in: u64,
}

#[derive(Debug, Serialize)]
pub struct VideoDescription {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    token: Option<String>,
}

fn thumbnail_url(base: &str, video: &Video) -> Option<String> {
    video
        .thumbnail_path
        .as_ref()
        .map(|path| format!("{}/{}", base, path.trim_start_matches('/')))
}

fn list_item(base: &str, video: Video) -> VideoListItem {
    VideoListItem {
        thumbnail_url: thumbnail_url(base, &video),
        video_url: format!("{}/api/video/watch/{}", base, video.id),
        video,
    }
}

async fn find_video(state: &AppState, id: i64) -> AppResult<Video> {
    state
        .store
        .get_video(id)
        .await?
        .ok_or_else(|| AppError::not_found("Video not found"))
}

async fn latest_videos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<Vec<VideoListItem>>>> {
    let base = base_url(&headers);
    let videos = state.store.latest_videos(LATEST_LIMIT).await?;
    Ok(Json(ApiResponse::success(
        videos.into_iter().map(|v| list_item(&base, v)).collect(),
    )))
}

async fn list_videos(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<Vec<VideoListItem>>>> {
    let base = base_url(&headers);
    let videos = state.store.list_videos().await?;
    Ok(Json(ApiResponse::success(
        videos.into_iter().map(|v| list_item(&base, v)).collect(),
    )))
}

/// Hand out a pre-signed stream URL so players can fetch without headers.
async fn stream_url(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> AppResult<Json<ApiResponse<StreamUrlResponse>>> {
    let video = find_video(&state, id).await?;
    let token = issue_stream_token(video.id, Some(auth.user_id), &state.config)?;
    let base = base_url(&headers);

    Ok(Json(ApiResponse::success(StreamUrlResponse {
        id: video.id,
        thumbnail_url: thumbnail_url(&base, &video),
        video_url: format!(
            "{}/api/video/stream/{}?token={}",
            base,
            video.id,
            urlencoding::encode(&token)
        ),
        title: video.title,
        description: video.description,
        requires_auth: false,
        expires_in: state.config.stream_token_ttl_secs,
    })))
}

async fn record_watch(state: &AppState, user_id: i64, video_id: i64) {
    if let Err(e) = state.store.record_watch(user_id, video_id).await {
        tracing::warn!("Failed to record watch history for user {}: {}", user_id, e);
    }
}

async fn serve_video(state: &AppState, video: &Video, headers: &HeaderMap) -> AppResult<Response> {
    let path = state
        .storage
        .resolve(&video.video_path)
        .map_err(|_| AppError::not_found("Video file not found"))?;
    let mime = resolve_mime(Some(&video.mime_type), &path);
    let range = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    media::stream_file(&path, &mime, range).await
}

async fn stream_video(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::unauthorized("Token not found"))?;
    let claims = verify_stream_token(&token, &state.config.jwt_secret, id)?;

    let video = find_video(&state, id).await?;
    if let Some(user_id) = claims.user_id {
        record_watch(&state, user_id, video.id).await;
    }

    serve_video(&state, &video, &headers).await
}

async fn watch_video(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> AppResult<Response> {
    let video = find_video(&state, id).await?;
    record_watch(&state, auth.user_id, video.id).await;

    serve_video(&state, &video, &headers).await
}

async fn video_description(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<VideoDescription>>> {
    let video = find_video(&state, id).await?;
    Ok(Json(ApiResponse::success(VideoDescription {
        id: video.id,
        title: video.title,
        description: video.description,
    })))
}

// ============ Upload / update / delete ============

/// Multipart fields collected for an upload or an update.
#[derive(Debug, Default)]
struct VideoForm {
    title: Option<String>,
    /// `Some("")` when the field was sent empty.
    description: Option<String>,
    uploader: Option<i64>,
    duration_sec: Option<i64>,
    video: Option<(String, String)>,
    thumbnail: Option<String>,
}

impl VideoForm {
    /// Remove every file this form already wrote.
    async fn discard(&self, storage: &Storage) {
        if let Some((path, _)) = &self.video {
            storage.remove(path).await;
        }
        if let Some(path) = &self.thumbnail {
            storage.remove(path).await;
        }
    }
}

fn part_mime(field: &Field<'_>) -> Option<String> {
    field
        .content_type()
        .map(str::to_string)
        .or_else(|| {
            field
                .file_name()
                .and_then(|name| mime_guess::from_path(name).first_raw())
                .map(str::to_string)
        })
}

async fn text(field: Field<'_>) -> AppResult<String> {
    field
        .text()
        .await
        .map(|t| t.trim().to_string())
        .map_err(|e| AppError::bad_request(format!("Invalid form field: {}", e)))
}

fn parse_number(value: &str, name: &str) -> AppResult<Option<i64>> {
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .map(Some)
        .ok_or_else(|| AppError::bad_request(format!("{} must be a non-negative integer", name)))
}

/// Read every part into `form`, saving files as they arrive.
async fn read_form(storage: &Storage, multipart: &mut Multipart, form: &mut VideoForm) -> AppResult<()> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "video" => {
                let mime = part_mime(&field).unwrap_or_default();
                if !mime.starts_with("video/") {
                    return Err(AppError::bad_request("Only video files are allowed"));
                }
                if form.video.is_some() {
                    return Err(AppError::bad_request("Only one video file is allowed"));
                }
                let path = storage.save(MediaKind::Video, field).await?;
                form.video = Some((path, mime));
            }
            "thumbnail" => {
                let mime = part_mime(&field).unwrap_or_default();
                if !mime.starts_with("image/") {
                    return Err(AppError::bad_request("Only image files are allowed as thumbnail"));
                }
                if form.thumbnail.is_some() {
                    return Err(AppError::bad_request("Only one thumbnail is allowed"));
                }
                let path = storage.save(MediaKind::Thumbnail, field).await?;
                form.thumbnail = Some(path);
            }
            "title" => form.title = Some(text(field).await?),
            "description" => form.description = Some(text(field).await?),
            "uploader" => form.uploader = parse_number(&text(field).await?, "uploader")?,
            "duration_sec" => form.duration_sec = parse_number(&text(field).await?, "duration_sec")?,
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }
    Ok(())
}

async fn upload_video(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut form = VideoForm::default();

    let result = async {
        read_form(&state.storage, &mut multipart, &mut form).await?;

        let title = form
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::bad_request("Title is required"))?;
        let (video_path, mime_type) = form
            .video
            .clone()
            .ok_or_else(|| AppError::bad_request("Video file is required"))?;

        let video = state
            .store
            .create_video(NewVideo {
                title,
                description: form.description.clone().filter(|d| !d.is_empty()),
                thumbnail_path: form.thumbnail.clone(),
                video_path,
                mime_type,
                uploader: form.uploader.or(Some(admin.user_id)),
                duration_sec: form.duration_sec.unwrap_or(0),
            })
            .await?;
        Ok::<_, AppError>(video)
    }
    .await;

    match result {
        Ok(video) => {
            tracing::info!("Video {} uploaded by admin {}", video.id, admin.user_id);
            Ok((
                StatusCode::CREATED,
                Json(ApiResponse::with_message("Video uploaded", video)),
            ))
        }
        Err(err) => {
            form.discard(&state.storage).await;
            Err(err)
        }
    }
}

async fn update_video(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<Video>>> {
    let mut form = VideoForm::default();

    let result = async {
        read_form(&state.storage, &mut multipart, &mut form).await?;

        if matches!(form.title.as_deref(), Some("")) {
            return Err(AppError::bad_request("Title cannot be empty"));
        }
        let existing = find_video(&state, id).await?;

        let (video_path, mime_type) = form.video.clone().unzip();
        let updated = state
            .store
            .update_video(
                id,
                VideoUpdate {
                    title: form.title.clone(),
                    // an empty field clears the description
                    description: form
                        .description
                        .clone()
                        .map(|d| Some(d).filter(|d| !d.is_empty())),
                    video_path,
                    mime_type,
                    thumbnail_path: form.thumbnail.clone(),
                    duration_sec: form.duration_sec,
                    uploader: form.uploader,
                },
            )
            .await?;
        if !updated {
            return Err(AppError::not_found("Video not found"));
        }
        Ok(existing)
    }
    .await;

    let existing = match result {
        Ok(existing) => existing,
        Err(err) => {
            form.discard(&state.storage).await;
            return Err(err);
        }
    };

    // the row now points at the new files
    if form.video.is_some() {
        state.storage.remove(&existing.video_path).await;
    }
    if form.thumbnail.is_some() {
        if let Some(old) = &existing.thumbnail_path {
            state.storage.remove(old).await;
        }
    }

    let video = find_video(&state, id).await?;
    Ok(Json(ApiResponse::with_message("Video updated", video)))
}

async fn delete_video(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    let video = find_video(&state, id).await?;

    if !state.store.delete_video(id).await? {
        return Err(AppError::not_found("Video not found"));
    }

    state.storage.remove(&video.video_path).await;
    if let Some(thumbnail) = &video.thumbnail_path {
        state.storage.remove(thumbnail).await;
    }

    tracing::info!("Video {} deleted by admin {}", id, admin.user_id);
    Ok(Json(ApiResponse::<()>::message("Video deleted")))
}
