use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, Video};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    tag: Option<String>,
}

pub fn routes(state: AppState) -> Router {
    Router::new().route("/", get(search_videos)).with_state(state)
}

/// Split a `tag` query into distinct tag names.
fn tag_terms(raw: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for term in raw.split_whitespace() {
        if !terms.iter().any(|t| t == term) {
            terms.push(term.to_string());
        }
    }
    terms
}

/// Videos carrying any of the requested tags
async fn search_videos(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> AppResult<Json<ApiResponse<Vec<Video>>>> {
    let terms = tag_terms(query.tag.as_deref().unwrap_or_default());
    if terms.is_empty() {
        return Err(AppError::bad_request("Query parameter 'tag' is required"));
    }

    let videos = state.store.search_videos_by_tags(&terms).await?;
    tracing::debug!("Tag search {:?} matched {} video(s)", terms, videos.len());
    Ok(Json(ApiResponse::success(videos)))
}
