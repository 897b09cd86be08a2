use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use crate::auth::{AdminUser, AuthUser};
use crate::error::AppResult;
use crate::models::{ApiResponse, HistoryEntry};
use crate::state::AppState;

#[derive(Serialize)]
pub struct ClearedHistory {
    removed: u64,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_history).delete(clear_history))
        .route("/admin/all", get(all_history))
        .with_state(state)
}

/// Watch history of the signed-in user, newest first
async fn get_history(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<Vec<HistoryEntry>>>> {
    let history = state.store.history_for_user(auth.user_id).await?;
    Ok(Json(ApiResponse::success(history)))
}

async fn all_history(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<HistoryEntry>>>> {
    let history = state.store.all_history().await?;
    Ok(Json(ApiResponse::success(history)))
}

async fn clear_history(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<ClearedHistory>>> {
    let removed = state.store.clear_history(auth.user_id).await?;
    Ok(Json(ApiResponse::with_message(
        "History cleared",
        ClearedHistory { removed },
    )))
}
