use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use super::required;
use crate::auth::{password, AdminUser};
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, DashboardStats, NewUser, Role, User, UserUpdate};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserPayload {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/dashboard", get(dashboard))
        .route("/users", get(list_users).post(create_user))
        .route(
            "/users/:id",
            get(get_user).put(update_user).delete(delete_user),
        )
        .with_state(state)
}

fn parse_role(value: Option<String>) -> AppResult<Role> {
    let value = required(value, "Missing fields")?;
    Role::parse(&value).ok_or_else(|| AppError::bad_request(format!("Unknown role: {}", value)))
}

async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let stats = state.store.dashboard_stats().await?;
    Ok(Json(ApiResponse::success(stats)))
}

async fn list_users(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> AppResult<Json<ApiResponse<Vec<User>>>> {
    let users = state.store.list_users().await?;
    Ok(Json(ApiResponse::success(users)))
}

async fn get_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(ApiResponse::success(user)))
}

async fn create_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(req): Json<UserPayload>,
) -> AppResult<impl IntoResponse> {
    let email = required(req.email, "Missing fields")?.to_lowercase();
    let display_name = required(req.display_name, "Missing fields")?;
    let role = parse_role(req.role)?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request("Missing fields"))?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::conflict("Email is already registered"));
    }

    let user = state
        .store
        .create_user(NewUser {
            email,
            display_name,
            password_hash: password::hash_password(&password)?,
            role,
        })
        .await?;

    tracing::info!("Admin {} created user {} as {}", admin.user_id, user.id, role.as_str());
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("User created successfully", user)),
    ))
}

async fn update_user(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Json(req): Json<UserPayload>,
) -> AppResult<Json<ApiResponse<User>>> {
    let email = required(req.email, "Missing fields")?.to_lowercase();
    let display_name = required(req.display_name, "Missing fields")?;
    let role = parse_role(req.role)?;

    if state.store.get_user(id).await?.is_none() {
        return Err(AppError::not_found("User not found"));
    }
    if let Some(existing) = state.store.find_user_by_email(&email).await? {
        if existing.user.id != id {
            return Err(AppError::conflict("Email is already registered"));
        }
    }

    let password_hash = match req.password.filter(|p| !p.is_empty()) {
        Some(password) => Some(password::hash_password(&password)?),
        None => None,
    };

    let updated = state
        .store
        .update_user(
            id,
            UserUpdate {
                email,
                display_name,
                role,
                password_hash,
            },
        )
        .await?;
    if !updated {
        return Err(AppError::not_found("User not found"));
    }

    let user = state
        .store
        .get_user(id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    Ok(Json(ApiResponse::with_message("User updated successfully", user)))
}

async fn delete_user(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Json<ApiResponse<()>>> {
    if admin.user_id == id {
        return Err(AppError::bad_request("You cannot delete your own account"));
    }

    if !state.store.delete_user(id).await? {
        return Err(AppError::not_found("User not found"));
    }

    tracing::info!("Admin {} ({}) deleted user {}", admin.user_id, admin.email, id);
    Ok(Json(ApiResponse::<()>::message("User deleted successfully")))
}
