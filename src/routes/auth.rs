use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::required;
use crate::auth::{issue_session_token, password, AuthUser};
use crate::error::{AppError, AppResult};
use crate::models::{ApiResponse, NewUser, Role, User};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: User,
}

/// Which client is signing in; each accepts a fixed set of roles.
#[derive(Debug, Clone, Copy)]
enum LoginSurface {
    Mobile,
    Web,
}

impl LoginSurface {
    fn allows(&self, role: Role) -> bool {
        match self {
            LoginSurface::Mobile => role == Role::AppUser,
            LoginSurface::Web => role.is_web_role(),
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login-mobile", post(login_mobile))
        .route("/login-web", post(login_web))
        .route("/profile", get(profile))
        .with_state(state)
}

async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> AppResult<impl IntoResponse> {
    const MISSING: &str = "Email, display name and password are required";
    let email = required(req.email, MISSING)?.to_lowercase();
    let display_name = required(req.display_name, MISSING)?;
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request(MISSING))?;

    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(AppError::conflict("Email is already registered"));
    }

    let password_hash = password::hash_password(&password)?;
    let user = state
        .store
        .create_user(NewUser {
            email,
            display_name,
            password_hash,
            role: Role::AppUser,
        })
        .await?;

    tracing::info!("New user registered (id {})", user.id);
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message("User registered", user)),
    ))
}

async fn login_mobile(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    login(&state, req, LoginSurface::Mobile).await
}

async fn login_web(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    login(&state, req, LoginSurface::Web).await
}

async fn login(
    state: &AppState,
    req: LoginRequest,
    surface: LoginSurface,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    const MISSING: &str = "Email and password are required";
    let email = required(req.email, MISSING)?.to_lowercase();
    let password = req
        .password
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::bad_request(MISSING))?;

    let credentials = state
        .store
        .find_user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::unauthorized("Wrong email or password"))?;

    // legacy rows carry hashes argon2 cannot read; those accounts need a reset
    let verified = password::verify_password(&password, &credentials.password_hash)
        .unwrap_or_else(|e| {
            tracing::warn!("Unusable password hash for user {}: {}", credentials.user.id, e);
            false
        });
    if !verified {
        return Err(AppError::unauthorized("Wrong email or password"));
    }

    let user = credentials.user;
    if !surface.allows(user.role) {
        tracing::warn!("User {} ({}) refused on {:?} login", user.id, user.role.as_str(), surface);
        return Err(AppError::forbidden("This account cannot sign in here"));
    }

    let token = issue_session_token(&user, &state.config)?;
    Ok(Json(ApiResponse::with_message(
        "Login successful",
        AuthResponse { token, user },
    )))
}

async fn profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<ApiResponse<User>>> {
    let user = state
        .store
        .get_user(auth.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(Json(ApiResponse::success(user)))
}
