pub mod password;

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::models::{Role, User};
use crate::state::AppState;

pub const STREAM_TOKEN_TYPE: &str = "video_stream";

/// Session JWT claims
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: i64,
    pub email: String,
    pub role: Role,
    pub iat: u64,
    pub exp: u64,
}

/// Claims of a short-lived token that grants access to a single video stream.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StreamClaims {
    pub video_id: i64,
    #[serde(default)]
    pub user_id: Option<i64>,
    pub typ: String,
    pub iat: u64,
    pub exp: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

fn sign<T: Serialize>(claims: &T, secret: &str) -> AppResult<String> {
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::internal(format!("Failed to sign token: {}", e)))
}

/// Issue a session token for a signed-in user
pub fn issue_session_token(user: &User, config: &Config) -> AppResult<String> {
    let now = now_secs();
    let claims = Claims {
        sub: user.id,
        email: user.email.clone(),
        role: user.role,
        iat: now,
        exp: now.saturating_add(config.session_ttl_hours.saturating_mul(60 * 60)),
    };
    sign(&claims, &config.jwt_secret)
}

pub fn verify_session_token(
    token: &str,
    secret: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// Issue a stream token bound to `video_id`.
pub fn issue_stream_token(video_id: i64, user_id: Option<i64>, config: &Config) -> AppResult<String> {
    let now = now_secs();
    let claims = StreamClaims {
        video_id,
        user_id,
        typ: STREAM_TOKEN_TYPE.to_string(),
        iat: now,
        exp: now.saturating_add(config.stream_token_ttl_secs),
    };
    sign(&claims, &config.jwt_secret)
}

/// Validate a stream token for `video_id`.
///
/// Any failure (bad signature, expiry, wrong type, other video) is a 403.
pub fn verify_stream_token(token: &str, secret: &str, video_id: i64) -> AppResult<StreamClaims> {
    let claims = decode::<StreamClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!("Rejected stream token: {}", e);
        AppError::forbidden("Invalid or expired stream token")
    })?
    .claims;

    if claims.typ != STREAM_TOKEN_TYPE {
        return Err(AppError::forbidden("Invalid token type"));
    }
    if claims.video_id != video_id {
        return Err(AppError::forbidden("Token is not valid for this video"));
    }

    Ok(claims)
}

/// Authenticated user extractor.
/// Rejects with 401 when the bearer token is missing or invalid.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owner of a resource, or an admin.
    pub fn can_modify(&self, owner_id: Option<i64>) -> bool {
        self.is_admin() || owner_id == Some(self.user_id)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|e| {
                if e.is_missing() {
                    AppError::unauthorized("Token not found")
                } else {
                    AppError::unauthorized("Invalid token")
                }
            })?;

        let state = AppState::from_ref(state);
        let claims = verify_session_token(bearer.token(), &state.config.jwt_secret)
            .map_err(|_| AppError::unauthorized("Invalid token"))?;

        Ok(AuthUser {
            user_id: claims.sub,
            email: claims.email,
            role: claims.role,
        })
    }
}

/// Admin-only extractor: 401 without a valid token, 403 for other roles.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AppError::forbidden("Admin access only"));
        }
        Ok(AdminUser(user))
    }
}
