pub mod admin;
pub mod auth;
pub mod bookmark;
pub mod comments;
pub mod history;
pub mod search;
pub mod tag;
pub mod video;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderMap},
    routing::get,
    Router,
};
use tower::Layer;
use tower_http::{
    cors::{Any, CorsLayer},
    normalize_path::{NormalizePath, NormalizePathLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub fn api_routes(state: AppState) -> Router {
    Router::new()
        .nest("/auth", auth::routes(state.clone()))
        .nest("/admin", admin::routes(state.clone()))
        .nest("/video", video::routes(state.clone()))
        .nest("/bookmark", bookmark::routes(state.clone()))
        .nest("/comments", comments::routes(state.clone()))
        .nest("/tag", tag::routes(state.clone()))
        .nest("/history", history::routes(state.clone()))
        .nest("/search", search::routes(state))
}

/// Full application: health checks, `/api` and static thumbnails.
///
/// Trailing slashes are trimmed before routing, so `/api/video/` hits `/api/video`.
pub fn app(state: AppState) -> NormalizePath<Router> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // video + thumbnail + form fields; the per-file limit is enforced while saving
    let body_limit = usize::try_from(state.config.max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_mul(2)
        .saturating_add(1024 * 1024);

    let router = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .nest_service(
            "/uploads/thumbnails",
            ServeDir::new(state.storage.thumbnails_dir()),
        )
        .nest("/api", api_routes(state))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    NormalizePathLayer::trim_trailing_slash().layer(router)
}

async fn health_check() -> &'static str {
    "OK"
}

/// Trimmed, non-empty text field or a 400 with `message`.
pub(crate) fn required(value: Option<String>, message: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::bad_request(message))
}

/// `scheme://host` of the incoming request, honoring `X-Forwarded-Proto`.
pub(crate) fn base_url(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}", scheme, host)
}


#[cfg(test)]
mod tests {
    use super::test_support::TestApp;
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_required() {
        assert_eq!(required(Some("  hi ".into()), "x").unwrap(), "hi");
        assert!(required(Some("   ".into()), "x").is_err());
        assert!(required(None, "x").is_err());
    }

    #[test]
    fn test_base_url() {
        let mut headers = HeaderMap::new();
        assert_eq!(base_url(&headers), "http://localhost");
        headers.insert(header::HOST, "api.ufix.test".parse().unwrap());
        headers.insert("x-forwarded-proto", "https".parse().unwrap());
        assert_eq!(base_url(&headers), "https://api.ufix.test");
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = TestApp::new().await;
        let request = axum::http::Request::get("/health")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_thumbnails_are_served_statically() {
        let app = TestApp::new().await;
        std::fs::write(app.dir.path().join("uploads/thumbnails/cover.png"), b"png").unwrap();

        let request = axum::http::Request::get("/uploads/thumbnails/cover.png")
            .body(axum::body::Body::empty())
            .unwrap();
        let response = app.send(request).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_video_files_are_not_served_statically() {
        let app = TestApp::new().await;
        let video = app.video("secret clip", 16).await;

        let (status, body) = app.json("GET", "/api/video", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["data"][0].get("video_path").is_none());

        for uri in [
            format!("/{}", video.video_path),
            "/uploads/videos".to_string(),
            "/uploads/thumbnails/../videos/secret-clip.mp4".to_string(),
        ] {
            let request = axum::http::Request::get(uri.as_str())
                .body(axum::body::Body::empty())
                .unwrap();
            let response = app.send(request).await;
            assert_ne!(response.status(), StatusCode::OK, "{} was served", uri);
        }
    }

    #[tokio::test]
    async fn test_trailing_slash_is_trimmed() {
        let app = TestApp::new().await;
        let (_, token) = app.user(crate::models::Role::AppUser, "viewer@ufix.test").await;
        app.video("Intro", 4).await;

        let (status, _) = app.json("GET", "/api/video/", None, None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = app.json("GET", "/api/history/", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.json("GET", "/api/search/?tag=x", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], serde_json::json!([]));
    }
}
