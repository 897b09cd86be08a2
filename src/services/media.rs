//! Byte-range parsing and file streaming for video playback.

use std::io::{ErrorKind, SeekFrom};
use std::path::Path;

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;

use crate::error::{AppError, AppResult};

pub const DEFAULT_VIDEO_MIME: &str = "video/mp4";

/// Inclusive byte range within a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parse a `Range` header against a file of `size` bytes.
///
/// Returns `Ok(None)` when the whole file should be served: no header, or a
/// header this server chooses to ignore (other units, malformed bounds,
/// multi-range, reversed bounds). Unsatisfiable ranges yield a 416.
pub fn parse_range(header: Option<&str>, size: u64) -> AppResult<Option<ByteRange>> {
    let Some(value) = header else {
        return Ok(None);
    };
    let Some(range_set) = value.trim().strip_prefix("bytes=") else {
        return Ok(None);
    };
    if range_set.contains(',') {
        return Ok(None);
    }
    let Some((start_part, end_part)) = range_set.split_once('-') else {
        return Ok(None);
    };
    let (start_part, end_part) = (start_part.trim(), end_part.trim());

    if start_part.is_empty() {
        // suffix form: last n bytes
        let Ok(suffix) = end_part.parse::<u64>() else {
            return Ok(None);
        };
        if suffix == 0 || size == 0 {
            return Err(AppError::RangeNotSatisfiable(size));
        }
        return Ok(Some(ByteRange {
            start: size.saturating_sub(suffix),
            end: size - 1,
        }));
    }

    let Ok(start) = start_part.parse::<u64>() else {
        return Ok(None);
    };
    let end = if end_part.is_empty() {
        None
    } else {
        match end_part.parse::<u64>() {
            Ok(end) => Some(end),
            Err(_) => return Ok(None),
        }
    };

    if let Some(end) = end {
        if start > end {
            return Ok(None);
        }
    }
    if start >= size {
        return Err(AppError::RangeNotSatisfiable(size));
    }

    let last = size - 1;
    Ok(Some(ByteRange {
        start,
        end: end.map_or(last, |end| end.min(last)),
    }))
}

/// Pick the Content-Type for a stored video.
pub fn resolve_mime(stored: Option<&str>, path: &Path) -> String {
    if let Some(mime) = stored.map(str::trim) {
        if mime.starts_with("video/") {
            return mime.to_string();
        }
    }

    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    match ext.as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mkv") => "video/x-matroska",
        Some("mov") => "video/quicktime",
        Some("avi") => "video/x-msvideo",
        Some("flv") => "video/x-flv",
        Some("wmv") => "video/x-ms-wmv",
        _ => DEFAULT_VIDEO_MIME,
    }
    .to_string()
}

fn header_value(value: impl AsRef<str>) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value.as_ref())
        .map_err(|e| AppError::internal(format!("Invalid header value: {}", e)))
}

/// Serve `path` honoring an optional `Range` header value.
pub async fn stream_file(path: &Path, mime: &str, range_header: Option<&str>) -> AppResult<Response> {
    let mut file = File::open(path).await.map_err(|e| match e.kind() {
        ErrorKind::NotFound => AppError::not_found("Video file not found"),
        _ => {
            tracing::error!("Cannot open {}: {}", path.display(), e);
            AppError::from(e)
        }
    })?;
    let size = file.metadata().await?.len();

    let range = parse_range(range_header, size)?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, header_value(mime)?);
    headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));

    match range {
        Some(range) => {
            tracing::debug!(start = range.start, end = range.end, size, "partial content");
            file.seek(SeekFrom::Start(range.start)).await?;
            let stream = ReaderStream::new(file.take(range.len()));

            headers.insert(
                header::CONTENT_RANGE,
                header_value(format!("bytes {}-{}/{}", range.start, range.end, size))?,
            );
            headers.insert(header::CONTENT_LENGTH, header_value(range.len().to_string())?);

            Ok((StatusCode::PARTIAL_CONTENT, headers, Body::from_stream(stream)).into_response())
        }
        None => {
            headers.insert(header::CONTENT_LENGTH, header_value(size.to_string())?);
            let stream = ReaderStream::new(file);

            Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn range(start: u64, end: u64) -> Option<ByteRange> {
        Some(ByteRange { start, end })
    }

    #[test]
    fn test_parse_range_forms() {
        assert_eq!(parse_range(None, 1000).unwrap(), None);
        assert_eq!(parse_range(Some("bytes=0-499"), 1000).unwrap(), range(0, 499));
        assert_eq!(parse_range(Some("bytes=500-"), 1000).unwrap(), range(500, 999));
        assert_eq!(parse_range(Some("bytes=-100"), 1000).unwrap(), range(900, 999));
        assert_eq!(parse_range(Some("bytes=-5000"), 1000).unwrap(), range(0, 999));
    }

    #[test]
    fn test_parse_range_clamps_end() {
        assert_eq!(parse_range(Some("bytes=900-5000"), 1000).unwrap(), range(900, 999));
        assert_eq!(parse_range(Some("bytes=999-999"), 1000).unwrap(), range(999, 999));
    }

    #[test]
    fn test_parse_range_ignores_malformed() {
        for header in [
            "items=0-10",
            "bytes=abc-def",
            "bytes=0-10,20-30",
            "bytes=10",
            "bytes=50-10",
            "bytes=5-x",
        ] {
            assert_eq!(parse_range(Some(header), 1000).unwrap(), None, "{}", header);
        }
    }

    #[test]
    fn test_parse_range_unsatisfiable() {
        for (header, size) in [("bytes=1000-", 1000), ("bytes=2000-3000", 1000), ("bytes=-0", 1000), ("bytes=0-", 0), ("bytes=-10", 0)] {
            let err = parse_range(Some(header), size).unwrap_err();
            assert!(matches!(err, AppError::RangeNotSatisfiable(s) if s == size), "{}", header);
        }
    }

    #[test]
    fn test_resolve_mime() {
        assert_eq!(resolve_mime(Some("video/webm"), Path::new("a.mp4")), "video/webm");
        assert_eq!(resolve_mime(Some("application/octet-stream"), Path::new("a.MOV")), "video/quicktime");
        assert_eq!(resolve_mime(None, Path::new("clip.mkv")), "video/x-matroska");
        assert_eq!(resolve_mime(None, Path::new("clip")), DEFAULT_VIDEO_MIME);
    }

    fn sample_file() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        file.write_all(&data).unwrap();
        file
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn test_stream_partial_content() {
        let file = sample_file();
        let response = stream_file(file.path(), "video/mp4", Some("bytes=0-499")).await.unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::CONTENT_RANGE], "bytes 0-499/1000");
        assert_eq!(headers[header::CONTENT_LENGTH], "500");
        assert_eq!(headers[header::ACCEPT_RANGES], "bytes");
        assert_eq!(headers[header::CONTENT_TYPE], "video/mp4");

        let body = body_bytes(response).await;
        assert_eq!(body.len(), 500);
        assert_eq!(body[0], 0);
        assert_eq!(body[499], (499 % 251) as u8);
    }

    #[tokio::test]
    async fn test_stream_open_ended_range() {
        let file = sample_file();
        let response = stream_file(file.path(), "video/mp4", Some("bytes=990-")).await.unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 990-999/1000");
        let body = body_bytes(response).await;
        let expected: Vec<u8> = (990..1000u32).map(|i| (i % 251) as u8).collect();
        assert_eq!(body, expected);
    }

    #[tokio::test]
    async fn test_stream_full_file() {
        let file = sample_file();
        let response = stream_file(file.path(), "video/webm", None).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "1000");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        assert!(response.headers().get(header::CONTENT_RANGE).is_none());
        assert_eq!(body_bytes(response).await.len(), 1000);
    }

    #[tokio::test]
    async fn test_stream_unsatisfiable() {
        let file = sample_file();
        let err = stream_file(file.path(), "video/mp4", Some("bytes=1000-")).await.unwrap_err();
        let response = err.into_response();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */1000");
    }

    #[tokio::test]
    async fn test_stream_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = stream_file(&dir.path().join("gone.mp4"), "video/mp4", None).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stream_unopenable_file_is_internal() {
        let dir = tempfile::tempdir().unwrap();
        let clip = dir.path().join("clip.mp4");
        std::fs::write(&clip, b"data").unwrap();

        // a regular file used as a directory fails with something other than NotFound
        let err = stream_file(&clip.join("inner.mp4"), "video/mp4", None).await.unwrap_err();
        assert!(matches!(err, AppError::Internal(_)));
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
