use std::path::{Component, Path, PathBuf};

use axum::extract::multipart::Field;
use tokio::{fs, io::AsyncWriteExt};

use crate::error::{AppError, AppResult};

/// Kind of uploaded media; decides the subdirectory and the filename prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Video,
    Thumbnail,
}

impl MediaKind {
    fn prefix(&self) -> &'static str {
        match self {
            MediaKind::Video => "video",
            MediaKind::Thumbnail => "thumbnail",
        }
    }

    fn dir(&self) -> &'static str {
        match self {
            MediaKind::Video => "uploads/videos",
            MediaKind::Thumbnail => "uploads/thumbnails",
        }
    }
}

/// Local-disk media store. Paths handed out are relative to `root`.
pub struct Storage {
    root: PathBuf,
    max_upload_bytes: u64,
}

impl Storage {
    pub fn new(root: PathBuf, max_upload_bytes: u64) -> Self {
        Self {
            root,
            max_upload_bytes,
        }
    }

    /// Directory served under `/uploads/thumbnails`. Videos are never served statically.
    pub fn thumbnails_dir(&self) -> PathBuf {
        self.root.join(MediaKind::Thumbnail.dir())
    }

    pub async fn ensure_dirs(&self) -> AppResult<()> {
        for kind in [MediaKind::Video, MediaKind::Thumbnail] {
            fs::create_dir_all(self.root.join(kind.dir())).await?;
        }
        Ok(())
    }

    /// Stream a multipart field to disk and return its relative path.
    ///
    /// The partial file is removed when the field is unreadable or exceeds
    /// the upload limit.
    pub async fn save(&self, kind: MediaKind, mut field: Field<'_>) -> AppResult<String> {
        let name = file_name(kind, field.file_name(), field.content_type());
        let relative = format!("{}/{}", kind.dir(), name);
        let target = self.root.join(kind.dir()).join(&name);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = fs::File::create(&target).await?;
        let mut written: u64 = 0;

        let result: AppResult<()> = async {
            while let Some(chunk) = field
                .chunk()
                .await
                .map_err(|e| AppError::bad_request(format!("Failed to read upload: {}", e)))?
            {
                written += chunk.len() as u64;
                if written > self.max_upload_bytes {
                    return Err(AppError::PayloadTooLarge(format!(
                        "File too large (max {} bytes)",
                        self.max_upload_bytes
                    )));
                }
                file.write_all(&chunk).await?;
            }
            file.flush().await?;
            Ok(())
        }
        .await;

        drop(file);
        if let Err(err) = result {
            self.remove(&relative).await;
            return Err(err);
        }

        tracing::info!("Stored {} ({} bytes)", relative, written);
        Ok(relative)
    }

    /// Map a stored relative path to a location under the root.
    pub fn resolve(&self, relative: &str) -> AppResult<PathBuf> {
        let path = Path::new(relative);
        let safe = !relative.is_empty()
            && path
                .components()
                .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if !safe {
            return Err(AppError::bad_request("Invalid media path"));
        }
        Ok(self.root.join(path))
    }

    /// Delete a stored file. Failures are logged, never returned.
    pub async fn remove(&self, relative: &str) {
        let path = match self.resolve(relative) {
            Ok(path) => path,
            Err(_) => {
                tracing::warn!("Refusing to delete suspicious path {:?}", relative);
                return;
            }
        };

        match fs::remove_file(&path).await {
            Ok(()) => tracing::debug!("Removed {}", relative),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", relative, e),
        }
    }
}

/// `<kind>-<millis>-<uuid>.<ext>`, extension from the client name or the MIME type.
fn file_name(kind: MediaKind, original: Option<&str>, content_type: Option<&str>) -> String {
    let from_name = original
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| ext.to_ascii_lowercase());

    let ext = from_name
        .or_else(|| {
            content_type
                .and_then(mime_guess::get_mime_extensions_str)
                .and_then(|exts| exts.first())
                .map(|ext| ext.to_string())
        })
        .unwrap_or_else(|| "bin".to_string());

    format!(
        "{}-{}-{}.{}",
        kind.prefix(),
        chrono::Utc::now().timestamp_millis(),
        uuid::Uuid::new_v4(),
        ext
    )
}
