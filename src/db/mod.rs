#[cfg(test)]
pub mod memory;
mod mysql;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::auth::password;
use crate::config::BootstrapAdmin;
use crate::models::{
    BookmarkEntry, Comment, DashboardStats, HistoryEntry, NewUser, NewVideo, Reply, Role, Tag,
    User, UserCredentials, UserUpdate, Video, VideoUpdate,
};

pub use mysql::{init_db, MySqlStore};

pub type DbPool = Arc<dyn Store>;
pub type DbResult<T> = Result<T, DbError>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("{0}")]
    UniqueViolation(String),
    #[error("{0}")]
    ForeignKeyViolation(String),
    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                return DbError::UniqueViolation(db_err.message().to_string());
            }
            if db_err.is_foreign_key_violation() {
                return DbError::ForeignKeyViolation(db_err.message().to_string());
            }
        }
        DbError::Other(err.to_string())
    }
}

pub(crate) fn format_timestamp(value: NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Persistence operations used by the HTTP layer.
///
/// Lookups return `Ok(None)` for missing rows; updates and deletes return
/// whether a row was affected.
#[async_trait]
pub trait Store: Send + Sync {
    // ============ Users ============
    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<UserCredentials>>;
    async fn get_user(&self, id: i64) -> DbResult<Option<User>>;
    async fn create_user(&self, user: NewUser) -> DbResult<User>;
    async fn list_users(&self) -> DbResult<Vec<User>>;
    async fn update_user(&self, id: i64, update: UserUpdate) -> DbResult<bool>;
    async fn delete_user(&self, id: i64) -> DbResult<bool>;
    async fn dashboard_stats(&self) -> DbResult<DashboardStats>;

    // ============ Videos ============
    async fn latest_videos(&self, limit: i64) -> DbResult<Vec<Video>>;
    async fn list_videos(&self) -> DbResult<Vec<Video>>;
    async fn get_video(&self, id: i64) -> DbResult<Option<Video>>;
    async fn create_video(&self, video: NewVideo) -> DbResult<Video>;
    async fn update_video(&self, id: i64, update: VideoUpdate) -> DbResult<bool>;
    async fn delete_video(&self, id: i64) -> DbResult<bool>;

    // ============ Comments & replies ============
    async fn comments_for_video(&self, video_id: i64) -> DbResult<Vec<Comment>>;
    async fn get_comment(&self, id: i64) -> DbResult<Option<Comment>>;
    async fn create_comment(&self, video_id: i64, author_id: i64, body: &str) -> DbResult<Comment>;
    async fn update_comment(&self, id: i64, body: &str) -> DbResult<bool>;
    async fn delete_comment(&self, id: i64) -> DbResult<bool>;
    async fn replies_for_comment(&self, comment_id: i64) -> DbResult<Vec<Reply>>;
    async fn get_reply(&self, id: i64) -> DbResult<Option<Reply>>;
    async fn create_reply(
        &self,
        comment_id: i64,
        author_id: i64,
        parent_reply_id: Option<i64>,
        body: &str,
    ) -> DbResult<Reply>;
    async fn update_reply(&self, id: i64, body: &str) -> DbResult<bool>;
    async fn delete_reply(&self, id: i64) -> DbResult<bool>;

    // ============ Bookmarks ============
    async fn bookmarks_for_user(&self, user_id: i64) -> DbResult<Vec<BookmarkEntry>>;
    async fn bookmark_exists(&self, user_id: i64, video_id: i64) -> DbResult<bool>;
    async fn add_bookmark(&self, user_id: i64, video_id: i64) -> DbResult<i64>;
    async fn remove_bookmark(&self, user_id: i64, video_id: i64) -> DbResult<bool>;

    // ============ Tags ============
    async fn list_tags(&self) -> DbResult<Vec<Tag>>;
    async fn get_tag(&self, id: i64) -> DbResult<Option<Tag>>;
    async fn find_tag_by_name(&self, name: &str) -> DbResult<Option<Tag>>;
    async fn create_tag(&self, name: &str, creator_id: i64) -> DbResult<Tag>;
    async fn rename_tag(&self, id: i64, name: &str) -> DbResult<bool>;
    async fn delete_tag(&self, id: i64) -> DbResult<bool>;
    async fn tag_usage(&self, id: i64) -> DbResult<i64>;
    async fn video_has_tag(&self, video_id: i64, tag_id: i64) -> DbResult<bool>;
    async fn attach_tag(&self, video_id: i64, tag_id: i64) -> DbResult<()>;
    async fn search_videos_by_tags(&self, tags: &[String]) -> DbResult<Vec<Video>>;

    // ============ Watch history ============
    async fn record_watch(&self, user_id: i64, video_id: i64) -> DbResult<()>;
    async fn history_for_user(&self, user_id: i64) -> DbResult<Vec<HistoryEntry>>;
    async fn all_history(&self) -> DbResult<Vec<HistoryEntry>>;
    async fn clear_history(&self, user_id: i64) -> DbResult<u64>;
}

/// Creates the configured admin account if no user owns that email yet.
pub async fn ensure_bootstrap_admin(store: &dyn Store, admin: &BootstrapAdmin) -> anyhow::Result<()> {
    if store.find_user_by_email(&admin.email).await?.is_some() {
        return Ok(());
    }

    let password_hash = password::hash_password(&admin.password)?;
    let user = store
        .create_user(NewUser {
            email: admin.email.clone(),
            display_name: "Administrator".to_string(),
            password_hash,
            role: Role::Admin,
        })
        .await?;

    tracing::info!("Bootstrap admin account created (id {})", user.id);
    Ok(())
}
