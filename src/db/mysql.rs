use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{
    mysql::{MySqlPool, MySqlPoolOptions, MySqlRow},
    Row,
};

use super::{format_timestamp, DbError, DbResult, Store};
use crate::config::Config;
use crate::models::{
    BookmarkEntry, Comment, DashboardStats, HistoryEntry, NewUser, NewVideo, Reply, Role, Tag,
    User, UserCredentials, UserUpdate, Video, VideoUpdate,
};

const VIDEO_COLUMNS: &str = "v.id, v.title, v.description, v.thumbnail_path, v.video_path, \
     v.mime_type, v.uploader, v.duration_sec, v.sent_date";

const USER_COLUMNS: &str = "id, email, display_name, role, created_at";

const COMMENT_SELECT: &str = "SELECT c.id, c.video_id, c.author_id, u.display_name AS author_name, \
            c.body, c.sent_date
     FROM comments c
     LEFT JOIN users u ON c.author_id = u.id";

const REPLY_SELECT: &str = "SELECT r.id, r.comment_id, r.author_id, u.display_name AS author_name, \
            r.parent_reply_id, rp.author_id AS reply_to_id, upr.display_name AS reply_to_name, \
            r.body, r.sent_date
     FROM replies r
     LEFT JOIN users u ON r.author_id = u.id
     LEFT JOIN replies rp ON r.parent_reply_id = rp.id
     LEFT JOIN users upr ON rp.author_id = upr.id";

/// MySQL-backed store over a bounded connection pool.
#[derive(Clone)]
pub struct MySqlStore {
    pool: MySqlPool,
}

/// Connect to MySQL and create tables
pub async fn init_db(config: &Config) -> Result<MySqlStore> {
    let pool = MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .connect(&config.database_url)
        .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            email VARCHAR(255) NOT NULL UNIQUE,
            display_name VARCHAR(255) NOT NULL,
            password_hash VARCHAR(255) NOT NULL,
            role VARCHAR(32) NOT NULL DEFAULT 'appuser',
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    ).execute(&pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS videos (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            title VARCHAR(255) NOT NULL,
            description TEXT NULL,
            thumbnail_path VARCHAR(512) NULL,
            video_path VARCHAR(512) NOT NULL,
            mime_type VARCHAR(100) NOT NULL DEFAULT 'video/mp4',
            uploader BIGINT NULL,
            duration_sec BIGINT NOT NULL DEFAULT 0,
            sent_date DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            INDEX idx_videos_sent_date (sent_date),
            CONSTRAINT fk_videos_uploader FOREIGN KEY (uploader)
                REFERENCES users(id) ON DELETE SET NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    ).execute(&pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS comments (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            video_id BIGINT NOT NULL,
            author_id BIGINT NULL,
            body TEXT NOT NULL,
            sent_date DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            INDEX idx_comments_video (video_id, sent_date),
            CONSTRAINT fk_comments_video FOREIGN KEY (video_id)
                REFERENCES videos(id) ON DELETE CASCADE,
            CONSTRAINT fk_comments_author FOREIGN KEY (author_id)
                REFERENCES users(id) ON DELETE SET NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    ).execute(&pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS replies (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            comment_id BIGINT NOT NULL,
            author_id BIGINT NULL,
            parent_reply_id BIGINT NULL,
            body TEXT NOT NULL,
            sent_date DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            INDEX idx_replies_comment (comment_id, sent_date),
            CONSTRAINT fk_replies_comment FOREIGN KEY (comment_id)
                REFERENCES comments(id) ON DELETE CASCADE,
            CONSTRAINT fk_replies_author FOREIGN KEY (author_id)
                REFERENCES users(id) ON DELETE SET NULL,
            CONSTRAINT fk_replies_parent FOREIGN KEY (parent_reply_id)
                REFERENCES replies(id) ON DELETE SET NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    ).execute(&pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS bookmarks (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            user_id BIGINT NOT NULL,
            video_id BIGINT NOT NULL,
            created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE KEY uq_bookmarks_user_video (user_id, video_id),
            CONSTRAINT fk_bookmarks_user FOREIGN KEY (user_id)
                REFERENCES users(id) ON DELETE CASCADE,
            CONSTRAINT fk_bookmarks_video FOREIGN KEY (video_id)
                REFERENCES videos(id) ON DELETE CASCADE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    ).execute(&pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS tags (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(100) NOT NULL UNIQUE,
            creator_id BIGINT NULL,
            CONSTRAINT fk_tags_creator FOREIGN KEY (creator_id)
                REFERENCES users(id) ON DELETE SET NULL
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    ).execute(&pool).await?;

    // Tags in use cannot be dropped out from under their videos
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS video_tags (
            video_id BIGINT NOT NULL,
            tag_id BIGINT NOT NULL,
            PRIMARY KEY (video_id, tag_id),
            CONSTRAINT fk_video_tags_video FOREIGN KEY (video_id)
                REFERENCES videos(id) ON DELETE CASCADE,
            CONSTRAINT fk_video_tags_tag FOREIGN KEY (tag_id)
                REFERENCES tags(id) ON DELETE RESTRICT
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    ).execute(&pool).await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS watch_history (
            id BIGINT AUTO_INCREMENT PRIMARY KEY,
            user_id BIGINT NOT NULL,
            video_id BIGINT NOT NULL,
            watched_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            UNIQUE KEY uq_watch_history_user_video (user_id, video_id),
            INDEX idx_watch_history_user (user_id, watched_at),
            CONSTRAINT fk_watch_history_user FOREIGN KEY (user_id)
                REFERENCES users(id) ON DELETE CASCADE,
            CONSTRAINT fk_watch_history_video FOREIGN KEY (video_id)
                REFERENCES videos(id) ON DELETE CASCADE
        ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4"
    ).execute(&pool).await?;

    tracing::info!("Database initialized successfully");
    Ok(MySqlStore { pool })
}

fn timestamp(row: &MySqlRow, column: &str) -> Result<String, sqlx::Error> {
    let value: NaiveDateTime = row.try_get(column)?;
    Ok(format_timestamp(value))
}

fn user_from_row(row: &MySqlRow) -> DbResult<User> {
    let role: String = row.try_get("role")?;
    let role = Role::parse(&role)
        .ok_or_else(|| DbError::Other(format!("unknown role in users table: {}", role)))?;

    Ok(User {
        id: row.try_get("id")?,
        email: row.try_get("email")?,
        display_name: row.try_get("display_name")?,
        role,
        created_at: timestamp(row, "created_at")?,
    })
}

fn video_from_row(row: &MySqlRow) -> DbResult<Video> {
    Ok(Video {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        thumbnail_path: row.try_get("thumbnail_path")?,
        video_path: row.try_get("video_path")?,
        mime_type: row.try_get("mime_type")?,
        uploader: row.try_get("uploader")?,
        duration_sec: row.try_get("duration_sec")?,
        sent_date: timestamp(row, "sent_date")?,
    })
}

fn comment_from_row(row: &MySqlRow) -> DbResult<Comment> {
    Ok(Comment {
        id: row.try_get("id")?,
        video_id: row.try_get("video_id")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        body: row.try_get("body")?,
        sent_date: timestamp(row, "sent_date")?,
    })
}

fn reply_from_row(row: &MySqlRow) -> DbResult<Reply> {
    Ok(Reply {
        id: row.try_get("id")?,
        comment_id: row.try_get("comment_id")?,
        author_id: row.try_get("author_id")?,
        author_name: row.try_get("author_name")?,
        parent_reply_id: row.try_get("parent_reply_id")?,
        reply_to_id: row.try_get("reply_to_id")?,
        reply_to_name: row.try_get("reply_to_name")?,
        body: row.try_get("body")?,
        sent_date: timestamp(row, "sent_date")?,
    })
}

fn tag_from_row(row: &MySqlRow) -> DbResult<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        creator_id: row.try_get("creator_id")?,
    })
}

fn history_from_row(row: &MySqlRow) -> DbResult<HistoryEntry> {
    Ok(HistoryEntry {
        user_id: row.try_get("user_id")?,
        watched_at: timestamp(row, "watched_at")?,
        video: video_from_row(row)?,
    })
}

fn collect<T>(rows: Vec<MySqlRow>, f: fn(&MySqlRow) -> DbResult<T>) -> DbResult<Vec<T>> {
    rows.iter().map(f).collect()
}

fn inserted_id(result: &sqlx::mysql::MySqlQueryResult) -> i64 {
    result.last_insert_id() as i64
}

fn vanished(what: &str, id: i64) -> DbError {
    DbError::Other(format!("{} {} missing right after insert", what, id))
}

#[async_trait]
impl Store for MySqlStore {
    // ============ Users ============

    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<UserCredentials>> {
        let row = sqlx::query(
            "SELECT id, email, display_name, role, created_at, password_hash
             FROM users WHERE email = ?"
        )
        .bind(email)
        .fetch_optional(&self.pool).await?;

        match row {
            Some(row) => Ok(Some(UserCredentials {
                user: user_from_row(&row)?,
                password_hash: row.try_get("password_hash")?,
            })),
            None => Ok(None),
        }
    }

    async fn get_user(&self, id: i64) -> DbResult<Option<User>> {
        let sql = format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool).await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        let result = sqlx::query(
            "INSERT INTO users (email, display_name, password_hash, role) VALUES (?, ?, ?, ?)"
        )
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .execute(&self.pool).await?;

        let id = inserted_id(&result);
        self.get_user(id).await?.ok_or_else(|| vanished("user", id))
    }

    async fn list_users(&self) -> DbResult<Vec<User>> {
        let sql = format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        collect(rows, user_from_row)
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> DbResult<bool> {
        if self.get_user(id).await?.is_none() {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE users
             SET email = ?, display_name = ?, role = ?,
                 password_hash = COALESCE(?, password_hash)
             WHERE id = ?"
        )
        .bind(&update.email)
        .bind(&update.display_name)
        .bind(update.role.as_str())
        .bind(&update.password_hash)
        .bind(id)
        .execute(&self.pool).await?;

        // MySQL reports zero affected rows when nothing changed, so existence is checked above
        Ok(true)
    }

    async fn delete_user(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn dashboard_stats(&self) -> DbResult<DashboardStats> {
        let row = sqlx::query(
            "SELECT
                COUNT(*) AS total_users,
                CAST(COALESCE(SUM(CASE WHEN role = 'appuser' THEN 1 ELSE 0 END), 0) AS SIGNED) AS total_app_users,
                CAST(COALESCE(SUM(CASE WHEN role = 'teknisi' THEN 1 ELSE 0 END), 0) AS SIGNED) AS total_technicians,
                CAST(COALESCE(SUM(CASE WHEN role = 'admin' THEN 1 ELSE 0 END), 0) AS SIGNED) AS total_admins,
                (SELECT COUNT(*) FROM videos) AS total_videos
             FROM users"
        )
        .fetch_one(&self.pool).await?;

        Ok(DashboardStats {
            total_users: row.try_get("total_users")?,
            total_app_users: row.try_get("total_app_users")?,
            total_technicians: row.try_get("total_technicians")?,
            total_admins: row.try_get("total_admins")?,
            total_videos: row.try_get("total_videos")?,
        })
    }

    // ============ Videos ============

    async fn latest_videos(&self, limit: i64) -> DbResult<Vec<Video>> {
        let sql = format!(
            "SELECT {} FROM videos v ORDER BY v.sent_date DESC, v.id DESC LIMIT ?",
            VIDEO_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(limit).fetch_all(&self.pool).await?;
        collect(rows, video_from_row)
    }

    async fn list_videos(&self) -> DbResult<Vec<Video>> {
        let sql = format!(
            "SELECT {} FROM videos v ORDER BY v.sent_date DESC, v.id DESC",
            VIDEO_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        collect(rows, video_from_row)
    }

    async fn get_video(&self, id: i64) -> DbResult<Option<Video>> {
        let sql = format!("SELECT {} FROM videos v WHERE v.id = ?", VIDEO_COLUMNS);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(video_from_row).transpose()
    }

    async fn create_video(&self, video: NewVideo) -> DbResult<Video> {
        let result = sqlx::query(
            "INSERT INTO videos
                (title, description, thumbnail_path, video_path, mime_type, sent_date, uploader, duration_sec)
             VALUES (?, ?, ?, ?, ?, NOW(), ?, ?)"
        )
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_path)
        .bind(&video.video_path)
        .bind(&video.mime_type)
        .bind(video.uploader)
        .bind(video.duration_sec)
        .execute(&self.pool).await?;

        let id = inserted_id(&result);
        self.get_video(id).await?.ok_or_else(|| vanished("video", id))
    }

    async fn update_video(&self, id: i64, update: VideoUpdate) -> DbResult<bool> {
        if self.get_video(id).await?.is_none() {
            return Ok(false);
        }

        sqlx::query(
            "UPDATE videos SET
                title = COALESCE(?, title),
                description = IF(?, ?, description),
                video_path = COALESCE(?, video_path),
                mime_type = COALESCE(?, mime_type),
                thumbnail_path = COALESCE(?, thumbnail_path),
                duration_sec = COALESCE(?, duration_sec),
                uploader = COALESCE(?, uploader)
             WHERE id = ?"
        )
        .bind(&update.title)
        .bind(update.description.is_some())
        .bind(update.description.flatten())
        .bind(&update.video_path)
        .bind(&update.mime_type)
        .bind(&update.thumbnail_path)
        .bind(update.duration_sec)
        .bind(update.uploader)
        .bind(id)
        .execute(&self.pool).await?;

        Ok(true)
    }

    async fn delete_video(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Comments & replies ============

    async fn comments_for_video(&self, video_id: i64) -> DbResult<Vec<Comment>> {
        let sql = format!(
            "{} WHERE c.video_id = ? ORDER BY c.sent_date DESC, c.id DESC",
            COMMENT_SELECT
        );
        let rows = sqlx::query(&sql).bind(video_id).fetch_all(&self.pool).await?;
        collect(rows, comment_from_row)
    }

    async fn get_comment(&self, id: i64) -> DbResult<Option<Comment>> {
        let sql = format!("{} WHERE c.id = ?", COMMENT_SELECT);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(comment_from_row).transpose()
    }

    async fn create_comment(&self, video_id: i64, author_id: i64, body: &str) -> DbResult<Comment> {
        let result = sqlx::query(
            "INSERT INTO comments (sent_date, body, author_id, video_id) VALUES (NOW(), ?, ?, ?)"
        )
        .bind(body)
        .bind(author_id)
        .bind(video_id)
        .execute(&self.pool).await?;

        let id = inserted_id(&result);
        self.get_comment(id).await?.ok_or_else(|| vanished("comment", id))
    }

    async fn update_comment(&self, id: i64, body: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE comments SET body = ? WHERE id = ?")
            .bind(body)
            .bind(id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_comment(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn replies_for_comment(&self, comment_id: i64) -> DbResult<Vec<Reply>> {
        let sql = format!(
            "{} WHERE r.comment_id = ? ORDER BY r.sent_date ASC, r.id ASC",
            REPLY_SELECT
        );
        let rows = sqlx::query(&sql).bind(comment_id).fetch_all(&self.pool).await?;
        collect(rows, reply_from_row)
    }

    async fn get_reply(&self, id: i64) -> DbResult<Option<Reply>> {
        let sql = format!("{} WHERE r.id = ?", REPLY_SELECT);
        let row = sqlx::query(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.as_ref().map(reply_from_row).transpose()
    }

    async fn create_reply(
        &self,
        comment_id: i64,
        author_id: i64,
        parent_reply_id: Option<i64>,
        body: &str,
    ) -> DbResult<Reply> {
        let result = sqlx::query(
            "INSERT INTO replies (sent_date, body, author_id, comment_id, parent_reply_id)
             VALUES (NOW(), ?, ?, ?, ?)"
        )
        .bind(body)
        .bind(author_id)
        .bind(comment_id)
        .bind(parent_reply_id)
        .execute(&self.pool).await?;

        let id = inserted_id(&result);
        self.get_reply(id).await?.ok_or_else(|| vanished("reply", id))
    }

    async fn update_reply(&self, id: i64, body: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE replies SET body = ? WHERE id = ?")
            .bind(body)
            .bind(id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_reply(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM replies WHERE id = ?")
            .bind(id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Bookmarks ============

    async fn bookmarks_for_user(&self, user_id: i64) -> DbResult<Vec<BookmarkEntry>> {
        let rows = sqlx::query(
            "SELECT b.id AS bookmark_id, v.id AS video_id, v.title, v.sent_date, v.video_path,
                    v.thumbnail_path, v.duration_sec, u.display_name AS uploader_name
             FROM bookmarks b
             JOIN videos v ON b.video_id = v.id
             LEFT JOIN users u ON v.uploader = u.id
             WHERE b.user_id = ?
             ORDER BY b.created_at DESC, b.id DESC"
        )
        .bind(user_id)
        .fetch_all(&self.pool).await?;

        rows.iter()
            .map(|row| -> DbResult<BookmarkEntry> {
                Ok(BookmarkEntry {
                    bookmark_id: row.try_get("bookmark_id")?,
                    video_id: row.try_get("video_id")?,
                    title: row.try_get("title")?,
                    sent_date: timestamp(row, "sent_date")?,
                    video_path: row.try_get("video_path")?,
                    thumbnail_path: row.try_get("thumbnail_path")?,
                    duration_sec: row.try_get("duration_sec")?,
                    uploader_name: row.try_get("uploader_name")?,
                })
            })
            .collect()
    }

    async fn bookmark_exists(&self, user_id: i64, video_id: i64) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM bookmarks WHERE user_id = ? AND video_id = ?"
        )
        .bind(user_id)
        .bind(video_id)
        .fetch_one(&self.pool).await?;
        Ok(count > 0)
    }

    async fn add_bookmark(&self, user_id: i64, video_id: i64) -> DbResult<i64> {
        let result = sqlx::query("INSERT INTO bookmarks (user_id, video_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(video_id)
            .execute(&self.pool).await?;
        Ok(inserted_id(&result))
    }

    async fn remove_bookmark(&self, user_id: i64, video_id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM bookmarks WHERE user_id = ? AND video_id = ?")
            .bind(user_id)
            .bind(video_id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    // ============ Tags ============

    async fn list_tags(&self) -> DbResult<Vec<Tag>> {
        let rows = sqlx::query("SELECT id, name, creator_id FROM tags ORDER BY name")
            .fetch_all(&self.pool).await?;
        collect(rows, tag_from_row)
    }

    async fn get_tag(&self, id: i64) -> DbResult<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, creator_id FROM tags WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool).await?;
        row.as_ref().map(tag_from_row).transpose()
    }

    async fn find_tag_by_name(&self, name: &str) -> DbResult<Option<Tag>> {
        let row = sqlx::query("SELECT id, name, creator_id FROM tags WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool).await?;
        row.as_ref().map(tag_from_row).transpose()
    }

    async fn create_tag(&self, name: &str, creator_id: i64) -> DbResult<Tag> {
        let result = sqlx::query("INSERT INTO tags (name, creator_id) VALUES (?, ?)")
            .bind(name)
            .bind(creator_id)
            .execute(&self.pool).await?;

        let id = inserted_id(&result);
        self.get_tag(id).await?.ok_or_else(|| vanished("tag", id))
    }

    async fn rename_tag(&self, id: i64, name: &str) -> DbResult<bool> {
        if self.get_tag(id).await?.is_none() {
            return Ok(false);
        }
        sqlx::query("UPDATE tags SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id)
            .execute(&self.pool).await?;
        Ok(true)
    }

    async fn delete_tag(&self, id: i64) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn tag_usage(&self, id: i64) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM video_tags WHERE tag_id = ?")
            .bind(id)
            .fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn video_has_tag(&self, video_id: i64, tag_id: i64) -> DbResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM video_tags WHERE video_id = ? AND tag_id = ?"
        )
        .bind(video_id)
        .bind(tag_id)
        .fetch_one(&self.pool).await?;
        Ok(count > 0)
    }

    async fn attach_tag(&self, video_id: i64, tag_id: i64) -> DbResult<()> {
        sqlx::query("INSERT INTO video_tags (video_id, tag_id) VALUES (?, ?)")
            .bind(video_id)
            .bind(tag_id)
            .execute(&self.pool).await?;
        Ok(())
    }

    async fn search_videos_by_tags(&self, tags: &[String]) -> DbResult<Vec<Video>> {
        if tags.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; tags.len()].join(", ");
        let sql = format!(
            "SELECT DISTINCT {}
             FROM videos v
             JOIN video_tags vt ON vt.video_id = v.id
             JOIN tags t ON t.id = vt.tag_id
             WHERE t.name IN ({})
             ORDER BY v.sent_date DESC, v.id DESC",
            VIDEO_COLUMNS, placeholders
        );

        let mut query = sqlx::query(&sql);
        for tag in tags {
            query = query.bind(tag);
        }
        let rows = query.fetch_all(&self.pool).await?;
        collect(rows, video_from_row)
    }

    // ============ Watch history ============

    async fn record_watch(&self, user_id: i64, video_id: i64) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO watch_history (user_id, video_id, watched_at)
             VALUES (?, ?, NOW())
             ON DUPLICATE KEY UPDATE watched_at = NOW()"
        )
        .bind(user_id)
        .bind(video_id)
        .execute(&self.pool).await?;
        Ok(())
    }

    async fn history_for_user(&self, user_id: i64) -> DbResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT h.user_id, h.watched_at, {}
             FROM watch_history h
             JOIN videos v ON h.video_id = v.id
             WHERE h.user_id = ?
             ORDER BY h.watched_at DESC, h.id DESC",
            VIDEO_COLUMNS
        );
        let rows = sqlx::query(&sql).bind(user_id).fetch_all(&self.pool).await?;
        collect(rows, history_from_row)
    }

    async fn all_history(&self) -> DbResult<Vec<HistoryEntry>> {
        let sql = format!(
            "SELECT h.user_id, h.watched_at, {}
             FROM watch_history h
             JOIN videos v ON h.video_id = v.id
             ORDER BY h.watched_at DESC, h.id DESC",
            VIDEO_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        collect(rows, history_from_row)
    }

    async fn clear_history(&self, user_id: i64) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM watch_history WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
