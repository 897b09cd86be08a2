//! In-memory `Store` used by handler tests. Mirrors the MySQL schema's
//! unique keys and cascades closely enough for status-code assertions.

use std::sync::Mutex;

use async_trait::async_trait;

use super::{format_timestamp, DbError, DbResult, Store};
use crate::models::{
    BookmarkEntry, Comment, DashboardStats, HistoryEntry, NewUser, NewVideo, Reply, Role, Tag,
    User, UserCredentials, UserUpdate, Video, VideoUpdate,
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    tick: i64,
    users: Vec<UserCredentials>,
    videos: Vec<Video>,
    comments: Vec<CommentRow>,
    replies: Vec<ReplyRow>,
    bookmarks: Vec<(i64, i64, i64)>,
    tags: Vec<Tag>,
    video_tags: Vec<(i64, i64)>,
    history: Vec<(i64, i64, String)>,
}

#[derive(Clone)]
struct CommentRow {
    id: i64,
    video_id: i64,
    author_id: Option<i64>,
    body: String,
    sent_date: String,
}

#[derive(Clone)]
struct ReplyRow {
    id: i64,
    comment_id: i64,
    author_id: Option<i64>,
    parent_reply_id: Option<i64>,
    body: String,
    sent_date: String,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    /// Strictly increasing timestamps so ordering is deterministic.
    fn now(&mut self) -> String {
        self.tick += 1;
        let base = chrono::NaiveDate::from_ymd_opt(2024, 1, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap_or_default();
        format_timestamp(base + chrono::Duration::seconds(self.tick))
    }

    fn user_name(&self, id: Option<i64>) -> Option<String> {
        let id = id?;
        self.users
            .iter()
            .find(|u| u.user.id == id)
            .map(|u| u.user.display_name.clone())
    }

    fn comment(&self, row: &CommentRow) -> Comment {
        Comment {
            id: row.id,
            video_id: row.video_id,
            author_id: row.author_id,
            author_name: self.user_name(row.author_id),
            body: row.body.clone(),
            sent_date: row.sent_date.clone(),
        }
    }

    fn reply(&self, row: &ReplyRow) -> Reply {
        let reply_to_id = row
            .parent_reply_id
            .and_then(|pid| self.replies.iter().find(|r| r.id == pid))
            .and_then(|parent| parent.author_id);
        Reply {
            id: row.id,
            comment_id: row.comment_id,
            author_id: row.author_id,
            author_name: self.user_name(row.author_id),
            parent_reply_id: row.parent_reply_id,
            reply_to_id,
            reply_to_name: self.user_name(reply_to_id),
            body: row.body.clone(),
            sent_date: row.sent_date.clone(),
        }
    }

    fn history_entries(&self, user: Option<i64>) -> Vec<HistoryEntry> {
        let mut entries: Vec<HistoryEntry> = self
            .history
            .iter()
            .filter(|(uid, _, _)| user.map_or(true, |u| u == *uid))
            .filter_map(|(uid, vid, watched_at)| {
                let video = self.videos.iter().find(|v| v.id == *vid)?.clone();
                Some(HistoryEntry {
                    user_id: *uid,
                    watched_at: watched_at.clone(),
                    video,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.watched_at.cmp(&a.watched_at));
        entries
    }

    fn remove_comment_cascade(&mut self, id: i64) {
        self.comments.retain(|c| c.id != id);
        self.replies.retain(|r| r.comment_id != id);
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> DbResult<std::sync::MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| DbError::Other("memory store poisoned".into()))
    }
}

fn newest_first(videos: &mut [Video]) {
    videos.sort_by(|a, b| b.sent_date.cmp(&a.sent_date).then(b.id.cmp(&a.id)));
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_user_by_email(&self, email: &str) -> DbResult<Option<UserCredentials>> {
        let t = self.lock()?;
        Ok(t.users.iter().find(|u| u.user.email == email).cloned())
    }

    async fn get_user(&self, id: i64) -> DbResult<Option<User>> {
        let t = self.lock()?;
        Ok(t.users.iter().find(|u| u.user.id == id).map(|u| u.user.clone()))
    }

    async fn create_user(&self, user: NewUser) -> DbResult<User> {
        let mut t = self.lock()?;
        if t.users.iter().any(|u| u.user.email == user.email) {
            return Err(DbError::UniqueViolation(format!("Duplicate entry '{}'", user.email)));
        }
        let id = t.next_id();
        let created_at = t.now();
        let record = User {
            id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
            created_at,
        };
        t.users.push(UserCredentials {
            user: record.clone(),
            password_hash: user.password_hash,
        });
        Ok(record)
    }

    async fn list_users(&self) -> DbResult<Vec<User>> {
        let t = self.lock()?;
        Ok(t.users.iter().map(|u| u.user.clone()).collect())
    }

    async fn update_user(&self, id: i64, update: UserUpdate) -> DbResult<bool> {
        let mut t = self.lock()?;
        if t.users.iter().any(|u| u.user.email == update.email && u.user.id != id) {
            return Err(DbError::UniqueViolation(format!("Duplicate entry '{}'", update.email)));
        }
        let Some(record) = t.users.iter_mut().find(|u| u.user.id == id) else {
            return Ok(false);
        };
        record.user.email = update.email;
        record.user.display_name = update.display_name;
        record.user.role = update.role;
        if let Some(hash) = update.password_hash {
            record.password_hash = hash;
        }
        Ok(true)
    }

    async fn delete_user(&self, id: i64) -> DbResult<bool> {
        let mut t = self.lock()?;
        let before = t.users.len();
        t.users.retain(|u| u.user.id != id);
        if t.users.len() == before {
            return Ok(false);
        }
        for video in t.videos.iter_mut().filter(|v| v.uploader == Some(id)) {
            video.uploader = None;
        }
        for comment in t.comments.iter_mut().filter(|c| c.author_id == Some(id)) {
            comment.author_id = None;
        }
        for reply in t.replies.iter_mut().filter(|r| r.author_id == Some(id)) {
            reply.author_id = None;
        }
        for tag in t.tags.iter_mut().filter(|tag| tag.creator_id == Some(id)) {
            tag.creator_id = None;
        }
        t.bookmarks.retain(|(_, uid, _)| *uid != id);
        t.history.retain(|(uid, _, _)| *uid != id);
        Ok(true)
    }

    async fn dashboard_stats(&self) -> DbResult<DashboardStats> {
        let t = self.lock()?;
        let count = |role: Role| t.users.iter().filter(|u| u.user.role == role).count() as i64;
        Ok(DashboardStats {
            total_users: t.users.len() as i64,
            total_app_users: count(Role::AppUser),
            total_technicians: count(Role::Technician),
            total_admins: count(Role::Admin),
            total_videos: t.videos.len() as i64,
        })
    }

    async fn latest_videos(&self, limit: i64) -> DbResult<Vec<Video>> {
        let mut videos = self.list_videos().await?;
        videos.truncate(limit.max(0) as usize);
        Ok(videos)
    }

    async fn list_videos(&self) -> DbResult<Vec<Video>> {
        let t = self.lock()?;
        let mut videos = t.videos.clone();
        newest_first(&mut videos);
        Ok(videos)
    }

    async fn get_video(&self, id: i64) -> DbResult<Option<Video>> {
        let t = self.lock()?;
        Ok(t.videos.iter().find(|v| v.id == id).cloned())
    }

    async fn create_video(&self, video: NewVideo) -> DbResult<Video> {
        let mut t = self.lock()?;
        let id = t.next_id();
        let sent_date = t.now();
        let record = Video {
            id,
            title: video.title,
            description: video.description,
            thumbnail_path: video.thumbnail_path,
            video_path: video.video_path,
            mime_type: video.mime_type,
            uploader: video.uploader,
            duration_sec: video.duration_sec,
            sent_date,
        };
        t.videos.push(record.clone());
        Ok(record)
    }

    async fn update_video(&self, id: i64, update: VideoUpdate) -> DbResult<bool> {
        let mut t = self.lock()?;
        let Some(video) = t.videos.iter_mut().find(|v| v.id == id) else {
            return Ok(false);
        };
        if let Some(title) = update.title {
            video.title = title;
        }
        if let Some(description) = update.description {
            video.description = description;
        }
        if let Some(path) = update.video_path {
            video.video_path = path;
        }
        if let Some(mime) = update.mime_type {
            video.mime_type = mime;
        }
        if update.thumbnail_path.is_some() {
            video.thumbnail_path = update.thumbnail_path;
        }
        if let Some(duration) = update.duration_sec {
            video.duration_sec = duration;
        }
        if update.uploader.is_some() {
            video.uploader = update.uploader;
        }
        Ok(true)
    }

    async fn delete_video(&self, id: i64) -> DbResult<bool> {
        let mut t = self.lock()?;
        let before = t.videos.len();
        t.videos.retain(|v| v.id != id);
        if t.videos.len() == before {
            return Ok(false);
        }
        let comment_ids: Vec<i64> = t
            .comments
            .iter()
            .filter(|c| c.video_id == id)
            .map(|c| c.id)
            .collect();
        for comment_id in comment_ids {
            t.remove_comment_cascade(comment_id);
        }
        t.bookmarks.retain(|(_, _, vid)| *vid != id);
        t.video_tags.retain(|(vid, _)| *vid != id);
        t.history.retain(|(_, vid, _)| *vid != id);
        Ok(true)
    }

    async fn comments_for_video(&self, video_id: i64) -> DbResult<Vec<Comment>> {
        let t = self.lock()?;
        let mut comments: Vec<Comment> = t
            .comments
            .iter()
            .filter(|c| c.video_id == video_id)
            .map(|c| t.comment(c))
            .collect();
        comments.sort_by(|a, b| b.sent_date.cmp(&a.sent_date).then(b.id.cmp(&a.id)));
        Ok(comments)
    }

    async fn get_comment(&self, id: i64) -> DbResult<Option<Comment>> {
        let t = self.lock()?;
        Ok(t.comments.iter().find(|c| c.id == id).map(|c| t.comment(c)))
    }

    async fn create_comment(&self, video_id: i64, author_id: i64, body: &str) -> DbResult<Comment> {
        let mut t = self.lock()?;
        if !t.videos.iter().any(|v| v.id == video_id) {
            return Err(DbError::ForeignKeyViolation("video does not exist".into()));
        }
        let row = CommentRow {
            id: t.next_id(),
            video_id,
            author_id: Some(author_id),
            body: body.to_string(),
            sent_date: t.now(),
        };
        t.comments.push(row.clone());
        Ok(t.comment(&row))
    }

    async fn update_comment(&self, id: i64, body: &str) -> DbResult<bool> {
        let mut t = self.lock()?;
        match t.comments.iter_mut().find(|c| c.id == id) {
            Some(comment) => {
                comment.body = body.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_comment(&self, id: i64) -> DbResult<bool> {
        let mut t = self.lock()?;
        if !t.comments.iter().any(|c| c.id == id) {
            return Ok(false);
        }
        t.remove_comment_cascade(id);
        Ok(true)
    }

    async fn replies_for_comment(&self, comment_id: i64) -> DbResult<Vec<Reply>> {
        let t = self.lock()?;
        let mut replies: Vec<Reply> = t
            .replies
            .iter()
            .filter(|r| r.comment_id == comment_id)
            .map(|r| t.reply(r))
            .collect();
        replies.sort_by(|a, b| a.sent_date.cmp(&b.sent_date).then(a.id.cmp(&b.id)));
        Ok(replies)
    }

    async fn get_reply(&self, id: i64) -> DbResult<Option<Reply>> {
        let t = self.lock()?;
        Ok(t.replies.iter().find(|r| r.id == id).map(|r| t.reply(r)))
    }

    async fn create_reply(
        &self,
        comment_id: i64,
        author_id: i64,
        parent_reply_id: Option<i64>,
        body: &str,
    ) -> DbResult<Reply> {
        let mut t = self.lock()?;
        let row = ReplyRow {
            id: t.next_id(),
            comment_id,
            author_id: Some(author_id),
            parent_reply_id,
            body: body.to_string(),
            sent_date: t.now(),
        };
        t.replies.push(row.clone());
        Ok(t.reply(&row))
    }

    async fn update_reply(&self, id: i64, body: &str) -> DbResult<bool> {
        let mut t = self.lock()?;
        match t.replies.iter_mut().find(|r| r.id == id) {
            Some(reply) => {
                reply.body = body.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_reply(&self, id: i64) -> DbResult<bool> {
        let mut t = self.lock()?;
        let before = t.replies.len();
        t.replies.retain(|r| r.id != id);
        for reply in t.replies.iter_mut().filter(|r| r.parent_reply_id == Some(id)) {
            reply.parent_reply_id = None;
        }
        Ok(t.replies.len() < before)
    }

    async fn bookmarks_for_user(&self, user_id: i64) -> DbResult<Vec<BookmarkEntry>> {
        let t = self.lock()?;
        Ok(t.bookmarks
            .iter()
            .rev()
            .filter(|(_, uid, _)| *uid == user_id)
            .filter_map(|(bid, _, vid)| {
                let video = t.videos.iter().find(|v| v.id == *vid)?;
                Some(BookmarkEntry {
                    bookmark_id: *bid,
                    video_id: video.id,
                    title: video.title.clone(),
                    sent_date: video.sent_date.clone(),
                    video_path: video.video_path.clone(),
                    thumbnail_path: video.thumbnail_path.clone(),
                    duration_sec: video.duration_sec,
                    uploader_name: t.user_name(video.uploader),
                })
            })
            .collect())
    }

    async fn bookmark_exists(&self, user_id: i64, video_id: i64) -> DbResult<bool> {
        let t = self.lock()?;
        Ok(t.bookmarks
            .iter()
            .any(|(_, uid, vid)| *uid == user_id && *vid == video_id))
    }

    async fn add_bookmark(&self, user_id: i64, video_id: i64) -> DbResult<i64> {
        let mut t = self.lock()?;
        if t.bookmarks
            .iter()
            .any(|(_, uid, vid)| *uid == user_id && *vid == video_id)
        {
            return Err(DbError::UniqueViolation("bookmark already exists".into()));
        }
        let id = t.next_id();
        t.bookmarks.push((id, user_id, video_id));
        Ok(id)
    }

    async fn remove_bookmark(&self, user_id: i64, video_id: i64) -> DbResult<bool> {
        let mut t = self.lock()?;
        let before = t.bookmarks.len();
        t.bookmarks
            .retain(|(_, uid, vid)| !(*uid == user_id && *vid == video_id));
        Ok(t.bookmarks.len() < before)
    }

    async fn list_tags(&self) -> DbResult<Vec<Tag>> {
        let t = self.lock()?;
        let mut tags = t.tags.clone();
        tags.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tags)
    }

    async fn get_tag(&self, id: i64) -> DbResult<Option<Tag>> {
        let t = self.lock()?;
        Ok(t.tags.iter().find(|tag| tag.id == id).cloned())
    }

    async fn find_tag_by_name(&self, name: &str) -> DbResult<Option<Tag>> {
        let t = self.lock()?;
        Ok(t.tags.iter().find(|tag| tag.name == name).cloned())
    }

    async fn create_tag(&self, name: &str, creator_id: i64) -> DbResult<Tag> {
        let mut t = self.lock()?;
        if t.tags.iter().any(|tag| tag.name == name) {
            return Err(DbError::UniqueViolation(format!("Duplicate entry '{}'", name)));
        }
        let tag = Tag {
            id: t.next_id(),
            name: name.to_string(),
            creator_id: Some(creator_id),
        };
        t.tags.push(tag.clone());
        Ok(tag)
    }

    async fn rename_tag(&self, id: i64, name: &str) -> DbResult<bool> {
        let mut t = self.lock()?;
        if t.tags.iter().any(|tag| tag.name == name && tag.id != id) {
            return Err(DbError::UniqueViolation(format!("Duplicate entry '{}'", name)));
        }
        match t.tags.iter_mut().find(|tag| tag.id == id) {
            Some(tag) => {
                tag.name = name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_tag(&self, id: i64) -> DbResult<bool> {
        let mut t = self.lock()?;
        if t.video_tags.iter().any(|(_, tid)| *tid == id) {
            return Err(DbError::ForeignKeyViolation("tag is referenced by videos".into()));
        }
        let before = t.tags.len();
        t.tags.retain(|tag| tag.id != id);
        Ok(t.tags.len() < before)
    }

    async fn tag_usage(&self, id: i64) -> DbResult<i64> {
        let t = self.lock()?;
        Ok(t.video_tags.iter().filter(|(_, tid)| *tid == id).count() as i64)
    }

    async fn video_has_tag(&self, video_id: i64, tag_id: i64) -> DbResult<bool> {
        let t = self.lock()?;
        Ok(t.video_tags.contains(&(video_id, tag_id)))
    }

    async fn attach_tag(&self, video_id: i64, tag_id: i64) -> DbResult<()> {
        let mut t = self.lock()?;
        if t.video_tags.contains(&(video_id, tag_id)) {
            return Err(DbError::UniqueViolation("tag already attached".into()));
        }
        t.video_tags.push((video_id, tag_id));
        Ok(())
    }

    async fn search_videos_by_tags(&self, tags: &[String]) -> DbResult<Vec<Video>> {
        let t = self.lock()?;
        let tag_ids: Vec<i64> = t
            .tags
            .iter()
            .filter(|tag| tags.contains(&tag.name))
            .map(|tag| tag.id)
            .collect();
        let mut videos: Vec<Video> = t
            .videos
            .iter()
            .filter(|v| {
                t.video_tags
                    .iter()
                    .any(|(vid, tid)| *vid == v.id && tag_ids.contains(tid))
            })
            .cloned()
            .collect();
        newest_first(&mut videos);
        Ok(videos)
    }

    async fn record_watch(&self, user_id: i64, video_id: i64) -> DbResult<()> {
        let mut t = self.lock()?;
        let now = t.now();
        match t
            .history
            .iter()
            .position(|(uid, vid, _)| *uid == user_id && *vid == video_id)
        {
            Some(pos) => t.history[pos].2 = now,
            None => t.history.push((user_id, video_id, now)),
        }
        Ok(())
    }

    async fn history_for_user(&self, user_id: i64) -> DbResult<Vec<HistoryEntry>> {
        let t = self.lock()?;
        Ok(t.history_entries(Some(user_id)))
    }

    async fn all_history(&self) -> DbResult<Vec<HistoryEntry>> {
        let t = self.lock()?;
        Ok(t.history_entries(None))
    }

    async fn clear_history(&self, user_id: i64) -> DbResult<u64> {
        let mut t = self.lock()?;
        let before = t.history.len();
        t.history.retain(|(uid, _, _)| *uid != user_id);
        Ok((before - t.history.len()) as u64)
    }
}
