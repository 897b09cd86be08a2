use serde::{Deserialize, Serialize};

/// Account role. The wire names are the ones the mobile app and the admin
/// panel already send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    #[serde(rename = "admin")]
    Admin,
    #[serde(rename = "teknisi")]
    Technician,
    #[serde(rename = "appuser")]
    AppUser,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Technician => "teknisi",
            Role::AppUser => "appuser",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "admin" => Some(Role::Admin),
            "teknisi" => Some(Role::Technician),
            "appuser" => Some(Role::AppUser),
            _ => None,
        }
    }

    /// Roles allowed to sign in through the web panel.
    pub fn is_web_role(&self) -> bool {
        matches!(self, Role::Admin | Role::Technician)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub created_at: String,
}

/// A user row together with its password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct UserUpdate {
    pub email: String,
    pub display_name: String,
    pub role: Role,
    pub password_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Video {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_path: Option<String>,
    /// Only reachable through the stream endpoints.
    #[serde(skip_serializing)]
    pub video_path: String,
    pub mime_type: String,
    pub uploader: Option<i64>,
    pub duration_sec: i64,
    pub sent_date: String,
}

#[derive(Debug, Clone)]
pub struct NewVideo {
    pub title: String,
    pub description: Option<String>,
    pub thumbnail_path: Option<String>,
    pub video_path: String,
    pub mime_type: String,
    pub uploader: Option<i64>,
    pub duration_sec: i64,
}

/// Partial update; `None` leaves the column untouched.
/// `description: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct VideoUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub video_path: Option<String>,
    pub mime_type: Option<String>,
    pub thumbnail_path: Option<String>,
    pub duration_sec: Option<i64>,
    pub uploader: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: i64,
    pub video_id: i64,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub body: String,
    pub sent_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: i64,
    pub comment_id: i64,
    pub author_id: Option<i64>,
    pub author_name: Option<String>,
    pub parent_reply_id: Option<i64>,
    pub reply_to_id: Option<i64>,
    pub reply_to_name: Option<String>,
    pub body: String,
    pub sent_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookmarkEntry {
    pub bookmark_id: i64,
    pub video_id: i64,
    pub title: String,
    pub sent_date: String,
    #[serde(skip_serializing)]
    pub video_path: String,
    pub thumbnail_path: Option<String>,
    pub duration_sec: i64,
    pub uploader_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub creator_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub user_id: i64,
    pub watched_at: String,
    #[serde(flatten)]
    pub video: Video,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_users: i64,
    pub total_app_users: i64,
    pub total_technicians: i64,
    pub total_admins: i64,
    pub total_videos: i64,
}

/// Response envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn with_message(msg: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(msg.into()),
            data: Some(data),
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(msg.into()),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn message(msg: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(msg.into()),
            data: None,
        }
    }
}
