use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};

const DEV_JWT_SECRET: &str = "ufix-dev-secret-change-in-production";

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub db_max_connections: u32,
    pub jwt_secret: String,
    pub session_ttl_hours: u64,
    pub stream_token_ttl_secs: u64,
    pub storage_root: PathBuf,
    pub max_upload_bytes: u64,
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub email: String,
    pub password: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = match non_empty_var("JWT_SECRET") {
            Some(secret) => secret,
            None => {
                tracing::warn!("JWT_SECRET not set, using the development secret");
                DEV_JWT_SECRET.to_string()
            }
        };

        let bootstrap_admin = match (
            non_empty_var("BOOTSTRAP_ADMIN_EMAIL"),
            non_empty_var("BOOTSTRAP_ADMIN_PASSWORD"),
        ) {
            (Some(email), Some(password)) => Some(BootstrapAdmin { email, password }),
            _ => None,
        };

        Ok(Self {
            host: non_empty_var("HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parsed_var("PORT", 3000)?,
            database_url: database_url_from_env()?,
            db_max_connections: parsed_var("DB_MAX_CONNECTIONS", 10)?,
            jwt_secret,
            session_ttl_hours: parsed_var("SESSION_TTL_HOURS", 24)?,
            stream_token_ttl_secs: parsed_var("STREAM_TOKEN_TTL_SECS", 60 * 60)?,
            storage_root: non_empty_var("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            max_upload_bytes: parsed_var("MAX_UPLOAD_BYTES", 500 * 1024 * 1024)?,
            bootstrap_admin,
        })
    }

    /// Configuration for handler tests; never touches the environment.
    #[cfg(test)]
    pub fn for_tests(storage_root: PathBuf) -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            database_url: String::new(),
            db_max_connections: 1,
            jwt_secret: "test-secret".to_string(),
            session_ttl_hours: 1,
            stream_token_ttl_secs: 60,
            storage_root,
            max_upload_bytes: 1024 * 1024,
            bootstrap_admin: None,
        }
    }
}

/// `DATABASE_URL` wins; otherwise the URL is assembled from the `DB_*` variables.
fn database_url_from_env() -> Result<String> {
    if let Some(url) = non_empty_var("DATABASE_URL") {
        return Ok(url);
    }

    let host = non_empty_var("DB_HOST").unwrap_or_else(|| "localhost".to_string());
    let port: u16 = parsed_var("DB_PORT", 3306)?;
    let user = non_empty_var("DB_USER").unwrap_or_else(|| "root".to_string());
    let password = std::env::var("DB_PASSWORD").unwrap_or_default();
    let name = non_empty_var("DB_NAME").unwrap_or_else(|| "ufix".to_string());

    Ok(build_mysql_url(&user, &password, &host, port, &name))
}

fn build_mysql_url(user: &str, password: &str, host: &str, port: u16, name: &str) -> String {
    let credentials = if password.is_empty() {
        urlencoding::encode(user).into_owned()
    } else {
        format!(
            "{}:{}",
            urlencoding::encode(user),
            urlencoding::encode(password)
        )
    };
    format!("mysql://{}@{}:{}/{}", credentials, host, port, name)
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parsed_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match non_empty_var(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
