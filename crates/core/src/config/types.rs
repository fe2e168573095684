use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    /// Origins allowed to call the HTTP API and open WS connections.
    /// Empty means same-origin only.
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    "0.0.0.0".parse().unwrap()
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("jobdesk.db")
}

/// JWT signing configuration.
///
/// Access and refresh tokens are signed with separate secrets so a leaked
/// access secret cannot mint refresh tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret_key: String,
    #[serde(default)]
    pub jwt_refresh_secret_key: String,
    /// Lifespan string like "15m" or "720h".
    #[serde(default = "default_access_lifespan")]
    pub access_token_lifespan: String,
    #[serde(default = "default_refresh_lifespan")]
    pub refresh_token_lifespan: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret_key: String::new(),
            jwt_refresh_secret_key: String::new(),
            access_token_lifespan: default_access_lifespan(),
            refresh_token_lifespan: default_refresh_lifespan(),
        }
    }
}

fn default_access_lifespan() -> String {
    "15m".to_string()
}

fn default_refresh_lifespan() -> String {
    "720h".to_string()
}

impl AuthConfig {
    /// Parsed access token lifespan, defaulting to 15 minutes on bad input.
    pub fn access_lifespan(&self) -> Duration {
        parse_lifespan(&self.access_token_lifespan).unwrap_or_else(|| {
            tracing::warn!(
                "Invalid access_token_lifespan {:?}, defaulting to 15m",
                self.access_token_lifespan
            );
            Duration::from_secs(15 * 60)
        })
    }

    /// Parsed refresh token lifespan, defaulting to 720 hours on bad input.
    pub fn refresh_lifespan(&self) -> Duration {
        parse_lifespan(&self.refresh_token_lifespan).unwrap_or_else(|| {
            tracing::warn!(
                "Invalid refresh_token_lifespan {:?}, defaulting to 720h",
                self.refresh_token_lifespan
            );
            Duration::from_secs(720 * 3600)
        })
    }
}

/// Parse a lifespan string of the form "90s", "15m" or "720h".
fn parse_lifespan(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.len() < 2 {
        return None;
    }
    let (value, unit) = s.split_at(s.len() - 1);
    let value: u64 = value.parse().ok()?;
    match unit {
        "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

/// File storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("./uploads")
}
