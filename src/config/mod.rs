//! Process configuration.
//!
//! Two layers, both resolved once at startup:
//!
//! - [`ShelfConfig`] — non-secret settings from an optional TOML file, every
//!   field defaulted so a missing file or partial file still boots.
//! - [`Secrets`] — credentials from the environment. Process start fails
//!   when a required secret is absent or malformed; nothing re-reads the
//!   environment after startup.

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::directory::encryption;

/// Fallback display name for the per-user storage root folder.
pub const DEFAULT_ROOT_FOLDER_NAME: &str = "Fill Out Later";

/// Complete Shelf configuration (non-secret).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ShelfConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public base URL used to build the OAuth redirect URI
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_public_base_url() -> String {
    "http://localhost:8080".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            public_base_url: default_public_base_url(),
        }
    }
}

/// User directory store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Path to the SQLite database file
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

fn default_db_path() -> String {
    "shelf.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

/// Storage provisioning configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DriveConfig {
    /// Display name for the per-user root folder
    #[serde(default = "default_root_folder_name")]
    pub root_folder_name: String,
}

fn default_root_folder_name() -> String {
    DEFAULT_ROOT_FOLDER_NAME.to_string()
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            root_folder_name: default_root_folder_name(),
        }
    }
}

/// Session and OAuth-state configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session token lifetime (seconds)
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: i64,
    /// How long CSRF state parameters remain valid (seconds)
    #[serde(default = "default_state_expiry")]
    pub state_expiry_seconds: i64,
    /// How often expired CSRF states are swept (seconds)
    #[serde(default = "default_state_cleanup_interval")]
    pub state_cleanup_interval_seconds: u64,
}

fn default_session_ttl() -> i64 {
    24 * 60 * 60
}

fn default_state_expiry() -> i64 {
    600
}

fn default_state_cleanup_interval() -> u64 {
    60
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            state_expiry_seconds: default_state_expiry(),
            state_cleanup_interval_seconds: default_state_cleanup_interval(),
        }
    }
}

/// Upload endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Maximum multipart body size (bytes)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

fn default_body_limit() -> usize {
    25 * 1024 * 1024
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            body_limit_bytes: default_body_limit(),
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &str) -> Result<ShelfConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path))?;
    let config: ShelfConfig = toml::from_str(&contents).context("Failed to parse config file")?;
    Ok(config)
}

/// Credentials loaded from the environment, validated at process start.
#[derive(Clone)]
pub struct Secrets {
    /// OAuth client id (`SHELF_GOOGLE_CLIENT_ID`)
    pub google_client_id: String,
    /// OAuth client secret (`SHELF_GOOGLE_CLIENT_SECRET`)
    pub google_client_secret: String,
    /// Base64-encoded 32-byte master key (`SHELF_ENCRYPTION_KEY`)
    pub encryption_key: String,
    /// HS256 secret for session tokens (`SHELF_SESSION_SECRET`)
    pub session_secret: String,
}

impl Secrets {
    /// Read and validate all required secrets.
    ///
    /// Fails process start when any is absent, or when the encryption key
    /// does not decode to exactly 32 bytes.
    pub fn from_env() -> Result<Self> {
        let google_client_id = required_env("SHELF_GOOGLE_CLIENT_ID")?;
        let google_client_secret = required_env("SHELF_GOOGLE_CLIENT_SECRET")?;
        let encryption_key = required_env("SHELF_ENCRYPTION_KEY")?;
        let session_secret = required_env("SHELF_SESSION_SECRET")?;

        encryption::validate_key(&encryption_key)
            .context("SHELF_ENCRYPTION_KEY is not a valid key")?;

        Ok(Self {
            google_client_id,
            google_client_secret,
            encryption_key,
            session_secret,
        })
    }
}

fn required_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("Missing required environment variable {}", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ShelfConfig::default();
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.store.db_path, "shelf.db");
        assert_eq!(config.drive.root_folder_name, "Fill Out Later");
        assert_eq!(config.session.ttl_seconds, 86400);
        assert_eq!(config.session.state_expiry_seconds, 600);
        assert_eq!(config.upload.body_limit_bytes, 25 * 1024 * 1024);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            bind_addr = "127.0.0.1:9000"
            public_base_url = "https://shelf.example.com"

            [store]
            db_path = "/var/lib/shelf/shelf.db"

            [drive]
            root_folder_name = "My Shelf"

            [session]
            ttl_seconds = 3600
            state_expiry_seconds = 120

            [upload]
            body_limit_bytes = 1048576
        "#;

        let config: ShelfConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.bind_addr, "127.0.0.1:9000");
        assert_eq!(config.server.public_base_url, "https://shelf.example.com");
        assert_eq!(config.store.db_path, "/var/lib/shelf/shelf.db");
        assert_eq!(config.drive.root_folder_name, "My Shelf");
        assert_eq!(config.session.ttl_seconds, 3600);
        assert_eq!(config.upload.body_limit_bytes, 1048576);
    }

    #[test]
    fn test_partial_config() {
        // Missing sections use defaults
        let toml = r#"
            [drive]
            root_folder_name = "Uploads"
        "#;

        let config: ShelfConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.drive.root_folder_name, "Uploads");
        assert_eq!(config.server.bind_addr, "0.0.0.0:8080"); // Default
        assert_eq!(config.session.state_expiry_seconds, 600); // Default
    }
}
