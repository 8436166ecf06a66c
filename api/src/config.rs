//! Centralized configuration management.
//!
//! All environment variables are loaded and validated at startup through
//! this module. This prevents scattered `env::var()` calls and ensures
//! early failure on missing config.

use std::path::PathBuf;
use std::sync::LazyLock;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// SQLite database URL (default: "sqlite:beatshelf.db")
    pub database_url: String,
    /// Automation-bridge base URL (required)
    pub bridge_url: String,
    /// Automation-bridge API key (optional, sent as X-Api-Key)
    pub bridge_api_key: Option<String>,
    /// Directory downloads are written to (default: "downloads")
    pub download_path: PathBuf,
    /// HTTP server port (default: 9473)
    pub port: u16,
    /// HTTP server bind address (default: "0.0.0.0")
    pub ip: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// # Panics
    /// Panics if the required BRIDGE_URL env var is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:beatshelf.db".to_string()),
            bridge_url: std::env::var("BRIDGE_URL").expect("Missing required BRIDGE_URL env var"),
            bridge_api_key: std::env::var("BRIDGE_API_KEY").ok(),
            download_path: PathBuf::from(
                std::env::var("DOWNLOAD_PATH").unwrap_or_else(|_| "downloads".to_string()),
            ),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(9473),
            ip: std::env::var("IP").unwrap_or_else(|_| "0.0.0.0".to_string()),
        }
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn bridge_url(&self) -> &str {
        &self.bridge_url
    }

    pub fn bridge_api_key(&self) -> Option<&str> {
        self.bridge_api_key.as_deref()
    }

    pub fn download_path(&self) -> &PathBuf {
        &self.download_path
    }
}

/// Global application configuration singleton.
/// Loaded once at startup from environment variables.
pub static CONFIG: LazyLock<AppConfig> = LazyLock::new(AppConfig::from_env);
