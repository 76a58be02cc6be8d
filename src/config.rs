use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::backend::{ChatSelector, OptimizePolicy};

/// Application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub optimize: OptimizeConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Client addresses allowed to connect; empty allows everyone
    #[serde(default)]
    pub ip_whitelist: Vec<String>,
    /// Let anyone reach `POST /api/users`; otherwise registering needs an existing principal
    #[serde(default)]
    pub open_registration: bool,
    /// Principal created at startup when missing, so a closed server has someone to log in as
    #[serde(default)]
    pub initial_user: Option<String>,
    #[serde(default)]
    pub initial_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Staging files for uploads
    #[serde(default = "default_temp_path")]
    pub temp_path: String,
    /// Root of the local backend store
    #[serde(default = "default_files_path")]
    pub files_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Chat used by principals that do not name their own
    #[serde(default = "default_chat_name")]
    pub chat_name: String,
    #[serde(default = "default_chat_id")]
    pub chat_id: i64,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OptimizeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_max_total_size")]
    pub max_total_size: u64,
    #[serde(default = "default_max_files_count")]
    pub max_files_count: usize,
    #[serde(default = "default_unaccessed")]
    pub unaccessed_secs: u64,
    #[serde(default = "default_immunity")]
    pub immunity_secs: u64,
    #[serde(default = "default_optimize_interval")]
    pub interval_secs: u64,
}

// Default values
fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2122
}

fn default_db_path() -> String {
    "data/chatdrive.db".to_string()
}

fn default_temp_path() -> String {
    "data/tmp".to_string()
}

fn default_files_path() -> String {
    "data/remote".to_string()
}

fn default_chat_name() -> String {
    "chatdrive".to_string()
}

fn default_chat_id() -> i64 {
    1
}

fn default_event_buffer() -> usize {
    64
}

fn default_chunk_size() -> usize {
    64 * 1024
}

fn default_ready_timeout() -> u64 {
    30
}

fn default_max_total_size() -> u64 {
    4 * 1024 * 1024 * 1024 // 4 GiB
}

fn default_max_files_count() -> usize {
    512
}

fn default_unaccessed() -> u64 {
    4 * 60 * 60
}

fn default_immunity() -> u64 {
    15 * 60
}

fn default_optimize_interval() -> u64 {
    30 * 60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            ip_whitelist: Vec::new(),
            open_registration: false,
            initial_user: None,
            initial_password: None,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_path: default_temp_path(),
            files_path: default_files_path(),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            chat_name: default_chat_name(),
            chat_id: default_chat_id(),
            event_buffer: default_event_buffer(),
            chunk_size: default_chunk_size(),
            ready_timeout_secs: default_ready_timeout(),
        }
    }
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_total_size: default_max_total_size(),
            max_files_count: default_max_files_count(),
            unaccessed_secs: default_unaccessed(),
            immunity_secs: default_immunity(),
            interval_secs: default_optimize_interval(),
        }
    }
}

impl BackendConfig {
    /// Selector for principals without a chat of their own
    pub fn default_chat(&self) -> ChatSelector {
        ChatSelector {
            name: Some(self.chat_name.clone()).filter(|n| !n.is_empty()),
            id: Some(self.chat_id),
        }
    }
}

impl OptimizeConfig {
    pub fn policy(&self) -> OptimizePolicy {
        OptimizePolicy {
            max_total_size: self.max_total_size,
            max_files_count: self.max_files_count,
            unaccessed: Duration::from_secs(self.unaccessed_secs),
            immunity: Duration::from_secs(self.immunity_secs),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.ensure_directories()?;
        tracing::info!(
            "Backend config: chat_name={}, chat_id={}, files_path={}",
            config.backend.chat_name,
            config.backend.chat_id,
            config.storage.files_path
        );
        Ok(config)
    }

    /// Load configuration from conf.ini or config.toml
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["conf.ini", "config.toml", "data/conf.ini", "data/config.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    /// Apply environment variable overrides
    /// Format: CD_CONF_<SECTION>_<KEY>
    fn apply_env_overrides(&mut self) {
        // Server overrides
        if let Ok(val) = env::var("CD_CONF_SERVER_HOST") {
            self.server.host = val;
        }
        if let Ok(val) = env::var("CD_CONF_SERVER_PORT") {
            if let Ok(port) = val.parse() {
                self.server.port = port;
            }
        }
        if let Ok(val) = env::var("CD_CONF_SERVER_IP_WHITELIST") {
            self.server.ip_whitelist = val
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| s.to_string())
                .collect();
        }

        if let Ok(val) = env::var("CD_CONF_SERVER_OPEN_REGISTRATION") {
            if let Ok(v) = val.parse() {
                self.server.open_registration = v;
            }
        }
        if let Ok(val) = env::var("CD_CONF_SERVER_INITIAL_USER") {
            self.server.initial_user = Some(val);
        }
        if let Ok(val) = env::var("CD_CONF_SERVER_INITIAL_PASSWORD") {
            self.server.initial_password = Some(val);
        }

        // Database overrides
        if let Ok(val) = env::var("CD_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Storage overrides
        if let Ok(val) = env::var("CD_CONF_STORAGE_TEMP_PATH") {
            self.storage.temp_path = val;
        }
        if let Ok(val) = env::var("CD_CONF_STORAGE_FILES_PATH") {
            self.storage.files_path = val;
        }

        // Backend overrides
        if let Ok(val) = env::var("CD_CONF_BACKEND_CHAT_NAME") {
            self.backend.chat_name = val;
        }
        if let Ok(val) = env::var("CD_CONF_BACKEND_CHAT_ID") {
            if let Ok(id) = val.parse() {
                self.backend.chat_id = id;
            }
        }

        // Optimizer overrides
        if let Ok(val) = env::var("CD_CONF_OPTIMIZE_ENABLED") {
            if let Ok(v) = val.parse() {
                self.optimize.enabled = v;
            }
        }
        if let Ok(val) = env::var("CD_CONF_OPTIMIZE_MAX_TOTAL_SIZE") {
            if let Ok(v) = val.parse() {
                self.optimize.max_total_size = v;
            }
        }
        if let Ok(val) = env::var("CD_CONF_OPTIMIZE_INTERVAL_SECS") {
            if let Ok(v) = val.parse() {
                self.optimize.interval_secs = v;
            }
        }
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        // Ensure database directory exists
        if let Some(parent) = Path::new(&self.database.path).parent() {
            fs::create_dir_all(parent)?;
        }

        fs::create_dir_all(&self.storage.temp_path)?;
        fs::create_dir_all(&self.storage.files_path)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [backend]
            chat_name = "drive"

            [optimize]
            enabled = true
            max_files_count = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.backend.chat_name, "drive");
        assert_eq!(config.backend.chunk_size, 64 * 1024);
        assert!(config.optimize.enabled);
        assert_eq!(config.optimize.policy().max_files_count, 10);
        assert_eq!(config.optimize.policy().immunity, Duration::from_secs(15 * 60));
        assert_eq!(config.database.path, "data/chatdrive.db");
        assert!(!config.server.open_registration);
        assert!(config.server.ip_whitelist.is_empty());
        assert!(config.server.initial_user.is_none());
    }

    #[test]
    fn test_default_chat_selector() {
        let mut backend = BackendConfig::default();
        assert_eq!(backend.default_chat().name.as_deref(), Some("chatdrive"));

        backend.chat_name.clear();
        let selector = backend.default_chat();
        assert!(selector.name.is_none());
        assert_eq!(selector.id, Some(1));
    }
}
