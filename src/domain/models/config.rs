use serde::{Deserialize, Serialize};

use super::behavior::PolicyTable;

/// Main configuration structure for Seaworthy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Offline action queue configuration
    #[serde(default)]
    pub offline_queue: OfflineQueueConfig,

    /// Response cache configuration
    #[serde(default)]
    pub cache: CacheConfig,

    /// HTTP transport configuration
    #[serde(default)]
    pub transport: TransportConfig,

    /// Per-tier behaviour overrides
    #[serde(default)]
    pub policy: PolicyTable,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".seaworthy/seaworthy.db".to_string()
}

const fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}", self.path)
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,

    /// Number of days to retain logs
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
            retention_days: default_retention_days(),
        }
    }
}

/// Where offline actions are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    /// Lost on restart; for tests and hosts without writable storage.
    Memory,
}

/// Offline action queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OfflineQueueConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Replay attempts before an action is abandoned
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Maximum number of pending actions
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

const fn default_max_attempts() -> u32 {
    5
}

const fn default_capacity() -> usize {
    1_000
}

impl Default for OfflineQueueConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            max_attempts: default_max_attempts(),
            capacity: default_capacity(),
        }
    }
}

/// Response cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CacheConfig {
    /// Maximum number of cached responses
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

const fn default_max_entries() -> usize {
    512
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

/// HTTP transport configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TransportConfig {
    /// Base URL every endpoint is resolved against
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_user_agent() -> String {
    format!("seaworthy/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_url() {
        let mut db = DatabaseConfig::default();
        assert_eq!(db.url(), "sqlite:.seaworthy/seaworthy.db");

        db.path = "sqlite::memory:".to_string();
        assert_eq!(db.url(), "sqlite::memory:");
    }

    #[test]
    fn test_store_backend_parsing() {
        let queue: OfflineQueueConfig =
            serde_yaml::from_str("backend: memory\ncapacity: 10").expect("should parse");
        assert_eq!(queue.backend, StoreBackend::Memory);
        assert_eq!(queue.capacity, 10);
        assert_eq!(queue.max_attempts, 5);
    }
}
