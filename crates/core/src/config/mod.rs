//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SNIPPETS_*, nested keys split on `__`)
//! 2. TOML config file (if SNIPPETS_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SNIPPETS_*)
/// 2. TOML config file (if SNIPPETS_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Base64 symmetric key for content encryption.
    ///
    /// Set via SNIPPETS_ENCRYPTION_KEY. Required; must decode to 16, 24, or 32 bytes.
    #[serde(default)]
    pub encryption_key: Option<String>,

    #[serde(default)]
    pub db: DbConfig,

    #[serde(default)]
    pub cache: CacheConfig,
}

/// Primary/replica database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// SQLite path of the primary. `:memory:` for an in-memory database.
    ///
    /// Set via SNIPPETS_DB__PRIMARY_DSN. Required.
    #[serde(default)]
    pub primary_dsn: String,

    /// Read replicas, selected round-robin.
    #[serde(default)]
    pub replica_dsns: Vec<String>,

    #[serde(default = "default_max_open_conns")]
    pub max_open_conns: usize,

    #[serde(default = "default_max_idle_conns")]
    pub max_idle_conns: usize,

    /// Seconds before a connection is recycled. 0 disables recycling.
    #[serde(default = "default_conn_max_lifetime_secs")]
    pub conn_max_lifetime_secs: u64,

    /// Per-query deadline in milliseconds.
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

/// Which key/value store backs the cache-aside layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Redis,
    Sqlite,
}

/// Cache-aside settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Set via SNIPPETS_CACHE__ENABLED.
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub backend: CacheBackendKind,

    /// Redis `host:port`.
    #[serde(default = "default_cache_addr")]
    pub addr: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Redis logical database number.
    #[serde(default)]
    pub db: i64,

    /// SQLite file used by the `sqlite` backend.
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,

    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Deadline for every cache round trip, including the startup ping.
    #[serde(default = "default_cache_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_max_open_conns() -> usize {
    25
}

fn default_max_idle_conns() -> usize {
    10
}

fn default_conn_max_lifetime_secs() -> u64 {
    300
}

fn default_query_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_cache_addr() -> String {
    "localhost:6379".into()
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./snippets-cache.sqlite")
}

fn default_cache_ttl_secs() -> u64 {
    7_200 // 2h
}

fn default_cache_timeout_ms() -> u64 {
    1_000
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            primary_dsn: String::new(),
            replica_dsns: Vec::new(),
            max_open_conns: default_max_open_conns(),
            max_idle_conns: default_max_idle_conns(),
            conn_max_lifetime_secs: default_conn_max_lifetime_secs(),
            query_timeout_ms: default_query_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackendKind::default(),
            addr: default_cache_addr(),
            password: None,
            db: 0,
            path: default_cache_path(),
            ttl_secs: default_cache_ttl_secs(),
            timeout_ms: default_cache_timeout_ms(),
        }
    }
}

impl DbConfig {
    /// `None` when recycling is disabled.
    pub fn conn_max_lifetime(&self) -> Option<Duration> {
        (self.conn_max_lifetime_secs > 0).then(|| Duration::from_secs(self.conn_max_lifetime_secs))
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// `redis://[:password@]addr/db`
    pub fn redis_url(&self) -> String {
        match self.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => format!("redis://:{password}@{}/{}", self.addr, self.db),
            None => format!("redis://{}/{}", self.addr, self.db),
        }
    }
}

impl AppConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SNIPPETS_`
    /// 2. TOML file from `SNIPPETS_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SNIPPETS_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        Self::from_figment(figment.merge(Self::env_provider()))
    }

    fn env_provider() -> Env {
        Env::prefixed("SNIPPETS_")
            .ignore(&["CONFIG_FILE"])
            .map(|key| key.as_str().to_lowercase().into())
            .split("__")
    }

    fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The encryption key, required at startup.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if the key is not set.
    pub fn require_encryption_key(&self) -> Result<&str, ConfigError> {
        self.encryption_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| ConfigError::Missing {
                field: "encryption_key".into(),
                hint: "Set SNIPPETS_ENCRYPTION_KEY to a base64 16/24/32-byte key".into(),
            })
    }
}
