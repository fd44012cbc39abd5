//! Cache configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (SITECACHE_*, nested with `__`)
//! 2. TOML config file (if SITECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::cache::ContentKind;

mod validation;

pub use validation::ConfigError;

/// Which storage backend the manager constructs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    File,
    Redis,
    /// Reserved selector; rejected at initialization.
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Redis => "redis",
            Self::Memory => "memory",
        }
    }
}

/// Default time-to-live per content kind, in seconds.
///
/// A value `<= 0` means entries of that kind never expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlConfig {
    /// Fallback for `generic` and anything unrecognized.
    #[serde(default = "default_ttl")]
    pub default: i64,
    #[serde(default = "default_day")]
    pub html: i64,
    #[serde(default = "default_week")]
    pub image: i64,
    #[serde(default = "default_day")]
    pub metadata: i64,
    #[serde(default = "default_day")]
    pub robots: i64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            default: default_ttl(),
            html: default_day(),
            image: default_week(),
            metadata: default_day(),
            robots: default_day(),
        }
    }
}

/// Settings for the filesystem backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConfig {
    /// Root directory holding the per-kind partitions.
    ///
    /// Set via SITECACHE_FILE__ROOT_DIR environment variable.
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// Size budget in megabytes; eviction trims to 80% once exceeded.
    ///
    /// Set via SITECACHE_FILE__MAX_SIZE_MB environment variable.
    #[serde(default = "default_max_size_mb")]
    pub max_size_mb: u64,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self { root_dir: default_root_dir(), max_size_mb: default_max_size_mb() }
    }
}

impl FileConfig {
    pub fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

/// Settings for the Redis backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_host")]
    pub host: String,
    #[serde(default = "default_redis_port")]
    pub port: u16,
    #[serde(default)]
    pub db: i64,
    #[serde(default)]
    pub password: Option<String>,

    /// Prepended to every logical key so several caches can share a keyspace.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub response_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: default_redis_host(),
            port: default_redis_port(),
            db: 0,
            password: None,
            key_prefix: default_key_prefix(),
            connect_timeout_ms: default_timeout_ms(),
            response_timeout_ms: default_timeout_ms(),
        }
    }
}

impl RedisConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn response_timeout(&self) -> Duration {
        Duration::from_millis(self.response_timeout_ms)
    }
}

/// Cache configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (SITECACHE_*)
/// 2. TOML config file (if SITECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Storage backend selector.
    ///
    /// Set via SITECACHE_BACKEND environment variable (`file` or `redis`).
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    #[serde(default)]
    pub ttl: TtlConfig,

    #[serde(default)]
    pub file: FileConfig,

    #[serde(default)]
    pub redis: RedisConfig,

    /// Gzip-compress encoded entries on write.
    ///
    /// Set via SITECACHE_COMPRESSION environment variable.
    #[serde(default = "default_true")]
    pub compression: bool,

    /// Run a `cleanup_expired` pass when the manager initializes.
    #[serde(default)]
    pub cleanup_on_startup: bool,

    /// Keys longer than this are truncated and suffixed with a hash.
    #[serde(default = "default_max_key_length")]
    pub max_key_length: usize,
}

fn default_backend() -> BackendKind {
    BackendKind::File
}

fn default_ttl() -> i64 {
    3600
}

fn default_day() -> i64 {
    86_400
}

fn default_week() -> i64 {
    604_800
}

fn default_root_dir() -> PathBuf {
    PathBuf::from("./.sitecache")
}

fn default_max_size_mb() -> u64 {
    500
}

fn default_redis_host() -> String {
    "127.0.0.1".into()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_key_prefix() -> String {
    "sitecache:".into()
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_max_key_length() -> usize {
    250
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            ttl: TtlConfig::default(),
            file: FileConfig::default(),
            redis: RedisConfig::default(),
            compression: true,
            cleanup_on_startup: false,
            max_key_length: default_max_key_length(),
        }
    }
}

impl CacheConfig {
    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `SITECACHE_`
    /// 2. TOML file from `SITECACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    /// The layered figment `load` extracts from.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("SITECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment.merge(
            Env::prefixed("SITECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        )
    }

    /// Extract and validate a configuration from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Default TTL for a content kind, falling back to the global default.
    pub fn ttl_for_content_type(&self, kind: ContentKind) -> i64 {
        match kind {
            ContentKind::Html => self.ttl.html,
            ContentKind::Image => self.ttl.image,
            ContentKind::Metadata => self.ttl.metadata,
            ContentKind::Robots => self.ttl.robots,
            ContentKind::Generic => self.ttl.default,
        }
    }
}
