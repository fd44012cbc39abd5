//! Configuration validation rules.
//!
//! This module provides validation logic for `CacheConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{BackendKind, CacheConfig};
use thiserror::Error;

/// Shortest allowed `max_key_length`: room for a readable prefix plus the hash suffix.
pub const MIN_KEY_LENGTH: usize = 64;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

impl CacheConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_key_length` is below 64
    /// - `file.max_size_mb` is 0 or `file.root_dir` is empty
    /// - `redis.port` is 0, `redis.key_prefix` is empty or `redis.db` is negative
    /// - a Redis timeout is below 100ms
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_key_length < MIN_KEY_LENGTH {
            return Err(ConfigError::Invalid {
                field: "max_key_length".into(),
                reason: format!("must be at least {MIN_KEY_LENGTH}"),
            });
        }

        if self.file.max_size_mb == 0 {
            return Err(ConfigError::Invalid {
                field: "file.max_size_mb".into(),
                reason: "must be greater than 0".into(),
            });
        }
        if self.file.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid { field: "file.root_dir".into(), reason: "must not be empty".into() });
        }

        if self.redis.port == 0 {
            return Err(ConfigError::Invalid { field: "redis.port".into(), reason: "must not be 0".into() });
        }
        if self.redis.key_prefix.is_empty() {
            return Err(ConfigError::Invalid { field: "redis.key_prefix".into(), reason: "must not be empty".into() });
        }
        if self.redis.db < 0 {
            return Err(ConfigError::Invalid { field: "redis.db".into(), reason: "must not be negative".into() });
        }
        if self.redis.connect_timeout_ms < 100 || self.redis.response_timeout_ms < 100 {
            return Err(ConfigError::Invalid {
                field: "redis.timeouts".into(),
                reason: "must be at least 100ms".into(),
            });
        }

        if self.backend == BackendKind::Memory {
            tracing::warn!("memory backend is reserved and will be rejected at initialization");
        }

        Ok(())
    }
}
