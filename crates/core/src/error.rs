//! Unified error types for sitecache.
//!
//! Only fatal conditions travel through this type. Routine cache failures
//! (I/O hiccups, corrupted payloads) are logged and folded into misses by the
//! backends instead.

use crate::config::ConfigError;

/// Unified error type for the cache core.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be loaded or failed validation.
    #[error("CONFIG_ERROR: {0}")]
    Config(#[from] ConfigError),

    /// The configured backend selector is not implemented.
    #[error("UNSUPPORTED_BACKEND: {0}")]
    UnsupportedBackend(String),

    /// The backend exists but its client library was not compiled in.
    #[error("BACKEND_UNAVAILABLE: {0}")]
    BackendUnavailable(String),

    /// The store could not be reached or refused authentication.
    #[error("CONNECTION_ERROR: {0}")]
    Connection(String),

    /// Filesystem operation failed.
    #[error("IO_ERROR: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be encoded.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// Stored bytes could not be decoded back into an entry.
    #[error("CORRUPTED_ENTRY: {0}")]
    Corrupted(String),

    /// Redis command failed.
    #[cfg(feature = "redis")]
    #[error("REDIS_ERROR: {0}")]
    Redis(#[from] redis::RedisError),
}
