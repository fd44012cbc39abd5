//! Core caching engine for sitecache.
//!
//! This crate provides:
//! - Cache backends (filesystem, Redis) behind one async trait
//! - A manager facade with content-kind-specific operations
//! - Unified error types
//! - Layered configuration loading

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheEntry, CacheManager, CacheValue, ContentKind};
pub use config::CacheConfig;
pub use error::Error;
