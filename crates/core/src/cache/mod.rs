//! Content cache with interchangeable storage backends.
//!
//! This module provides a content-addressed cache for fetched HTML, images,
//! structured metadata and robots.txt. It supports:
//!
//! - A filesystem backend with atomic writes, gzip compression and
//!   size-bounded eviction
//! - A Redis backend delegating expiry to the store (feature `redis`)
//! - Lazy expiry on read plus explicit cleanup passes
//! - A manager facade deriving keys from URLs and domains

pub mod backend;
pub mod codec;
pub mod entry;
pub mod file;
pub mod hash;
pub mod manager;
#[cfg(feature = "redis")]
pub mod redis;

pub use crate::Error;

pub use backend::{BackendDetails, BackendStats, CacheBackend, CacheCounters, CounterSnapshot};
pub use entry::{CacheEntry, CacheValue, ContentKind};
pub use file::FileBackend;
pub use hash::{KeyPart, generate_key};
pub use manager::{CacheManager, CacheStatsReport, ConfigSnapshot};
#[cfg(feature = "redis")]
pub use redis::RedisBackend;
