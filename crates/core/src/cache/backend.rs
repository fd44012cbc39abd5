//! The storage contract every backend implements.
//!
//! Routine operations never return errors: failures are logged, counted
//! under `errors` and reported as a miss (`None`) or `false`. Only
//! [`CacheBackend::initialize`] is fallible, because an unreachable store or a
//! broken cache directory is a configuration problem the caller must see.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use super::entry::{CacheEntry, CacheValue, ContentKind};
use crate::Error;

/// Storage backend trait.
#[async_trait::async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name reported in stats (`file`, `redis`).
    fn name(&self) -> &'static str;

    /// Prepare the backend for use: create directories, connect and probe.
    async fn initialize(&self) -> Result<(), Error>;

    /// Fetch a live entry. Expired entries are removed and reported as a miss.
    async fn get(&self, key: &str) -> Option<CacheEntry>;

    /// Store a value. `ttl = None` uses the default for `content_type`.
    async fn set(&self, key: &str, value: CacheValue, ttl: Option<i64>, content_type: ContentKind) -> bool;

    /// Remove a key. Returns whether anything was removed.
    async fn delete(&self, key: &str) -> bool;

    /// Remove every entry owned by this backend and reset counters.
    async fn clear(&self) -> bool;

    async fn stats(&self) -> BackendStats;

    /// Remove expired (and undecodable) entries. Returns how many were removed.
    async fn cleanup_expired(&self) -> usize;

    /// Release connections or background work. Defaults to a no-op.
    async fn shutdown(&self) {}
}

/// In-process operation counters shared by all backends.
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    errors: AtomicU64,
}

impl CacheCounters {
    pub fn hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reset(&self) {
        for counter in [&self.hits, &self.misses, &self.sets, &self.deletes, &self.errors] {
            counter.store(0, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CounterSnapshot {
            hits,
            misses,
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            hit_rate: if lookups == 0 { 0.0 } else { hits as f64 / lookups as f64 },
        }
    }
}

/// Point-in-time copy of [`CacheCounters`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub errors: u64,
    pub hit_rate: f64,
}

/// Statistics reported by a backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendStats {
    pub backend: String,
    pub total_entries: u64,
    pub total_size_bytes: u64,
    /// True when `total_size_bytes` is extrapolated from a sample.
    pub size_is_estimate: bool,
    /// Approximate count of expired entries, where the backend can tell.
    pub expired_entries: Option<u64>,
    #[serde(flatten)]
    pub counters: CounterSnapshot,
    pub details: BackendDetails,
}

/// Backend-specific statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendDetails {
    File {
        root_dir: PathBuf,
        max_size_mb: u64,
        usage_percent: f64,
        entries_by_kind: BTreeMap<ContentKind, u64>,
    },
    Redis {
        host: String,
        port: u16,
        db: i64,
        key_prefix: String,
        connected: bool,
        redis_version: Option<String>,
        used_memory: Option<String>,
        connected_clients: Option<u64>,
        sampled_keys: usize,
    },
}
