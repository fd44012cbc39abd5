//! Redis cache backend.
//!
//! Expiry is delegated to the store (`SET .. EX ttl`); entries are still
//! checked on read in case a writer with a skewed clock or another backend
//! produced them. Aggregate size is estimated from a bounded sample of keys
//! because reading every value would cost as much as the cache itself.

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, ConnectionAddr, ConnectionInfo, InfoDict, RedisConnectionInfo};
use tokio::sync::Mutex;

use super::backend::{BackendDetails, BackendStats, CacheBackend, CacheCounters};
use super::codec;
use super::entry::{CacheEntry, CacheValue, ContentKind};
use crate::Error;
use crate::config::CacheConfig;

/// Keys whose payload length is sampled for the size estimate.
const SIZE_SAMPLE: usize = 100;

/// SCAN page size hint.
const SCAN_COUNT: usize = 500;

/// Keys per DEL during `clear`.
const DELETE_BATCH: usize = 500;

/// Longest TTL handed to `SET EX`; Redis rejects expiries that overflow its clock.
const MAX_NATIVE_TTL_SECS: i64 = 100 * 365 * 24 * 3600;

/// Redis-backed cache.
pub struct RedisBackend {
    config: CacheConfig,
    counters: CacheCounters,
    connection: Mutex<Option<MultiplexedConnection>>,
}

struct StoreSnapshot {
    total_keys: u64,
    estimated_size: u64,
    sampled_keys: usize,
    redis_version: Option<String>,
    used_memory: Option<String>,
    connected_clients: Option<u64>,
}

impl RedisBackend {
    pub fn new(config: CacheConfig) -> Self {
        Self { config, counters: CacheCounters::default(), connection: Mutex::new(None) }
    }

    /// Store key for a logical cache key.
    pub fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.config.redis.key_prefix)
    }

    fn connection_info(&self) -> ConnectionInfo {
        let settings = &self.config.redis;
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(settings.host.clone(), settings.port),
            redis: RedisConnectionInfo { db: settings.db, password: settings.password.clone(), ..Default::default() },
        }
    }

    /// Shared connection, created and probed on first use.
    async fn connection(&self) -> Result<MultiplexedConnection, Error> {
        let mut guard = self.connection.lock().await;
        if let Some(conn) = guard.as_ref() {
            return Ok(conn.clone());
        }

        let conn = self.connect().await?;
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Open a connection and PING it. A failed probe drops the connection.
    async fn connect(&self) -> Result<MultiplexedConnection, Error> {
        let settings = &self.config.redis;
        let target = format!("{}:{}/{}", settings.host, settings.port, settings.db);

        let client = Client::open(self.connection_info()).map_err(|e| Error::Connection(format!("{target}: {e}")))?;
        let mut conn = client
            .get_multiplexed_async_connection_with_timeouts(settings.response_timeout(), settings.connect_timeout())
            .await
            .map_err(|e| Error::Connection(format!("{target}: {e}")))?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::Connection(format!("{target}: ping failed: {e}")))?;

        tracing::debug!(addr = %target, "redis connection established");
        Ok(conn)
    }

    /// Log and count a failed routine operation, dropping the connection if it is broken.
    async fn record_failure(&self, op: &str, key: &str, err: &Error) {
        tracing::warn!(op, key, error = %err, "redis cache operation failed");
        self.counters.error();

        let broken = match err {
            Error::Redis(e) => e.is_io_error() || e.is_connection_dropped() || e.is_timeout(),
            Error::Connection(_) => true,
            _ => false,
        };
        if broken {
            *self.connection.lock().await = None;
        }
    }

    async fn try_get(&self, key: &str) -> Result<Option<Vec<u8>>, Error> {
        let mut conn = self.connection().await?;
        Ok(conn.get(self.full_key(key)).await?)
    }

    async fn try_set(&self, key: &str, bytes: Vec<u8>, ttl: i64) -> Result<(), Error> {
        let mut conn = self.connection().await?;
        let full = self.full_key(key);
        match native_ttl(ttl) {
            Some(seconds) => {
                let _: () = conn.set_ex(full, bytes, seconds).await?;
            }
            None => {
                let _: () = conn.set(full, bytes).await?;
            }
        }
        Ok(())
    }

    async fn try_delete(&self, key: &str) -> Result<bool, Error> {
        let mut conn = self.connection().await?;
        let removed: i64 = conn.del(self.full_key(key)).await?;
        Ok(removed > 0)
    }

    async fn try_clear(&self) -> Result<usize, Error> {
        let mut conn = self.connection().await?;
        let keys = self.scan_keys(&mut conn).await?;
        for batch in keys.chunks(DELETE_BATCH) {
            let _: i64 = conn.del(batch).await?;
        }
        Ok(keys.len())
    }

    /// Every store key under the configured prefix.
    async fn scan_keys(&self, conn: &mut MultiplexedConnection) -> Result<Vec<String>, Error> {
        let pattern = format!("{}*", escape_glob(&self.config.redis.key_prefix));
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(conn)
                .await?;
            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn try_store_snapshot(&self) -> Result<StoreSnapshot, Error> {
        let mut conn = self.connection().await?;
        let info: InfoDict = redis::cmd("INFO").query_async(&mut conn).await?;
        let keys = self.scan_keys(&mut conn).await?;

        let mut sampled_keys = 0usize;
        let mut sampled_bytes = 0u64;
        for key in keys.iter().take(SIZE_SAMPLE) {
            let len: redis::RedisResult<u64> = conn.strlen(key).await;
            match len {
                Ok(len) => {
                    sampled_keys += 1;
                    sampled_bytes += len;
                }
                Err(e) => tracing::debug!(key = %key, error = %e, "skipping size sample"),
            }
        }

        Ok(StoreSnapshot {
            total_keys: keys.len() as u64,
            estimated_size: estimate_total_size(sampled_bytes, sampled_keys, keys.len()),
            sampled_keys,
            redis_version: info.get("redis_version"),
            used_memory: info.get("used_memory_human"),
            connected_clients: info.get("connected_clients"),
        })
    }
}

#[async_trait::async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn initialize(&self) -> Result<(), Error> {
        self.connection().await?;
        tracing::info!(
            host = %self.config.redis.host,
            port = self.config.redis.port,
            db = self.config.redis.db,
            "redis cache backend initialized"
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        let bytes = match self.try_get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(key, "cache miss");
                self.counters.miss();
                return None;
            }
            Err(e) => {
                self.record_failure("get", key, &e).await;
                return None;
            }
        };

        let entry = match codec::decode_entry(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(key, error = %e, "corrupted redis payload");
                self.counters.error();
                return None;
            }
        };

        if entry.is_expired() {
            tracing::debug!(key, "stale entry outlived store ttl");
            if let Err(e) = self.try_delete(key).await {
                self.record_failure("delete", key, &e).await;
            }
            self.counters.miss();
            return None;
        }

        tracing::debug!(key, "cache hit");
        self.counters.hit();
        Some(entry)
    }

    async fn set(&self, key: &str, value: CacheValue, ttl: Option<i64>, content_type: ContentKind) -> bool {
        let ttl = ttl.unwrap_or_else(|| self.config.ttl_for_content_type(content_type));
        let entry = CacheEntry::new(key, value, ttl, content_type, self.config.compression);

        let bytes = match codec::encode_entry(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to encode cache entry");
                self.counters.error();
                return false;
            }
        };

        match self.try_set(key, bytes, ttl).await {
            Ok(()) => {
                self.counters.set();
                true
            }
            Err(e) => {
                self.record_failure("set", key, &e).await;
                false
            }
        }
    }

    async fn delete(&self, key: &str) -> bool {
        match self.try_delete(key).await {
            Ok(removed) => {
                if removed {
                    self.counters.delete();
                }
                removed
            }
            Err(e) => {
                self.record_failure("delete", key, &e).await;
                false
            }
        }
    }

    async fn clear(&self) -> bool {
        match self.try_clear().await {
            Ok(removed) => {
                self.counters.reset();
                tracing::info!(removed, prefix = %self.config.redis.key_prefix, "redis cache cleared");
                true
            }
            Err(e) => {
                self.record_failure("clear", &self.config.redis.key_prefix, &e).await;
                false
            }
        }
    }

    async fn stats(&self) -> BackendStats {
        let settings = &self.config.redis;
        let snapshot = match self.try_store_snapshot().await {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                self.record_failure("stats", &settings.key_prefix, &e).await;
                None
            }
        };

        let connected = snapshot.is_some();
        let snapshot = snapshot.unwrap_or(StoreSnapshot {
            total_keys: 0,
            estimated_size: 0,
            sampled_keys: 0,
            redis_version: None,
            used_memory: None,
            connected_clients: None,
        });

        BackendStats {
            backend: self.name().to_string(),
            total_entries: snapshot.total_keys,
            total_size_bytes: snapshot.estimated_size,
            size_is_estimate: true,
            expired_entries: None,
            counters: self.counters.snapshot(),
            details: BackendDetails::Redis {
                host: settings.host.clone(),
                port: settings.port,
                db: settings.db,
                key_prefix: settings.key_prefix.clone(),
                connected,
                redis_version: snapshot.redis_version,
                used_memory: snapshot.used_memory,
                connected_clients: snapshot.connected_clients,
                sampled_keys: snapshot.sampled_keys,
            },
        }
    }

    /// Redis expires keys itself; there is nothing to sweep.
    async fn cleanup_expired(&self) -> usize {
        tracing::debug!("redis backend delegates expiry to the store");
        0
    }

    async fn shutdown(&self) {
        if self.connection.lock().await.take().is_some() {
            tracing::info!("redis connection closed");
        }
    }
}

/// Store-side expiry for an entry TTL. Non-positive and oversized TTLs are
/// stored without one; the entry's own TTL still applies on read.
fn native_ttl(ttl: i64) -> Option<u64> {
    (ttl > 0 && ttl <= MAX_NATIVE_TTL_SECS).then_some(ttl as u64)
}

/// Extrapolate the mean sampled payload length to `total_keys`.
fn estimate_total_size(sampled_bytes: u64, sampled_keys: usize, total_keys: usize) -> u64 {
    if sampled_keys == 0 {
        return 0;
    }
    (sampled_bytes as f64 / sampled_keys as f64 * total_keys as f64).round() as u64
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
