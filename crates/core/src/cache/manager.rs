//! Cache manager facade.
//!
//! The manager is the only entry point collaborators use. It owns exactly one
//! backend, chosen by [`CacheConfig::backend`], builds it lazily on first use
//! and derives content-addressed keys so callers never handle raw keys:
//!
//! - `{kind}:{sha256(url)[:16]}` for URL-addressed content
//! - `robots:{domain}` for robots.txt
//!
//! Accessors only return `Err` for fatal initialization failures. Everything
//! after that degrades to a miss or `false`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::backend::{BackendStats, CacheBackend};
use super::entry::{CacheEntry, CacheValue, ContentKind};
use super::file::FileBackend;
use super::hash::{KeyPart, generate_key, url_key};
#[cfg(feature = "redis")]
use super::redis::RedisBackend;
use crate::Error;
use crate::config::{BackendKind, CacheConfig, TtlConfig};

/// Configuration echoed alongside backend statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub backend_type: BackendKind,
    pub compression: bool,
    pub cleanup_on_startup: bool,
    pub max_key_length: usize,
    pub ttl: TtlConfig,
}

/// Backend statistics merged with the manager's configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheStatsReport {
    #[serde(flatten)]
    pub stats: BackendStats,
    pub config: ConfigSnapshot,
}

/// Facade over a single cache backend.
pub struct CacheManager {
    config: CacheConfig,
    backend: RwLock<Option<Arc<dyn CacheBackend>>>,
    init_lock: Mutex<()>,
    initialized: AtomicBool,
}

impl CacheManager {
    pub fn new(config: CacheConfig) -> Self {
        Self { config, backend: RwLock::new(None), init_lock: Mutex::new(()), initialized: AtomicBool::new(false) }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Construct and initialize the configured backend. Idempotent.
    ///
    /// # Errors
    ///
    /// - `Error::Config` when the configuration fails validation
    /// - `Error::UnsupportedBackend` for the reserved memory selector
    /// - `Error::BackendUnavailable` for Redis without the `redis` feature
    /// - `Error::Connection` / `Error::Io` when the backend cannot start
    pub async fn initialize(&self) -> Result<(), Error> {
        self.ensure_backend().await.map(|_| ())
    }

    async fn ensure_backend(&self) -> Result<Arc<dyn CacheBackend>, Error> {
        if let Some(backend) = self.backend.read().await.as_ref() {
            return Ok(Arc::clone(backend));
        }

        let _guard = self.init_lock.lock().await;
        if let Some(backend) = self.backend.read().await.as_ref() {
            return Ok(Arc::clone(backend));
        }

        self.config.validate()?;
        let backend = create_backend(&self.config)?;
        backend.initialize().await?;

        if self.config.cleanup_on_startup {
            let removed = backend.cleanup_expired().await;
            tracing::info!(removed, "startup cleanup finished");
        }

        *self.backend.write().await = Some(Arc::clone(&backend));
        self.initialized.store(true, Ordering::Release);
        tracing::info!(backend = backend.name(), "cache manager initialized");

        Ok(backend)
    }

    /// Tear the backend down. A later call re-initializes it.
    pub async fn shutdown(&self) {
        let _guard = self.init_lock.lock().await;
        let backend = self.backend.write().await.take();
        self.initialized.store(false, Ordering::Release);

        if let Some(backend) = backend {
            backend.shutdown().await;
            tracing::info!(backend = backend.name(), "cache manager shut down");
        }
    }

    /// Cache key for `target`: a URL, or a domain for [`ContentKind::Robots`].
    pub fn key_for(&self, kind: ContentKind, target: &str) -> String {
        match kind {
            ContentKind::Robots => {
                generate_key(&[KeyPart::from(kind.as_str()), KeyPart::from(target)], self.config.max_key_length)
            }
            _ => url_key(kind.as_str(), target),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<CacheEntry>, Error> {
        Ok(self.ensure_backend().await?.get(key).await)
    }

    pub async fn set(
        &self, key: &str, value: impl Into<CacheValue>, ttl: Option<i64>, kind: ContentKind,
    ) -> Result<bool, Error> {
        Ok(self.ensure_backend().await?.set(key, value.into(), ttl, kind).await)
    }

    pub async fn delete(&self, key: &str) -> Result<bool, Error> {
        Ok(self.ensure_backend().await?.delete(key).await)
    }

    pub async fn get_html(&self, url: &str) -> Result<Option<String>, Error> {
        self.get_value(ContentKind::Html, url, CacheValue::into_text).await
    }

    pub async fn set_html(&self, url: &str, html: impl Into<String>, ttl: Option<i64>) -> Result<bool, Error> {
        self.set_value(ContentKind::Html, url, CacheValue::Text(html.into()), ttl).await
    }

    pub async fn get_image(&self, url: &str) -> Result<Option<Vec<u8>>, Error> {
        self.get_value(ContentKind::Image, url, CacheValue::into_bytes).await
    }

    pub async fn set_image(&self, url: &str, bytes: impl Into<Vec<u8>>, ttl: Option<i64>) -> Result<bool, Error> {
        self.set_value(ContentKind::Image, url, CacheValue::Binary(bytes.into()), ttl).await
    }

    pub async fn get_metadata(&self, url: &str) -> Result<Option<Value>, Error> {
        self.get_value(ContentKind::Metadata, url, CacheValue::into_structured).await
    }

    pub async fn set_metadata(&self, url: &str, metadata: Value, ttl: Option<i64>) -> Result<bool, Error> {
        self.set_value(ContentKind::Metadata, url, CacheValue::Structured(metadata), ttl).await
    }

    pub async fn get_robots_txt(&self, domain: &str) -> Result<Option<String>, Error> {
        self.get_value(ContentKind::Robots, domain, CacheValue::into_text).await
    }

    pub async fn set_robots_txt(
        &self, domain: &str, content: impl Into<String>, ttl: Option<i64>,
    ) -> Result<bool, Error> {
        self.set_value(ContentKind::Robots, domain, CacheValue::Text(content.into()), ttl).await
    }

    /// Drop the HTML and metadata entries for `url`. The image entry is left alone.
    ///
    /// Returns true if at least one entry was removed.
    pub async fn invalidate_url(&self, url: &str) -> Result<bool, Error> {
        let backend = self.ensure_backend().await?;
        let html = backend.delete(&self.key_for(ContentKind::Html, url)).await;
        let metadata = backend.delete(&self.key_for(ContentKind::Metadata, url)).await;
        tracing::debug!(url, html, metadata, "invalidated url");
        Ok(html || metadata)
    }

    pub async fn clear_all(&self) -> Result<bool, Error> {
        Ok(self.ensure_backend().await?.clear().await)
    }

    pub async fn cleanup_expired(&self) -> Result<usize, Error> {
        Ok(self.ensure_backend().await?.cleanup_expired().await)
    }

    pub async fn get_cache_stats(&self) -> Result<CacheStatsReport, Error> {
        let stats = self.ensure_backend().await?.stats().await;
        Ok(CacheStatsReport {
            stats,
            config: ConfigSnapshot {
                backend_type: self.config.backend,
                compression: self.config.compression,
                cleanup_on_startup: self.config.cleanup_on_startup,
                max_key_length: self.config.max_key_length,
                ttl: self.config.ttl.clone(),
            },
        })
    }

    async fn get_value<T>(
        &self, kind: ContentKind, target: &str, extract: fn(CacheValue) -> Option<T>,
    ) -> Result<Option<T>, Error> {
        let key = self.key_for(kind, target);
        let Some(entry) = self.ensure_backend().await?.get(&key).await else {
            return Ok(None);
        };

        let variant = entry.value.variant();
        let value = extract(entry.value);
        if value.is_none() {
            tracing::warn!(key = %key, kind = %kind, found = variant, "cached value has unexpected type");
        }
        Ok(value)
    }

    async fn set_value(
        &self, kind: ContentKind, target: &str, value: CacheValue, ttl: Option<i64>,
    ) -> Result<bool, Error> {
        let key = self.key_for(kind, target);
        Ok(self.ensure_backend().await?.set(&key, value, ttl, kind).await)
    }

    #[cfg(test)]
    async fn current_backend(&self) -> Option<Arc<dyn CacheBackend>> {
        self.backend.read().await.clone()
    }
}

fn create_backend(config: &CacheConfig) -> Result<Arc<dyn CacheBackend>, Error> {
    match config.backend {
        BackendKind::File => Ok(Arc::new(FileBackend::new(config.clone()))),
        #[cfg(feature = "redis")]
        BackendKind::Redis => Ok(Arc::new(RedisBackend::new(config.clone()))),
        #[cfg(not(feature = "redis"))]
        BackendKind::Redis => {
            Err(Error::BackendUnavailable("redis support not compiled in; enable the `redis` feature".into()))
        }
        BackendKind::Memory => Err(Error::UnsupportedBackend("memory backend is reserved and not implemented".into())),
    }
}
