//! Filesystem cache backend.
//!
//! Layout: `<root>/{html,image,metadata,robots,generic}/<sha256(key)>.cache`.
//!
//! - Writes go to a unique sibling temp file and are renamed into place, so a
//!   reader never observes a partially written entry.
//! - The content kind is not recoverable from a key, so reads probe the five
//!   partitions in [`ContentKind::ALL`] order.
//! - Writes of one key are serialized through a striped lock so a re-set under
//!   another kind cannot delete a concurrent writer's file.
//! - After each write a background task trims the tree back to 80% of the
//!   size budget once it is exceeded, oldest modification time first.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use tokio::fs;
use tokio::sync::Mutex;

use super::backend::{BackendDetails, BackendStats, CacheBackend, CacheCounters};
use super::codec;
use super::entry::{CacheEntry, CacheValue, ContentKind};
use super::hash::sha256_hex;
use crate::Error;
use crate::config::CacheConfig;

/// Extension of committed cache files.
pub const CACHE_EXT: &str = "cache";

const TMP_EXT: &str = "tmp";

/// Usage target after eviction, as a fraction of the budget.
const EVICTION_TARGET_RATIO: f64 = 0.8;

/// Number of write lock stripes.
const WRITE_STRIPES: usize = 64;

/// Temp files older than this are leftovers of interrupted writes.
const STALE_TMP_AGE: Duration = Duration::from_secs(15 * 60);

/// Filesystem-backed cache.
pub struct FileBackend {
    config: CacheConfig,
    root: PathBuf,
    counters: CacheCounters,
    enforcer: Arc<SizeEnforcer>,
    tmp_seq: AtomicU64,
    write_locks: Vec<Mutex<()>>,
}

impl FileBackend {
    pub fn new(config: CacheConfig) -> Self {
        let root = config.file.root_dir.clone();
        let enforcer = Arc::new(SizeEnforcer {
            root: root.clone(),
            max_bytes: config.file.max_size_bytes(),
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
        });
        let write_locks = (0..WRITE_STRIPES).map(|_| Mutex::new(())).collect();
        Self { config, root, counters: CacheCounters::default(), enforcer, tmp_seq: AtomicU64::new(0), write_locks }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file holding `key` within the partition for `kind`.
    pub fn entry_path(&self, key: &str, kind: ContentKind) -> PathBuf {
        kind_dir(&self.root, kind).join(format!("{}.{CACHE_EXT}", sha256_hex(key)))
    }

    /// Trim the cache to 80% of the budget if it is over budget.
    ///
    /// Returns the number of files evicted.
    pub async fn enforce_size_limit(&self) -> usize {
        self.enforcer.enforce().await
    }

    fn write_lock(&self, key: &str) -> &Mutex<()> {
        let digest = sha256_hex(key);
        let stripe = usize::from_str_radix(&digest[..4], 16).unwrap_or_default() % self.write_locks.len();
        &self.write_locks[stripe]
    }

    fn trigger_size_enforcement(&self) {
        let enforcer = Arc::clone(&self.enforcer);
        tokio::spawn(async move {
            enforcer.enforce_exclusive().await;
        });
    }

    async fn write_atomic(&self, path: &Path, bytes: &[u8]) -> Result<(), Error> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let seq = self.tmp_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{CACHE_EXT}.{}-{seq}.{TMP_EXT}", std::process::id()));

        fs::write(&tmp, bytes).await?;
        if let Err(e) = fs::rename(&tmp, path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Drop copies of `key` left in other partitions by an earlier write under another kind.
    async fn remove_stale_copies(&self, key: &str, keep: ContentKind) {
        for kind in ContentKind::ALL.into_iter().filter(|k| *k != keep) {
            let path = self.entry_path(key, kind);
            match fs::remove_file(&path).await {
                Ok(()) => tracing::debug!(key, from = %kind, "removed stale copy from other partition"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove stale copy"),
            }
        }
    }
}

#[async_trait::async_trait]
impl CacheBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn initialize(&self) -> Result<(), Error> {
        for kind in ContentKind::ALL {
            fs::create_dir_all(kind_dir(&self.root, kind)).await?;
        }
        tracing::info!(root = %self.root.display(), "file cache backend initialized");
        Ok(())
    }

    async fn get(&self, key: &str) -> Option<CacheEntry> {
        for kind in ContentKind::ALL {
            let path = self.entry_path(key, kind);
            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(key, path = %path.display(), error = %e, "cache read failed");
                    self.counters.error();
                    return None;
                }
            };

            let entry = match codec::decode_entry(&bytes) {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(key, path = %path.display(), error = %e, "corrupted cache file");
                    self.counters.error();
                    return None;
                }
            };

            if entry.is_expired() {
                tracing::debug!(key, "cache entry expired");
                if let Err(e) = fs::remove_file(&path).await
                    && e.kind() != ErrorKind::NotFound
                {
                    tracing::warn!(path = %path.display(), error = %e, "failed to remove expired entry");
                }
                self.counters.miss();
                return None;
            }

            tracing::debug!(key, kind = %kind, "cache hit");
            self.counters.hit();
            return Some(entry);
        }

        tracing::debug!(key, "cache miss");
        self.counters.miss();
        None
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

        let path = self.entry_path(key, content_type);
        {
            let _guard = self.write_lock(key).lock().await;
            if let Err(e) = self.write_atomic(&path, &bytes).await {
                tracing::warn!(key, path = %path.display(), error = %e, "cache write failed");
                self.counters.error();
                return false;
            }
            self.remove_stale_copies(key, content_type).await;
        }

        self.counters.set();
        self.trigger_size_enforcement();
        true
    }

    async fn delete(&self, key: &str) -> bool {
        let mut removed = false;
        for kind in ContentKind::ALL {
            let path = self.entry_path(key, kind);
            match fs::remove_file(&path).await {
                Ok(()) => removed = true,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(key, path = %path.display(), error = %e, "cache delete failed");
                    self.counters.error();
                }
            }
        }
        if removed {
            self.counters.delete();
        }
        removed
    }

    async fn clear(&self) -> bool {
        let mut ok = true;
        let mut removed = 0usize;

        for kind in ContentKind::ALL {
            let dir = kind_dir(&self.root, kind);
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to list cache directory");
                    ok = false;
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        tracing::warn!(dir = %dir.display(), error = %e, "failed to list cache directory");
                        ok = false;
                        break;
                    }
                };
                let path = entry.path();
                if !is_cache_file(&path) && !is_tmp_file(&path) {
                    continue;
                }
                match fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to remove cache file");
                        ok = false;
                    }
                }
            }
        }

        self.counters.reset();
        tracing::info!(removed, "file cache cleared");
        ok
    }

    /// Walks the tree on demand.
    ///
    /// `expired_entries` compares file modification time against the global
    /// default TTL only, not each entry's own TTL. It is a cheap approximation
    /// and can disagree with what `get` would report.
    async fn stats(&self) -> BackendStats {
        let files = list_cache_files(&self.root).await;
        let now = SystemTime::now();
        let default_ttl = self.config.ttl.default;

        let mut total_size = 0u64;
        let mut expired = 0u64;
        let mut by_kind: BTreeMap<ContentKind, u64> = ContentKind::ALL.into_iter().map(|k| (k, 0)).collect();

        for file in &files {
            total_size += file.size;
            *by_kind.entry(file.kind).or_default() += 1;
            if default_ttl > 0
                && now.duration_since(file.modified).unwrap_or_default() > Duration::from_secs(default_ttl as u64)
            {
                expired += 1;
            }
        }

        let max_bytes = self.config.file.max_size_bytes();
        let usage_percent = if max_bytes == 0 { 0.0 } else { total_size as f64 / max_bytes as f64 * 100.0 };

        BackendStats {
            backend: self.name().to_string(),
            total_entries: files.len() as u64,
            total_size_bytes: total_size,
            size_is_estimate: false,
            expired_entries: Some(expired),
            counters: self.counters.snapshot(),
            details: BackendDetails::File {
                root_dir: self.root.clone(),
                max_size_mb: self.config.file.max_size_mb,
                usage_percent,
                entries_by_kind: by_kind,
            },
        }
    }

    async fn cleanup_expired(&self) -> usize {
        let mut removed = 0usize;

        for file in list_cache_files(&self.root).await {
            let bytes = match fs::read(&file.path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    if e.kind() != ErrorKind::NotFound {
                        tracing::warn!(path = %file.path.display(), error = %e, "failed to read cache file");
                    }
                    continue;
                }
            };

            let reason = match codec::decode_entry(&bytes) {
                Ok(entry) if entry.is_expired() => "expired",
                Ok(_) => continue,
                Err(_) => "corrupted",
            };

            match fs::remove_file(&file.path).await {
                Ok(()) => {
                    tracing::debug!(path = %file.path.display(), reason, "removed cache file");
                    removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %file.path.display(), error = %e, "failed to remove cache file"),
            }
        }

        let swept = sweep_stale_tmp_files(&self.root, STALE_TMP_AGE).await;
        tracing::info!(removed, swept_tmp = swept, "file cache cleanup finished");
        removed
    }
}

/// Trims the cache directory back under budget.
struct SizeEnforcer {
    root: PathBuf,
    max_bytes: u64,
    running: AtomicBool,
    /// Set when a pass is requested while another is in flight.
    rerun: AtomicBool,
}

impl SizeEnforcer {
    /// Run a pass, or ask the pass already in flight to run once more.
    ///
    /// The in-flight pass may have listed the tree before the write that
    /// requested this one, so the request is never dropped.
    async fn enforce_exclusive(&self) -> usize {
        self.rerun.store(true, Ordering::Release);
        let mut evicted = 0;
        loop {
            if self.running.swap(true, Ordering::AcqRel) {
                return evicted;
            }
            self.rerun.store(false, Ordering::Release);
            evicted += self.enforce().await;
            self.running.store(false, Ordering::Release);

            if !self.rerun.load(Ordering::Acquire) {
                return evicted;
            }
        }
    }

    async fn enforce(&self) -> usize {
        let mut files = list_cache_files(&self.root).await;
        let mut total: u64 = files.iter().map(|f| f.size).sum();
        if total <= self.max_bytes {
            return 0;
        }

        let target = (self.max_bytes as f64 * EVICTION_TARGET_RATIO) as u64;
        files.sort_by_key(|f| f.modified);

        let mut evicted = 0usize;
        for file in files {
            if total <= target {
                break;
            }
            match fs::remove_file(&file.path).await {
                Ok(()) => {
                    total = total.saturating_sub(file.size);
                    evicted += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => total = total.saturating_sub(file.size),
                Err(e) => tracing::debug!(path = %file.path.display(), error = %e, "eviction skipped file"),
            }
        }

        tracing::info!(evicted, remaining_bytes = total, target_bytes = target, "cache size limit enforced");
        evicted
    }
}

struct CacheFile {
    path: PathBuf,
    kind: ContentKind,
    size: u64,
    modified: SystemTime,
}

fn kind_dir(root: &Path, kind: ContentKind) -> PathBuf {
    root.join(kind.as_str())
}

fn is_cache_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == CACHE_EXT)
}

fn is_tmp_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TMP_EXT)
}

/// Remove temp files left behind by writes that never reached the rename.
///
/// Only files older than `min_age` are touched so in-flight writes survive.
async fn sweep_stale_tmp_files(root: &Path, min_age: Duration) -> usize {
    let now = SystemTime::now();
    let mut swept = 0usize;

    for kind in ContentKind::ALL {
        let Ok(mut entries) = fs::read_dir(kind_dir(root, kind)).await else { continue };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_tmp_file(&path) {
                continue;
            }
            let Ok(modified) = entry.metadata().await.and_then(|meta| meta.modified()) else { continue };
            if now.duration_since(modified).unwrap_or_default() < min_age {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => swept += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove stale temp file"),
            }
        }
    }

    swept
}

/// Enumerate committed cache files across every partition.
///
/// Missing directories and files that vanish mid-walk are skipped.
async fn list_cache_files(root: &Path) -> Vec<CacheFile> {
    let mut files = Vec::new();

    for kind in ContentKind::ALL {
        let dir = kind_dir(root, kind);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    tracing::warn!(dir = %dir.display(), error = %e, "failed to list cache directory");
                }
                continue;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !is_cache_file(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else { continue };
            if !meta.is_file() {
                continue;
            }
            let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            files.push(CacheFile { path, kind, size: meta.len(), modified });
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FileConfig;
    use serde_json::json;
    use tempfile::TempDir;

    async fn make_backend(dir: &TempDir, compression: bool) -> FileBackend {
        let config = CacheConfig {
            file: FileConfig { root_dir: dir.path().to_path_buf(), max_size_mb: 1 },
            compression,
            ..Default::default()
        };
        let backend = FileBackend::new(config);
        backend.initialize().await.unwrap();
        backend
    }

    #[tokio::test]
    async fn test_initialize_creates_partitions() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;
        assert_eq!(backend.root(), dir.path());
        for kind in ContentKind::ALL {
            assert!(backend.root().join(kind.as_str()).is_dir());
        }
    }

    #[tokio::test]
    async fn test_round_trip_all_value_kinds() {
        for compression in [true, false] {
            let dir = TempDir::new().unwrap();
            let backend = make_backend(&dir, compression).await;

            let values = [
                CacheValue::Text("<h1>héllo</h1>".into()),
                CacheValue::Binary((0..=255u8).collect()),
                CacheValue::Path(PathBuf::from("/var/cache/page.html")),
                CacheValue::Structured(json!({"title": "T", "links": [{"href": "/a"}], "n": 3.5})),
            ];

            for (i, value) in values.into_iter().enumerate() {
                let key = format!("generic:{i}");
                assert!(backend.set(&key, value.clone(), None, ContentKind::Generic).await);
                let entry = backend.get(&key).await.unwrap();
                assert_eq!(entry.value, value);
                assert_eq!(entry.compressed, compression);
            }
        }
    }

    #[tokio::test]
    async fn test_mixed_compression_entries_readable() {
        let dir = TempDir::new().unwrap();
        let compressed = make_backend(&dir, true).await;
        assert!(compressed.set("a", "zipped".into(), None, ContentKind::Html).await);

        let plain = make_backend(&dir, false).await;
        assert!(plain.set("b", "plain".into(), None, ContentKind::Html).await);

        assert_eq!(plain.get("a").await.unwrap().value, CacheValue::Text("zipped".into()));
        assert_eq!(compressed.get("b").await.unwrap().value, CacheValue::Text("plain".into()));
    }

    #[tokio::test]
    async fn test_content_kind_routing() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        for kind in ContentKind::ALL {
            let key = format!("{kind}:routed");
            assert!(backend.set(&key, "x".into(), None, kind).await);
            assert!(backend.entry_path(&key, kind).exists());
            assert_eq!(backend.get(&key).await.unwrap().content_type, kind);
        }
    }

    #[tokio::test]
    async fn test_default_ttl_per_kind() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        backend.set("img", CacheValue::Binary(vec![1]), None, ContentKind::Image).await;
        assert_eq!(backend.get("img").await.unwrap().ttl, 604_800);

        backend.set("explicit", "x".into(), Some(5), ContentKind::Image).await;
        assert_eq!(backend.get("explicit").await.unwrap().ttl, 5);
    }

    #[tokio::test]
    async fn test_reset_under_new_kind_not_shadowed() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        backend.set("k", "old".into(), None, ContentKind::Html).await;
        backend.set("k", "new".into(), None, ContentKind::Generic).await;

        let entry = backend.get("k").await.unwrap();
        assert_eq!(entry.value, CacheValue::Text("new".into()));
        assert_eq!(entry.content_type, ContentKind::Generic);
        assert!(!backend.entry_path("k", ContentKind::Html).exists());
    }

    #[tokio::test]
    async fn test_unsafe_keys_map_to_safe_filenames() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        let long = "k".repeat(2000);
        let keys = ["with spaces", "../../etc/passwd", "ключ/юникод", long.as_str()];
        for key in keys {
            assert!(backend.set(key, key.into(), None, ContentKind::Generic).await);
            assert_eq!(backend.get(key).await.unwrap().value, CacheValue::Text(key.into()));
            let path = backend.entry_path(key, ContentKind::Generic);
            assert_eq!(path.parent().unwrap(), dir.path().join("generic"));
        }
    }

    #[tokio::test]
    async fn test_ttl_expiry_removes_file() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        backend.set("short", "v".into(), Some(1), ContentKind::Html).await;
        assert!(backend.get("short").await.is_some());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(backend.get("short").await.is_none());
        assert!(!backend.entry_path("short", ContentKind::Html).exists());
    }

    #[tokio::test]
    async fn test_non_positive_ttl_never_expires() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, false).await;

        backend.set("forever", "v".into(), Some(0), ContentKind::Generic).await;
        backend.set("forever-neg", "v".into(), Some(-1), ContentKind::Generic).await;

        for key in ["forever", "forever-neg"] {
            let path = backend.entry_path(key, ContentKind::Generic);
            let mut entry = codec::decode_entry(&std::fs::read(&path).unwrap()).unwrap();
            entry.created_at -= chrono::Duration::days(365);
            std::fs::write(&path, codec::encode_entry(&entry).unwrap()).unwrap();

            assert!(backend.get(key).await.is_some());
        }
    }

    #[tokio::test]
    async fn test_huge_ttl_reads_back() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        for (key, ttl) in [("max", i64::MAX), ("huge", 10_000_000_000_000)] {
            assert!(backend.set(key, "v".into(), Some(ttl), ContentKind::Html).await);
            let entry = backend.get(key).await.unwrap();
            assert_eq!(entry.ttl, ttl);
        }
        assert_eq!(backend.cleanup_expired().await, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        backend.set("doomed", "v".into(), None, ContentKind::Metadata).await;
        assert!(backend.delete("doomed").await);
        assert!(!backend.delete("doomed").await);
        assert!(backend.get("doomed").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_idempotent() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        for kind in ContentKind::ALL {
            backend.set(&format!("{kind}:1"), "v".into(), None, kind).await;
        }
        assert_eq!(backend.stats().await.total_entries, 5);

        assert!(backend.clear().await);
        assert!(backend.clear().await);

        let stats = backend.stats().await;
        assert_eq!(stats.total_entries, 0);
        assert_eq!(stats.counters.sets, 0);
    }

    #[tokio::test]
    async fn test_corrupted_entry_is_miss_and_cleaned() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        backend.set("bad", "v".into(), None, ContentKind::Html).await;
        backend.set("good", "v".into(), None, ContentKind::Html).await;
        let path = backend.entry_path("bad", ContentKind::Html);
        std::fs::write(&path, b"\x1f\x8bdefinitely not gzip").unwrap();

        assert!(backend.get("bad").await.is_none());
        assert_eq!(backend.stats().await.counters.errors, 1);

        assert_eq!(backend.cleanup_expired().await, 1);
        assert!(!path.exists());
        assert!(backend.get("good").await.is_some());
    }

    #[tokio::test]
    async fn test_cleanup_expired_removes_only_stale() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        backend.set("stale", "v".into(), Some(1), ContentKind::Generic).await;
        backend.set("fresh", "v".into(), Some(3600), ContentKind::Generic).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert_eq!(backend.cleanup_expired().await, 1);
        assert_eq!(backend.stats().await.total_entries, 1);
        assert!(backend.get("fresh").await.is_some());
    }

    #[tokio::test]
    async fn test_stats_counts_and_sizes() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, false).await;

        backend.set("html:1", "<p>1</p>".into(), None, ContentKind::Html).await;
        backend.set("html:2", "<p>2</p>".into(), None, ContentKind::Html).await;
        backend.set("robots:example.com", "User-agent: *".into(), None, ContentKind::Robots).await;
        backend.get("html:1").await;
        backend.get("missing").await;

        let stats = backend.stats().await;
        assert_eq!(stats.backend, "file");
        assert_eq!(stats.total_entries, 3);
        assert!(stats.total_size_bytes > 0);
        assert_eq!(stats.expired_entries, Some(0));
        assert_eq!(stats.counters.hits, 1);
        assert_eq!(stats.counters.misses, 1);
        assert_eq!(stats.counters.sets, 3);

        match stats.details {
            BackendDetails::File { entries_by_kind, .. } => {
                assert_eq!(entries_by_kind[&ContentKind::Html], 2);
                assert_eq!(entries_by_kind[&ContentKind::Robots], 1);
                assert_eq!(entries_by_kind[&ContentKind::Image], 0);
            }
            other => panic!("unexpected details: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stats_expiry_uses_mtime_and_default_ttl() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, false).await;

        // Per-entry TTL never expires, but the file is older than the global default.
        backend.set("old", "v".into(), Some(0), ContentKind::Generic).await;
        let path = backend.entry_path("old", ContentKind::Generic);
        let old = SystemTime::now() - Duration::from_secs(2 * 3600);
        std::fs::File::options().write(true).open(&path).unwrap().set_modified(old).unwrap();

        assert_eq!(backend.stats().await.expired_entries, Some(1));
        assert!(backend.get("old").await.is_some());
    }

    #[tokio::test]
    async fn test_size_enforcement_evicts_oldest_first() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, false).await;
        let payload = "x".repeat(100 * 1024);

        let keys: Vec<String> = (0..14).map(|i| format!("generic:{i}")).collect();
        for key in &keys {
            assert!(backend.set(key, payload.clone().into(), None, ContentKind::Generic).await);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        backend.enforce_size_limit().await;

        let limit = 1024 * 1024u64;
        let stats = backend.stats().await;
        assert!(stats.total_size_bytes <= (limit as f64 * EVICTION_TARGET_RATIO) as u64);
        assert!(stats.total_entries < keys.len() as u64);

        let present: Vec<bool> = keys.iter().map(|k| backend.entry_path(k, ContentKind::Generic).exists()).collect();
        let first_kept = present.iter().position(|p| *p).unwrap();
        assert!(first_kept > 0);
        assert!(present[first_kept..].iter().all(|p| *p), "newer entries evicted before older: {present:?}");
    }

    #[tokio::test]
    async fn test_size_enforced_after_set() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, false).await;
        let payload = "x".repeat(100 * 1024);
        let limit = 1024 * 1024u64;

        let keys: Vec<String> = (0..14).map(|i| format!("generic:{i}")).collect();
        for key in &keys {
            assert!(backend.set(key, payload.clone().into(), None, ContentKind::Generic).await);
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut settled = false;
        for _ in 0..100 {
            let idle = !backend.enforcer.running.load(Ordering::Acquire);
            if idle && backend.stats().await.total_size_bytes <= limit {
                settled = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(settled, "background enforcement never brought the cache under budget");

        assert!(backend.stats().await.total_entries < keys.len() as u64);
        assert!(!backend.entry_path(&keys[0], ContentKind::Generic).exists());
        assert!(backend.entry_path(&keys[13], ContentKind::Generic).exists());
    }

    #[tokio::test]
    async fn test_enforcement_requested_while_running_is_kept() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        backend.enforcer.running.store(true, Ordering::Release);
        assert_eq!(backend.enforcer.enforce_exclusive().await, 0);
        assert!(backend.enforcer.rerun.load(Ordering::Acquire));
        backend.enforcer.running.store(false, Ordering::Release);
    }

    #[tokio::test]
    async fn test_cleanup_sweeps_stale_tmp_files() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;

        let generic = dir.path().join("generic");
        let stale = generic.join("dead.cache.1-0.tmp");
        let fresh = generic.join("live.cache.1-1.tmp");
        std::fs::write(&stale, b"partial").unwrap();
        std::fs::write(&fresh, b"partial").unwrap();
        let old = SystemTime::now() - Duration::from_secs(2 * 3600);
        std::fs::File::options().write(true).open(&stale).unwrap().set_modified(old).unwrap();

        assert_eq!(backend.cleanup_expired().await, 0);
        assert!(!stale.exists());
        assert!(fresh.exists());
    }

    #[tokio::test]
    async fn test_size_enforcement_noop_under_budget() {
        let dir = TempDir::new().unwrap();
        let backend = make_backend(&dir, true).await;
        backend.set("small", "v".into(), None, ContentKind::Generic).await;
        assert_eq!(backend.enforce_size_limit().await, 0);
        assert!(backend.get("small").await.is_some());
    }

    #[tokio::test]
    async fn test_concurrent_writes_same_key() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(make_backend(&dir, true).await);

        let mut handles = Vec::new();
        for i in 0..16 {
            let backend = Arc::clone(&backend);
            handles.push(tokio::spawn(async move {
                backend.set("contended", format!("writer-{i}").into(), None, ContentKind::Html).await
            }));
        }
        for handle in handles {
            assert!(handle.await.unwrap());
        }

        let entry = backend.get("contended").await.unwrap();
        assert!(entry.value.as_text().unwrap().starts_with("writer-"));
        assert_eq!(backend.stats().await.total_entries, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_cross_kind_writes_keep_one_entry() {
        let dir = TempDir::new().unwrap();
        let backend = Arc::new(make_backend(&dir, true).await);

        for round in 0..100 {
            let key = format!("raced:{round}");
            let html = {
                let (backend, key) = (Arc::clone(&backend), key.clone());
                tokio::spawn(async move { backend.set(&key, "a".into(), None, ContentKind::Html).await })
            };
            let generic = {
                let (backend, key) = (Arc::clone(&backend), key.clone());
                tokio::spawn(async move { backend.set(&key, "b".into(), None, ContentKind::Generic).await })
            };
            assert!(html.await.unwrap());
            assert!(generic.await.unwrap());

            let entry = backend.get(&key).await.unwrap_or_else(|| panic!("entry lost in round {round}"));
            let expected = if entry.content_type == ContentKind::Html { "a" } else { "b" };
            assert_eq!(entry.value.as_text(), Some(expected));

            let copies = [ContentKind::Html, ContentKind::Generic]
                .into_iter()
                .filter(|kind| backend.entry_path(&key, *kind).exists())
                .count();
            assert_eq!(copies, 1);
        }
    }
}
