//! Parsed-configuration cache with file-change invalidation.
//!
//! Entries are keyed by absolute path and validated on every lookup against
//! TTL, file existence, modification time and content hash. Any failed check
//! removes the entry and reports a miss; staleness is never an error.

use super::Config;
use crate::core::AgentResult;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant, UNIX_EPOCH};

/// Default maximum number of cached configs
pub const DEFAULT_MAX_CACHE_SIZE: usize = 32;

/// Default entry time-to-live (1 hour)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;

/// Cache entry with validation and access tracking
struct ConfigCacheEntry {
    config: Config,
    file_hash: String,
    file_mtime: f64,
    cached_at: Instant,
    last_access: Instant,
    access_count: u64,
}

impl ConfigCacheEntry {
    /// In-memory configs carry sentinel hash/mtime and are invalidated by TTL only
    fn is_in_memory(&self) -> bool {
        self.file_hash.is_empty() && self.file_mtime == 0.0
    }
}

#[derive(Default)]
struct CacheCounters {
    hits: u64,
    misses: u64,
    invalidations: u64,
    evictions: u64,
}

struct CacheState {
    entries: HashMap<String, ConfigCacheEntry>,
    counters: CacheCounters,
}

/// Per-entry diagnostics reported by [`ConfigCache::stats`]
#[derive(Debug, Clone)]
pub struct CacheEntryInfo {
    pub file: String,
    pub access_count: u64,
    pub cache_age_secs: f64,
    pub last_access_secs_ago: f64,
}

/// Cache performance statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub cache_size: usize,
    pub max_cache_size: usize,
    pub hit_rate_percent: f64,
    pub total_hits: u64,
    pub total_misses: u64,
    pub invalidations: u64,
    pub evictions: u64,
    pub entries: Vec<CacheEntryInfo>,
}

/// Result of a proactive [`ConfigCache::optimize`] sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptimizeReport {
    pub stale_entries_removed: usize,
    pub remaining_entries: usize,
}

/// Caches parsed configuration files keyed by absolute path.
///
/// Thread-safe: the whole lookup-invalidate-insert sequence runs under one
/// lock, so concurrent callers cannot double-evict or overrun capacity.
pub struct ConfigCache {
    max_cache_size: usize,
    ttl: Duration,
    state: Mutex<CacheState>,
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CACHE_SIZE, DEFAULT_CACHE_TTL_SECS)
    }
}

impl ConfigCache {
    /// Create a cache with the given capacity and TTL in seconds
    pub fn new(max_cache_size: usize, ttl_secs: u64) -> Self {
        Self {
            max_cache_size,
            ttl: Duration::from_secs(ttl_secs),
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                counters: CacheCounters::default(),
            }),
        }
    }

    /// Get a cached config, or `None` if absent or invalidated.
    ///
    /// Validation order: TTL, file existence, mtime, content hash. The first
    /// failing check removes the entry and counts an invalidation plus a miss.
    pub fn get(&self, config_file: impl AsRef<Path>) -> Option<Config> {
        let key = cache_key(config_file.as_ref());
        let path = PathBuf::from(&key);
        let mut state = self.state.lock().unwrap();

        enum Verdict {
            Miss,
            Invalid,
            Valid,
        }

        let verdict = match state.entries.get(&key) {
            None => Verdict::Miss,
            Some(entry) => {
                if entry.cached_at.elapsed() > self.ttl {
                    Verdict::Invalid
                } else if entry.is_in_memory() {
                    Verdict::Valid
                } else if !path.exists() {
                    Verdict::Invalid
                } else if file_mtime(&path).unwrap_or(0.0) != entry.file_mtime {
                    Verdict::Invalid
                } else if compute_file_hash(&path) != entry.file_hash {
                    Verdict::Invalid
                } else {
                    Verdict::Valid
                }
            }
        };

        match verdict {
            Verdict::Miss => {
                state.counters.misses += 1;
                None
            }
            Verdict::Invalid => Self::invalidate(&mut state, &key),
            Verdict::Valid => {
                let entry = state.entries.get_mut(&key)?;
                entry.access_count += 1;
                entry.last_access = Instant::now();
                let config = entry.config.clone();
                state.counters.hits += 1;
                Some(config)
            }
        }
    }

    /// Insert a parsed config for the given path.
    ///
    /// Hash and mtime are taken from the file if it exists; otherwise the
    /// entry is treated as in-memory and expires only by TTL. At capacity the
    /// entry with the oldest last access is evicted first.
    pub fn insert(&self, config_file: impl AsRef<Path>, config: Config) {
        let key = cache_key(config_file.as_ref());
        let path = PathBuf::from(&key);

        let (file_hash, file_mtime) = if path.exists() {
            (compute_file_hash(&path), file_mtime(&path).unwrap_or(0.0))
        } else {
            (String::new(), 0.0)
        };

        let now = Instant::now();
        let entry = ConfigCacheEntry {
            config,
            file_hash,
            file_mtime,
            cached_at: now,
            last_access: now,
            access_count: 1,
        };

        let mut state = self.state.lock().unwrap();
        if state.entries.len() >= self.max_cache_size && !state.entries.contains_key(&key) {
            Self::evict_oldest(&mut state);
        }
        state.entries.insert(key, entry);
    }

    /// Get-or-load convenience: cached config if valid, otherwise parse the
    /// file fresh and cache the result.
    pub fn load_cached(&self, config_file: impl AsRef<Path>) -> AgentResult<Config> {
        let path = config_file.as_ref();
        if let Some(config) = self.get(path) {
            return Ok(config);
        }

        let config = Config::from_file(path)?;
        self.insert(path, config.clone());
        Ok(config)
    }

    /// Remove entries older than TTL or idle for more than TTL/2.
    ///
    /// The idle check is an eagerness heuristic to keep memory low between
    /// lookups.
    pub fn optimize(&self) -> OptimizeReport {
        let mut state = self.state.lock().unwrap();
        let idle_limit = self.ttl / 2;
        let stale: Vec<String> = state
            .entries
            .iter()
            .filter(|(_, e)| e.cached_at.elapsed() > self.ttl || e.last_access.elapsed() > idle_limit)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &stale {
            state.entries.remove(key);
        }

        let report = OptimizeReport {
            stale_entries_removed: stale.len(),
            remaining_entries: state.entries.len(),
        };
        log::debug!(
            "Config cache sweep: removed {}, {} remaining",
            report.stale_entries_removed,
            report.remaining_entries
        );
        report
    }

    /// Clear all cached configurations
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.entries.clear();
    }

    /// Current number of cached entries
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cache performance statistics with per-entry diagnostics
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock().unwrap();
        let c = &state.counters;
        let total = c.hits + c.misses;
        let hit_rate_percent = if total == 0 {
            0.0
        } else {
            c.hits as f64 / total as f64 * 100.0
        };

        let entries = state
            .entries
            .iter()
            .map(|(key, entry)| CacheEntryInfo {
                file: key.clone(),
                access_count: entry.access_count,
                cache_age_secs: entry.cached_at.elapsed().as_secs_f64(),
                last_access_secs_ago: entry.last_access.elapsed().as_secs_f64(),
            })
            .collect();

        CacheStats {
            cache_size: state.entries.len(),
            max_cache_size: self.max_cache_size,
            hit_rate_percent,
            total_hits: c.hits,
            total_misses: c.misses,
            invalidations: c.invalidations,
            evictions: c.evictions,
            entries,
        }
    }

    fn invalidate(state: &mut CacheState, key: &str) -> Option<Config> {
        state.entries.remove(key);
        state.counters.invalidations += 1;
        state.counters.misses += 1;
        None
    }

    fn evict_oldest(state: &mut CacheState) {
        let oldest = state
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_access)
            .map(|(k, _)| k.clone());

        if let Some(key) = oldest {
            state.entries.remove(&key);
            state.counters.evictions += 1;
        }
    }
}

/// Canonical cache key for a config path
fn cache_key(path: &Path) -> String {
    path.canonicalize()
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// File modification time as seconds since the epoch
fn file_mtime(path: &Path) -> Option<f64> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_secs_f64())
}

/// SHA-256 of the file content, hex encoded.
///
/// I/O failure resolves to an empty hash rather than an error so the next
/// validation deterministically misses instead of crashing the lookup path.
fn compute_file_hash(path: &Path) -> String {
    match std::fs::read(path) {
        Ok(bytes) => {
            let mut hasher = Sha256::new();
            hasher.update(&bytes);
            format!("{:x}", hasher.finalize())
        }
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn sample_config(provider: &str) -> Config {
        Config {
            default_provider: provider.to_string(),
            max_steps: 10,
            enable_summary: false,
            model_providers: HashMap::new(),
            summary_model: None,
        }
    }

    fn write_config_file(dir: &tempfile::TempDir, name: &str, provider: &str) -> PathBuf {
        let path = dir.path().join(name);
        let config = sample_config(provider);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(serde_json::to_string(&config).unwrap().as_bytes())
            .unwrap();
        path
    }

    #[test]
    fn test_repeated_hits_increase_access_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config_file(&dir, "config.json", "openai");
        let cache = ConfigCache::default();
        cache.insert(&path, sample_config("openai"));

        assert!(cache.get(&path).is_some());
        assert!(cache.get(&path).is_some());
        assert!(cache.get(&path).is_some());

        let stats = cache.stats();
        assert_eq!(stats.total_hits, 3);
        assert_eq!(stats.entries[0].access_count, 4); // insert counts the first access
    }

    #[test]
    fn test_content_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config_file(&dir, "config.json", "openai");
        let cache = ConfigCache::default();
        cache.insert(&path, sample_config("openai"));
        assert!(cache.get(&path).is_some());

        // Rewriting the file changes hash and mtime
        std::thread::sleep(Duration::from_millis(20));
        std::fs::write(
            &path,
            serde_json::to_string(&sample_config("anthropic")).unwrap(),
        )
        .unwrap();

        assert!(cache.get(&path).is_none());
        let stats = cache.stats();
        assert_eq!(stats.invalidations, 1);
        assert_eq!(stats.cache_size, 0);
    }

    #[test]
    fn test_mtime_bump_without_content_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config_file(&dir, "config.json", "openai");
        let cache = ConfigCache::default();
        cache.insert(&path, sample_config("openai"));

        // Same bytes, new mtime
        std::thread::sleep(Duration::from_millis(20));
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, bytes).unwrap();

        assert!(cache.get(&path).is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_missing_file_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config_file(&dir, "config.json", "openai");
        let cache = ConfigCache::default();
        cache.insert(&path, sample_config("openai"));

        std::fs::remove_file(&path).unwrap();
        assert!(cache.get(&path).is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_in_memory_config_survives_content_checks() {
        let cache = ConfigCache::default();
        // No backing file: sentinel hash/mtime, TTL-only invalidation
        cache.insert("/virtual/in_memory.json", sample_config("openai"));
        assert!(cache.get("/virtual/in_memory.json").is_some());
        assert!(cache.get("/virtual/in_memory.json").is_some());
    }

    #[test]
    fn test_ttl_expiry_invalidates() {
        let cache = ConfigCache::new(32, 0); // everything expires immediately
        cache.insert("/virtual/in_memory.json", sample_config("openai"));
        std::thread::sleep(Duration::from_millis(10));
        assert!(cache.get("/virtual/in_memory.json").is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let dir = tempfile::tempdir().unwrap();
        let a = write_config_file(&dir, "a.json", "openai");
        let b = write_config_file(&dir, "b.json", "anthropic");
        let c = write_config_file(&dir, "c.json", "google");

        let cache = ConfigCache::new(2, 3600);
        cache.insert(&a, sample_config("openai"));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(&b, sample_config("anthropic"));
        std::thread::sleep(Duration::from_millis(5));
        cache.insert(&c, sample_config("google")); // evicts a (oldest last access)

        assert!(cache.get(&a).is_none());
        assert!(cache.get(&b).is_some());
        assert!(cache.get(&c).is_some());
        let stats = cache.stats();
        assert_eq!(stats.evictions, 1);
        assert!(stats.cache_size <= 2);
    }

    #[test]
    fn test_capacity_never_exceeded() {
        let cache = ConfigCache::new(3, 3600);
        for i in 0..10 {
            cache.insert(format!("/virtual/{i}.json"), sample_config("openai"));
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.stats().evictions, 7);
    }

    #[test]
    fn test_load_cached_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let config = sample_config("openai");
        let path = dir.path().join("config.json");
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();

        let cache = ConfigCache::default();
        let loaded = cache.load_cached(&path).unwrap();
        assert_eq!(loaded, config);

        // Second load is a hit
        let again = cache.load_cached(&path).unwrap();
        assert_eq!(again, config);
        assert_eq!(cache.stats().total_hits, 1);
    }

    #[test]
    fn test_optimize_removes_idle_entries() {
        let cache = ConfigCache::new(32, 0);
        cache.insert("/virtual/a.json", sample_config("openai"));
        std::thread::sleep(Duration::from_millis(10));
        let report = cache.optimize();
        assert_eq!(report.stale_entries_removed, 1);
        assert_eq!(report.remaining_entries, 0);
    }
}
