//! Content-addressed memoization cache.
//!
//! Keys are hashed with SHA-256 over their serde_json encoding. A key that is
//! absent, or that cannot be serialized, bypasses the cache. The cache holds at
//! most `max_entries` values and evicts the oldest first. With a directory,
//! every value is also written to `<hash>.json` so entries survive reopening.

use std::collections::{HashMap, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use log::{debug, trace, warn};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sha2::{Digest, Sha256};

/// Cache storage errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Cache lock was poisoned")]
    Poisoned,
}

struct CacheState<V> {
    entries: HashMap<String, V>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

/// Size-bounded memo table, safe to share between threads.
pub struct Memoizer<V> {
    max_entries: usize,
    dir: Option<PathBuf>,
    state: Mutex<CacheState<V>>,
}

/// Hex SHA-256 digest of the JSON encoding of `key`.
pub fn key_hash<K: Serialize + ?Sized>(key: &K) -> Option<String> {
    let encoded = serde_json::to_vec(key).ok()?;
    let mut hasher = Sha256::new();
    hasher.update(&encoded);
    Some(format!("{:x}", hasher.finalize()))
}

impl<V> Memoizer<V>
where
    V: Clone + Serialize + DeserializeOwned,
{
    /// Memory-only cache.
    pub fn in_memory(max_entries: usize) -> Self {
        Self {
            max_entries,
            dir: None,
            state: Mutex::new(CacheState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Cache persisted under `dir`. Entries already present there are
    /// indexed oldest first and loaded on demand.
    pub fn open(max_entries: usize, dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;

        let mut existing = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                let modified = entry.metadata()?.modified()?;
                existing.push((modified, stem.to_string()));
            }
        }
        existing.sort();
        debug!("Opened memo cache at {} with {} entries", dir.display(), existing.len());

        let cache = Self::in_memory(max_entries);
        {
            let mut state = cache.lock()?;
            state.order = existing.into_iter().map(|(_, hash)| hash).collect();
        }
        let cache = Self {
            dir: Some(dir),
            ..cache
        };
        cache.evict_overflow()?;
        Ok(cache)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, CacheState<V>>, CacheError> {
        self.state.lock().map_err(|_| CacheError::Poisoned)
    }

    fn entry_path(&self, hash: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|d| d.join(format!("{hash}.json")))
    }

    /// Cached value for `key`, if any.
    pub fn get<K: Serialize + ?Sized>(&self, key: &K) -> Result<Option<V>, CacheError> {
        let Some(hash) = key_hash(key) else {
            return Ok(None);
        };
        self.get_hashed(&hash)
    }

    fn get_hashed(&self, hash: &str) -> Result<Option<V>, CacheError> {
        let mut state = self.lock()?;
        if let Some(value) = state.entries.get(hash).cloned() {
            state.hits += 1;
            return Ok(Some(value));
        }
        if state.order.iter().any(|h| h == hash)
            && let Some(path) = self.entry_path(hash)
            && path.exists()
        {
            let value: V = serde_json::from_str(&fs::read_to_string(&path)?)?;
            state.entries.insert(hash.to_string(), value.clone());
            state.hits += 1;
            return Ok(Some(value));
        }
        state.misses += 1;
        Ok(None)
    }

    /// Store `value` under `key`. Keys that cannot be serialized are ignored.
    pub fn insert<K: Serialize + ?Sized>(&self, key: &K, value: V) -> Result<(), CacheError> {
        match key_hash(key) {
            Some(hash) => self.insert_hashed(hash, value),
            None => Ok(()),
        }
    }

    fn insert_hashed(&self, hash: String, value: V) -> Result<(), CacheError> {
        if self.max_entries == 0 {
            return Ok(());
        }
        if let Some(path) = self.entry_path(&hash) {
            fs::write(&path, serde_json::to_string(&value)?)?;
        }
        {
            let mut state = self.lock()?;
            if !state.order.iter().any(|h| *h == hash) {
                state.order.push_back(hash.clone());
            }
            state.entries.insert(hash, value);
        }
        self.evict_overflow()
    }

    fn evict_overflow(&self) -> Result<(), CacheError> {
        let mut state = self.lock()?;
        while state.order.len() > self.max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            if let Some(path) = self.entry_path(&oldest)
                && path.exists()
                && let Err(e) = fs::remove_file(&path)
            {
                warn!("Failed to remove evicted cache entry {}: {}", path.display(), e);
            }
            trace!("Evicted cache entry {oldest}");
        }
        Ok(())
    }

    /// Return the cached value for `key` or compute and store it. `None`
    /// keys and unserializable keys always compute.
    pub fn get_or_compute<K, F, E>(&self, key: Option<&K>, compute: F) -> Result<V, E>
    where
        K: Serialize + ?Sized,
        F: FnOnce() -> Result<V, E>,
        E: From<CacheError>,
    {
        let Some(hash) = key.and_then(key_hash) else {
            return compute();
        };
        if let Some(value) = self.get_hashed(&hash)? {
            return Ok(value);
        }
        let value = compute()?;
        self.insert_hashed(hash, value.clone())?;
        Ok(value)
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.lock().map(|s| s.order.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (hits, misses) since creation.
    pub fn counters(&self) -> (u64, u64) {
        self.lock().map(|s| (s.hits, s.misses)).unwrap_or((0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn compute(counter: &Cell<usize>, value: f64) -> Result<f64, CacheError> {
        counter.set(counter.get() + 1);
        Ok(value)
    }

    #[test]
    fn test_hit_returns_stored_value() {
        let cache = Memoizer::<f64>::in_memory(10);
        let calls = Cell::new(0);
        let a = cache.get_or_compute(Some("tree-a"), || compute(&calls, 1.5)).unwrap();
        let b = cache.get_or_compute(Some("tree-a"), || compute(&calls, 9.0)).unwrap();
        assert_eq!((a, b), (1.5, 1.5));
        assert_eq!(calls.get(), 1);
        assert_eq!(cache.counters(), (1, 1));
    }

    #[test]
    fn test_absent_key_bypasses() {
        let cache = Memoizer::<f64>::in_memory(10);
        let calls = Cell::new(0);
        for _ in 0..3 {
            cache.get_or_compute::<str, _, _>(None, || compute(&calls, 2.0)).unwrap();
        }
        assert_eq!(calls.get(), 3);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unserializable_key_bypasses() {
        let mut key = HashMap::new();
        key.insert(vec![1u8], 1);
        assert!(key_hash(&key).is_none());

        let cache = Memoizer::<f64>::in_memory(10);
        let calls = Cell::new(0);
        cache.get_or_compute(Some(&key), || compute(&calls, 1.0)).unwrap();
        cache.get_or_compute(Some(&key), || compute(&calls, 1.0)).unwrap();
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_evicts_oldest() {
        let cache = Memoizer::<f64>::in_memory(2);
        cache.insert("a", 1.0).unwrap();
        cache.insert("b", 2.0).unwrap();
        cache.insert("c", 3.0).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap(), None);
        assert_eq!(cache.get("c").unwrap(), Some(3.0));
    }

    #[test]
    fn test_disk_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let cache = Memoizer::<Vec<f64>>::open(5, dir.path()).unwrap();
            cache.insert("((a,b),c);", vec![1.0, 2.0]).unwrap();
        }
        let reopened = Memoizer::<Vec<f64>>::open(5, dir.path()).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get("((a,b),c);").unwrap(), Some(vec![1.0, 2.0]));
    }

    #[test]
    fn test_disk_eviction_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Memoizer::<f64>::open(1, dir.path()).unwrap();
        cache.insert("first", 1.0).unwrap();
        cache.insert("second", 2.0).unwrap();
        let files = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }
}
