//! Content-hash-keyed store for derived per-module metadata.
//!
//! Entries are valid only while a freshly computed hash of the underlying
//! source matches the stored hash; lookups never trust an entry without
//! re-validating. Persistence is best-effort: every disk failure is swallowed
//! with a debug line, because losing the cache costs performance, never
//! correctness. Deleting the cache directory at any time is safe.
//!
//! The store is injected (`Arc<CacheStore>`) into whatever needs it; there is
//! no global instance. Concurrent use from both sub-compilers is safe since
//! entries are content-addressed and effectively immutable under a given
//! hash, so racing writers produce an idempotent overwrite.

use std::fs;
use std::path::{Path, PathBuf};

use dashmap::DashMap;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::debug;
use crate::hash::{self, ContentHash};

/// A validated cache entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub content_hash: ContentHash,
    pub value: V,
}

/// On-disk and in-memory representation: hex hash + raw JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    hash: String,
    value: serde_json::Value,
}

/// Content-hash-keyed store with best-effort JSON persistence.
pub struct CacheStore {
    /// Cache directory; `None` disables persistence (tests, ephemeral use).
    dir: Option<PathBuf>,
    entries: DashMap<String, StoredEntry>,
}

impl CacheStore {
    /// Open a store backed by a cache directory.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = fs::create_dir_all(&dir) {
            debug!("cache"; "cannot create {}: {}", dir.display(), e);
        }
        Self {
            dir: Some(dir),
            entries: DashMap::new(),
        }
    }

    /// Open an in-memory store with no persistence.
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            entries: DashMap::new(),
        }
    }

    /// Fetch an entry, consulting disk on an in-memory miss.
    pub fn get<V: DeserializeOwned>(&self, key: &str) -> Option<CacheEntry<V>> {
        if let Some(stored) = self.entries.get(key) {
            return Self::decode(&stored);
        }

        let stored = self.load_from_disk(key)?;
        let decoded = Self::decode(&stored);
        self.entries.insert(key.to_string(), stored);
        decoded
    }

    /// Store an entry and persist it best-effort.
    pub fn put<V: Serialize>(&self, key: &str, content_hash: ContentHash, value: &V) {
        let raw = match serde_json::to_value(value) {
            Ok(raw) => raw,
            Err(e) => {
                debug!("cache"; "cannot encode {}: {}", key, e);
                return;
            }
        };
        let stored = StoredEntry {
            hash: content_hash.to_hex(),
            value: raw,
        };
        self.persist(key, &stored);
        self.entries.insert(key.to_string(), stored);
    }

    /// Validate-or-recompute protocol.
    ///
    /// The caller supplies a freshly computed hash of the current source.
    /// A stored entry with a matching hash is a hit; anything else recomputes
    /// and overwrites.
    pub fn lookup<V, E>(
        &self,
        key: &str,
        current_hash: ContentHash,
        compute: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E>
    where
        V: Serialize + DeserializeOwned,
    {
        if let Some(entry) = self.get::<V>(key)
            && entry.content_hash == current_hash
        {
            return Ok(entry.value);
        }

        let value = compute()?;
        self.put(key, current_hash, &value);
        Ok(value)
    }

    /// Drop everything in memory (the next lookup falls back to disk).
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn decode<V: DeserializeOwned>(stored: &StoredEntry) -> Option<CacheEntry<V>> {
        let content_hash = ContentHash::from_hex(&stored.hash)?;
        let value = serde_json::from_value(stored.value.clone()).ok()?;
        Some(CacheEntry {
            content_hash,
            value,
        })
    }

    fn key_file(&self, key: &str) -> Option<PathBuf> {
        self.dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", hash::fingerprint_long(key))))
    }

    fn load_from_disk(&self, key: &str) -> Option<StoredEntry> {
        let path = self.key_file(key)?;
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!("cache"; "read {} failed: {}", path.display(), e);
                }
                return None;
            }
        };
        match serde_json::from_str(&content) {
            Ok(stored) => Some(stored),
            Err(e) => {
                debug!("cache"; "corrupt entry {}: {}", path.display(), e);
                None
            }
        }
    }

    fn persist(&self, key: &str, stored: &StoredEntry) {
        let Some(path) = self.key_file(key) else {
            return;
        };
        let json = match serde_json::to_string(stored) {
            Ok(json) => json,
            Err(e) => {
                debug!("cache"; "encode {} failed: {}", key, e);
                return;
            }
        };
        if let Err(e) = fs::write(&path, json) {
            debug!("cache"; "write {} failed: {}", path.display(), e);
        }
    }
}

/// Cache key for a module's declared exports.
pub fn exports_key(module_id: &str) -> String {
    format!("module:{module_id}.exports")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[test]
    fn test_get_put_roundtrip() {
        let store = CacheStore::in_memory();
        let hash = hash_bytes(b"source");
        store.put("module:a.exports", hash, &vec!["default".to_string()]);

        let entry = store.get::<Vec<String>>("module:a.exports").unwrap();
        assert_eq!(entry.content_hash, hash);
        assert_eq!(entry.value, vec!["default".to_string()]);
    }

    #[test]
    fn test_lookup_hit_skips_recompute() {
        let store = CacheStore::in_memory();
        let hash = hash_bytes(b"source");
        store.put("k", hash, &1u32);

        let computed = Cell::new(false);
        let value: u32 = store
            .lookup("k", hash, || -> Result<u32, ()> {
                computed.set(true);
                Ok(2)
            })
            .unwrap();
        assert_eq!(value, 1);
        assert!(!computed.get(), "matching hash must not recompute");
    }

    #[test]
    fn test_lookup_mismatch_recomputes_and_overwrites() {
        let store = CacheStore::in_memory();
        store.put("k", hash_bytes(b"old"), &1u32);

        let fresh = hash_bytes(b"new");
        let value: u32 = store.lookup("k", fresh, || -> Result<u32, ()> { Ok(2) }).unwrap();
        assert_eq!(value, 2);

        let entry = store.get::<u32>("k").unwrap();
        assert_eq!(entry.content_hash, fresh);
        assert_eq!(entry.value, 2);
    }

    #[test]
    fn test_lookup_miss_computes() {
        let store = CacheStore::in_memory();
        let value: u32 = store
            .lookup("absent", hash_bytes(b"x"), || -> Result<u32, ()> { Ok(9) })
            .unwrap();
        assert_eq!(value, 9);
    }

    #[test]
    fn test_persistence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let hash = hash_bytes(b"source");
        {
            let store = CacheStore::open(dir.path());
            store.put("module:a.exports", hash, &vec!["render".to_string()]);
        }

        let store = CacheStore::open(dir.path());
        let entry = store.get::<Vec<String>>("module:a.exports").unwrap();
        assert_eq!(entry.value, vec!["render".to_string()]);
    }

    #[test]
    fn test_corrupt_disk_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let store = CacheStore::open(dir.path());
        let file = dir
            .path()
            .join(format!("{}.json", hash::fingerprint_long("k")));
        std::fs::write(&file, "not json").unwrap();

        assert!(store.get::<u32>("k").is_none());
    }

    #[test]
    fn test_unwritable_dir_never_fails() {
        let store = CacheStore::open("/nonexistent/kiln-cache");
        store.put("k", hash_bytes(b"x"), &1u32);
        // In-memory copy still works
        assert_eq!(store.get::<u32>("k").unwrap().value, 1);
    }

    #[test]
    fn test_exports_key() {
        assert_eq!(exports_key("route:/home"), "module:route:/home.exports");
    }
}
