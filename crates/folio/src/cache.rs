use crate::dotpath::DotPath;
use crate::error::{IoContext, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

pub const COLLECTION_STORE: &str = "collection";
pub const MARKDOWN_STORE: &str = "markdown";
pub const GLOBAL_STORE: &str = "global";

/// Key/value store addressed by dotted keys whose first segment names the
/// store (`collection.posts`, `markdown.posts.hello.md`).
///
/// Reads may happen from many request contexts at once. Population is
/// check-then-write, so two contexts racing on the same miss both compute
/// and the last `put` wins.
pub trait KeyedCache: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    /// Stores `value`; a `ttl` of zero never expires.
    fn put(&self, key: &str, value: Value, ttl: u64) -> Result<()>;

    fn forget(&self, key: &str);

    fn created(&self, key: &str) -> Option<DateTime<Utc>>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRecord {
    pub created: DateTime<Utc>,
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    pub value: Value,
}

impl CacheRecord {
    pub fn new(value: Value, ttl: u64) -> Self {
        let created = Utc::now();
        let expires = if ttl == 0 {
            None
        } else {
            i64::try_from(ttl)
                .ok()
                .and_then(Duration::try_seconds)
                .map(|lifetime| created + lifetime)
        };
        Self {
            created,
            expires,
            value,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires <= Utc::now())
    }
}

/// Records persisted as JSON files under `<root>/<store>/<sha256(rest)>.json`.
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &str) -> PathBuf {
        let path = DotPath::parse(key);
        let mut hasher = Sha256::new();
        hasher.update(path.rest().unwrap_or("_").as_bytes());
        let digest = hasher.finalize();
        self.root
            .join(path.head())
            .join(format!("{:x}.json", digest))
    }

    fn read_record(&self, key: &str) -> Option<CacheRecord> {
        let record_path = self.record_path(key);
        let content = fs::read_to_string(&record_path).ok()?;
        match serde_json::from_str::<CacheRecord>(&content) {
            Ok(record) if record.is_expired() => {
                tracing::debug!(key, "cache record expired");
                let _ = fs::remove_file(&record_path);
                None
            }
            Ok(record) => Some(record),
            Err(error) => {
                tracing::warn!(key, %error, "discarding unreadable cache record");
                let _ = fs::remove_file(&record_path);
                None
            }
        }
    }

    /// Removes every record in every store.
    pub fn clear(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).io_context("clearing cache", &self.root)?;
        }
        Ok(())
    }
}

impl KeyedCache for FileCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.read_record(key).map(|record| record.value)
    }

    fn put(&self, key: &str, value: Value, ttl: u64) -> Result<()> {
        let record_path = self.record_path(key);
        if let Some(parent) = record_path.parent() {
            fs::create_dir_all(parent).io_context("creating cache store", parent)?;
        }

        let record = CacheRecord::new(value, ttl);
        let content = serde_json::to_string(&record)
            .map_err(|error| std::io::Error::other(error.to_string()))?;

        // Readers only ever see complete records: write aside, then rename.
        let staging = record_path.with_extension(format!("json.{}.tmp", std::process::id()));
        fs::write(&staging, content).io_context("writing cache record", &staging)?;
        fs::rename(&staging, &record_path).io_context("storing cache record", &record_path)?;
        Ok(())
    }

    fn forget(&self, key: &str) {
        let _ = fs::remove_file(self.record_path(key));
    }

    fn created(&self, key: &str) -> Option<DateTime<Utc>> {
        self.read_record(key).map(|record| record.created)
    }
}

/// In-process store; lookups clone the value out from under a read lock.
#[derive(Default)]
pub struct MemoryCache {
    records: RwLock<HashMap<String, CacheRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stores a record with an explicit creation time.
    pub fn put_record(&self, key: &str, record: CacheRecord) {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(key.to_string(), record);
    }

    fn live_record(&self, key: &str) -> Option<CacheRecord> {
        let record = self
            .records
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .cloned()?;
        if record.is_expired() {
            self.forget(key);
            return None;
        }
        Some(record)
    }
}

impl KeyedCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Value> {
        self.live_record(key).map(|record| record.value)
    }

    fn put(&self, key: &str, value: Value, ttl: u64) -> Result<()> {
        self.put_record(key, CacheRecord::new(value, ttl));
        Ok(())
    }

    fn forget(&self, key: &str) {
        self.records
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(key);
    }

    fn created(&self, key: &str) -> Option<DateTime<Utc>> {
        self.live_record(key).map(|record| record.created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_file_cache_put_and_get() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path());

        cache
            .put("collection.posts", json!({"a.md": {"title": "A"}}), 0)
            .unwrap();

        let value = cache.get("collection.posts").unwrap();
        assert_eq!(value["a.md"]["title"], "A");
        assert!(cache.created("collection.posts").is_some());
    }

    #[test]
    fn test_file_cache_separates_stores() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path());

        cache.put("collection.posts", json!(1), 0).unwrap();
        cache.put("markdown.posts", json!(2), 0).unwrap();

        assert_eq!(cache.get("collection.posts"), Some(json!(1)));
        assert_eq!(cache.get("markdown.posts"), Some(json!(2)));
        assert!(dir.path().join("collection").is_dir());
        assert!(dir.path().join("markdown").is_dir());
    }

    #[test]
    fn test_file_cache_forget() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path());

        cache.put("markdown.about.md", json!("x"), 0).unwrap();
        cache.forget("markdown.about.md");

        assert!(cache.get("markdown.about.md").is_none());
        assert!(cache.created("markdown.about.md").is_none());
    }

    #[test]
    fn test_file_cache_corrupt_record_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = FileCache::new(dir.path());

        cache.put("collection.posts", json!({}), 0).unwrap();
        let record_path = cache.record_path("collection.posts");
        fs::write(&record_path, "{ not json").unwrap();

        assert!(cache.get("collection.posts").is_none());
        assert!(!record_path.exists());
    }

    #[test]
    fn test_file_cache_clear() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("cache");
        let cache = FileCache::new(&root);

        cache.put("global.home", json!("<html>"), 0).unwrap();
        cache.clear().unwrap();

        assert!(!root.exists());
        assert!(cache.get("global.home").is_none());
    }

    #[test]
    fn test_expired_record_is_a_miss() {
        let cache = MemoryCache::new();
        cache.put_record(
            "global.home",
            CacheRecord {
                created: Utc::now() - Duration::seconds(120),
                expires: Some(Utc::now() - Duration::seconds(60)),
                value: json!("stale"),
            },
        );

        assert!(cache.get("global.home").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_ttl_sets_expiry() {
        let record = CacheRecord::new(json!(1), 60);
        let expires = record.expires.unwrap();
        assert_eq!((expires - record.created).num_seconds(), 60);
        assert!(!record.is_expired());

        assert!(CacheRecord::new(json!(1), 0).expires.is_none());
    }

    #[test]
    fn test_memory_cache_round_trip() {
        let cache = MemoryCache::new();
        cache.put("collection.posts", json!({"a.md": {}}), 0).unwrap();

        assert_eq!(cache.len(), 1);
        assert!(cache.get("collection.posts").is_some());

        cache.forget("collection.posts");
        assert!(cache.get("collection.posts").is_none());
    }
}
