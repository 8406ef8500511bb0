use crate::cache::{COLLECTION_STORE, KeyedCache};
use crate::dotpath::dotted;
use crate::parsing::MarkdownConverter;
use crate::types::Meta;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

const ROOT_FOLDER_KEY: &str = "_root";

/// Front matter of every Markdown file in one folder, keyed by full path.
pub type FileMap = BTreeMap<PathBuf, Meta>;

/// Scans one content folder (non-recursively) for Markdown files and
/// remembers their front matter in the `collection` cache store.
pub struct Locator {
    content_dir: PathBuf,
    cache: Arc<dyn KeyedCache>,
    converter: Arc<dyn MarkdownConverter>,
    exclude: Vec<String>,
    ttl: u64,
}

impl Locator {
    pub fn new(
        content_dir: impl AsRef<Path>,
        cache: Arc<dyn KeyedCache>,
        converter: Arc<dyn MarkdownConverter>,
    ) -> Self {
        Self {
            content_dir: content_dir.as_ref().to_path_buf(),
            cache,
            converter,
            exclude: Vec::new(),
            ttl: 0,
        }
    }

    /// Front-matter keys left out of the cached snapshot.
    pub fn exclude(mut self, keys: &[String]) -> Self {
        self.exclude = keys.to_vec();
        self
    }

    pub fn ttl(mut self, ttl: u64) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn cache_key(folder: &str) -> String {
        let folder = dotted(folder);
        if folder.is_empty() {
            format!("{}.{}", COLLECTION_STORE, ROOT_FOLDER_KEY)
        } else {
            format!("{}.{}", COLLECTION_STORE, folder)
        }
    }

    /// True when `folder` names a folder at or below the content root.
    /// Empty, `.` and `..` segments are refused; the empty folder is the root.
    pub fn is_contained(folder: &str) -> bool {
        let folder = folder.trim_matches('/');
        folder.is_empty()
            || folder
                .split(['/', '\\'])
                .all(|segment| !matches!(segment, "" | "." | ".."))
    }

    pub fn all(&self, folder: &str) -> FileMap {
        let folder = folder.trim_matches('/');
        if !Self::is_contained(folder) {
            tracing::warn!(folder, "refusing folder outside the content root");
            return FileMap::new();
        }

        let directory = self.content_dir.join(folder);
        let key = Self::cache_key(folder);

        if let Some(cached) = self.cache.get(&key) {
            if let Some(files) = Self::from_cached(&directory, cached) {
                tracing::debug!(folder, files = files.len(), "locator cache hit");
                return files;
            }
            tracing::warn!(folder, "discarding malformed locator cache entry");
            self.cache.forget(&key);
        }

        if !directory.is_dir() {
            return FileMap::new();
        }

        let snapshot = self.scan(&directory);
        tracing::debug!(folder, files = snapshot.len(), "scanned content folder");

        let value = Value::Object(
            snapshot
                .iter()
                .map(|(filename, meta)| (filename.clone(), meta.to_value()))
                .collect(),
        );
        if let Err(error) = self.cache.put(&key, value, self.ttl) {
            tracing::warn!(folder, %error, "failed to cache folder scan");
        }

        snapshot
            .into_iter()
            .map(|(filename, meta)| (directory.join(filename), meta))
            .collect()
    }

    /// Evicts the cached scan of `folder`.
    pub fn forget(&self, folder: &str) {
        self.cache.forget(&Self::cache_key(folder.trim_matches('/')));
    }

    fn scan(&self, directory: &Path) -> BTreeMap<String, Meta> {
        let mut snapshot = BTreeMap::new();

        for entry in WalkDir::new(directory)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(error) => {
                    tracing::warn!(directory = %directory.display(), %error, "skipping unreadable entry");
                    continue;
                }
            };

            let path = entry.path();

            if !entry.file_type().is_file() {
                continue;
            }

            if path
                .extension()
                .map(|extension| extension != "md")
                .unwrap_or(true)
            {
                continue;
            }

            let raw = match fs::read_to_string(path) {
                Ok(raw) => raw,
                Err(error) => {
                    tracing::warn!(path = %path.display(), %error, "skipping unreadable file");
                    continue;
                }
            };

            let mut meta = self.converter.front_matter(&raw, path);
            for key in &self.exclude {
                meta.remove(key);
            }

            let filename = entry.file_name().to_string_lossy().to_string();
            snapshot.insert(filename, meta);
        }

        snapshot
    }

    fn from_cached(directory: &Path, cached: Value) -> Option<FileMap> {
        let Value::Object(files) = cached else {
            return None;
        };
        Some(
            files
                .into_iter()
                .map(|(filename, meta)| (directory.join(filename), Meta::from_value(meta)))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::parsing::PulldownConverter;
    use tempfile::TempDir;

    fn locator(dir: &TempDir, cache: Arc<MemoryCache>) -> Locator {
        Locator::new(dir.path(), cache, Arc::new(PulldownConverter::new()))
    }

    fn write_posts(dir: &TempDir) {
        fs::create_dir_all(dir.path().join("posts/nested")).unwrap();
        fs::write(
            dir.path().join("posts/a.md"),
            "---\ntitle: A\ncontent: secret\n---\nBody A",
        )
        .unwrap();
        fs::write(dir.path().join("posts/b.md"), "No front matter").unwrap();
        fs::write(dir.path().join("posts/broken.md"), "---\ntitle: [x\n---\nBody").unwrap();
        fs::write(dir.path().join("posts/notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("posts/nested/c.md"), "---\ntitle: C\n---\n").unwrap();
    }

    #[test]
    fn test_scan_is_non_recursive_and_markdown_only() {
        let dir = TempDir::new().unwrap();
        write_posts(&dir);
        let locator = locator(&dir, Arc::new(MemoryCache::new()));

        let files = locator.all("posts");
        let names: Vec<String> = files
            .keys()
            .map(|path| path.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "b.md", "broken.md"]);
        assert!(files.keys().all(|path| path.starts_with(dir.path())));
    }

    #[test]
    fn test_missing_or_corrupt_front_matter_is_empty() {
        let dir = TempDir::new().unwrap();
        write_posts(&dir);
        let locator = locator(&dir, Arc::new(MemoryCache::new()));

        let files = locator.all("posts");
        assert!(files[&dir.path().join("posts/b.md")].is_empty());
        assert!(files[&dir.path().join("posts/broken.md")].is_empty());
        assert_eq!(
            files[&dir.path().join("posts/a.md")].get_string("title"),
            Some("A".to_string())
        );
    }

    #[test]
    fn test_missing_folder_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(MemoryCache::new());
        let locator = locator(&dir, cache.clone());

        assert!(locator.all("nowhere").is_empty());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_cached_scan_matches_cold_scan() {
        let dir = TempDir::new().unwrap();
        write_posts(&dir);
        let cache = Arc::new(MemoryCache::new());
        let locator = locator(&dir, cache.clone());

        let cold = locator.all("posts");
        assert!(cache.get(&Locator::cache_key("posts")).is_some());

        fs::write(dir.path().join("posts/z.md"), "---\ntitle: Z\n---\n").unwrap();
        let warm = locator.all("posts");
        assert_eq!(cold, warm);

        locator.forget("posts");
        let refreshed = locator.all("posts");
        assert_eq!(refreshed.len(), cold.len() + 1);
    }

    #[test]
    fn test_excluded_keys_are_not_cached() {
        let dir = TempDir::new().unwrap();
        write_posts(&dir);
        let locator = locator(&dir, Arc::new(MemoryCache::new())).exclude(&["content".to_string()]);

        let files = locator.all("posts");
        let a = &files[&dir.path().join("posts/a.md")];
        assert!(!a.contains("content"));
        assert!(a.contains("title"));
    }

    #[test]
    fn test_folders_outside_the_root_are_refused() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("content/posts")).unwrap();
        fs::write(dir.path().join("content/posts/a.md"), "---\ntitle: A\n---\n").unwrap();
        fs::write(dir.path().join("secret.md"), "---\ntitle: Secret\n---\n").unwrap();

        let cache = Arc::new(MemoryCache::new());
        let locator = Locator::new(
            dir.path().join("content"),
            cache.clone(),
            Arc::new(PulldownConverter::new()),
        );

        assert!(locator.all("..").is_empty());
        assert!(locator.all("/posts/../../").is_empty());
        assert!(locator.all("posts/./").is_empty());
        assert!(cache.is_empty());
        assert_eq!(locator.all("/posts/").len(), 1);

        assert!(Locator::is_contained(""));
        assert!(Locator::is_contained("/posts/2024/"));
        assert!(!Locator::is_contained("posts//2024"));
        assert!(!Locator::is_contained("..\\secret"));
    }

    #[test]
    fn test_root_folder_key() {
        assert_eq!(Locator::cache_key(""), "collection._root");
        assert_eq!(Locator::cache_key("posts/2024"), "collection.posts.2024");
    }
}
