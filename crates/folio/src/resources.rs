use crate::cache::KeyedCache;
use crate::config::SiteConfig;
use crate::locator::Locator;
use crate::parsing::MarkdownConverter;
use crate::registry::TypeRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Collaborators handed to locators, entries and queries.
#[derive(Clone)]
pub struct Resources {
    pub content_dir: PathBuf,
    pub config: Arc<SiteConfig>,
    pub registry: Arc<TypeRegistry>,
    pub cache: Arc<dyn KeyedCache>,
    pub converter: Arc<dyn MarkdownConverter>,
}

impl Resources {
    pub fn new(
        content_dir: impl AsRef<Path>,
        config: Arc<SiteConfig>,
        registry: Arc<TypeRegistry>,
        cache: Arc<dyn KeyedCache>,
        converter: Arc<dyn MarkdownConverter>,
    ) -> Self {
        Self {
            content_dir: content_dir.as_ref().to_path_buf(),
            config,
            registry,
            cache,
            converter,
        }
    }

    pub fn locator(&self) -> Locator {
        Locator::new(&self.content_dir, self.cache.clone(), self.converter.clone())
            .exclude(&self.config.locator_exclude)
            .ttl(self.config.cache_ttl)
    }

    /// Path of `path` relative to the content root, `/`-separated.
    pub fn relative(&self, path: &Path) -> Option<String> {
        path.strip_prefix(&self.content_dir)
            .ok()
            .map(|relative| relative.to_string_lossy().replace('\\', "/"))
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Resources")
            .field("content_dir", &self.content_dir)
            .field("types", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) fn test_resources(
    content_dir: &Path,
    config: SiteConfig,
) -> (Resources, Arc<crate::cache::MemoryCache>) {
    let registry = TypeRegistry::from_config(&config).expect("valid test config");
    let cache = Arc::new(crate::cache::MemoryCache::new());
    let resources = Resources::new(
        content_dir,
        Arc::new(config),
        Arc::new(registry),
        cache.clone(),
        Arc::new(crate::parsing::PulldownConverter::new()),
    );
    (resources, cache)
}
