use crate::config::SiteConfig;
use crate::content_type::{ContentType, PAGE_TYPE};
use crate::error::{FolioError, Result};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// All content types, kept in route registration order: higher priority
/// first, then deeper paths (more specific folders) first, then by name.
#[derive(Debug, Default)]
pub struct TypeRegistry {
    types: Vec<Arc<ContentType>>,
    path_index: OnceLock<HashMap<String, usize>>,
    url_index: OnceLock<HashMap<String, usize>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the site config and checks every type name
    /// the config refers to.
    pub fn from_config(site: &SiteConfig) -> Result<Self> {
        let mut registry = Self::new();

        if !site.types.contains_key(PAGE_TYPE) {
            registry.add(ContentType::page(site))?;
        }
        for (name, config) in &site.types {
            registry.add(ContentType::from_config(name, config, site))?;
        }

        registry.validate(site)?;
        Ok(registry)
    }

    fn validate(&self, site: &SiteConfig) -> Result<()> {
        if let Some(home) = &site.home
            && self.get(home).is_none()
        {
            return Err(FolioError::UnknownType {
                name: home.clone(),
                context: "the home setting".to_string(),
            });
        }

        for content_type in &self.types {
            let references = content_type
                .collect()
                .into_iter()
                .chain(content_type.term_collect());
            for reference in references {
                if self.get(reference).is_none() {
                    return Err(FolioError::UnknownType {
                        name: reference.to_string(),
                        context: format!("content type '{}'", content_type.name()),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn add(&mut self, content_type: ContentType) -> Result<()> {
        if self.get(content_type.name()).is_some() {
            return Err(FolioError::DuplicateType {
                name: content_type.name().to_string(),
            });
        }

        self.types.push(Arc::new(content_type));
        self.types.sort_by(|a, b| {
            b.priority()
                .cmp(&a.priority())
                .then_with(|| path_depth(b.path()).cmp(&path_depth(a.path())))
                .then_with(|| a.name().cmp(b.name()))
        });

        self.path_index = OnceLock::new();
        self.url_index = OnceLock::new();
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ContentType>> {
        self.types
            .iter()
            .find(|content_type| content_type.name() == name)
    }

    /// Type whose folder is exactly `path` (relative to the content root).
    pub fn by_path(&self, path: &str) -> Option<&Arc<ContentType>> {
        let index = self.path_index.get_or_init(|| {
            self.types
                .iter()
                .enumerate()
                .rev()
                .map(|(position, content_type)| (content_type.path().to_string(), position))
                .collect()
        });
        index
            .get(path.trim_matches('/'))
            .map(|position| &self.types[*position])
    }

    /// Type whose archive lives at `url`.
    pub fn by_url(&self, url: &str) -> Option<&Arc<ContentType>> {
        let index = self.url_index.get_or_init(|| {
            self.types
                .iter()
                .enumerate()
                .rev()
                .filter(|(_, content_type)| !content_type.is_page())
                .map(|(position, content_type)| {
                    (
                        content_type.collection_url().trim_matches('/').to_string(),
                        position,
                    )
                })
                .collect()
        });
        index
            .get(url.trim_matches('/'))
            .map(|position| &self.types[*position])
    }

    /// Type for a folder, falling back to the generic page type.
    pub fn resolve_path(&self, path: &str) -> Option<&Arc<ContentType>> {
        self.by_path(path).or_else(|| self.page_type())
    }

    pub fn page_type(&self) -> Option<&Arc<ContentType>> {
        self.get(PAGE_TYPE)
    }

    pub fn taxonomies(&self) -> impl Iterator<Item = &Arc<ContentType>> {
        self.types
            .iter()
            .filter(|content_type| content_type.is_taxonomy())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ContentType>> {
        self.types.iter()
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

fn path_depth(path: &str) -> usize {
    path.split('/').filter(|segment| !segment.is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CollectSetting, ContentTypeConfig};

    fn site() -> SiteConfig {
        SiteConfig::new("Test", "https://example.com")
            .with_type(
                "post",
                ContentTypeConfig {
                    path: Some("posts".to_string()),
                    ..ContentTypeConfig::default()
                },
            )
            .with_type(
                "tag",
                ContentTypeConfig {
                    path: Some("tags".to_string()),
                    is_taxonomy: true,
                    term_collect: Some("post".to_string()),
                    ..ContentTypeConfig::default()
                },
            )
    }

    #[test]
    fn test_from_config_adds_page_type() {
        let registry = TypeRegistry::from_config(&site()).unwrap();
        assert_eq!(registry.len(), 3);
        assert!(registry.page_type().is_some());
        assert_eq!(registry.taxonomies().count(), 1);
    }

    #[test]
    fn test_lookup_by_path_and_url() {
        let registry = TypeRegistry::from_config(&site()).unwrap();

        assert_eq!(registry.by_path("posts").unwrap().name(), "post");
        assert_eq!(registry.by_path("/tags/").unwrap().name(), "tag");
        assert_eq!(registry.by_path("").unwrap().name(), "page");
        assert!(registry.by_path("docs").is_none());

        assert_eq!(registry.by_url("/posts").unwrap().name(), "post");
        assert!(registry.by_url("/docs").is_none());
    }

    #[test]
    fn test_resolve_path_falls_back_to_page() {
        let registry = TypeRegistry::from_config(&site()).unwrap();
        assert_eq!(registry.resolve_path("about/team").unwrap().name(), "page");
    }

    #[test]
    fn test_indexes_rebuild_after_add() {
        let mut registry = TypeRegistry::from_config(&site()).unwrap();
        assert!(registry.by_path("docs").is_none());
        assert!(registry.by_url("docs").is_none());

        let config = ContentTypeConfig {
            path: Some("docs".to_string()),
            ..ContentTypeConfig::default()
        };
        registry
            .add(ContentType::from_config("doc", &config, &site()))
            .unwrap();

        assert_eq!(registry.by_path("docs").unwrap().name(), "doc");
        assert_eq!(registry.by_url("docs").unwrap().name(), "doc");
    }

    #[test]
    fn test_registration_order() {
        let site = site()
            .with_type(
                "archive",
                ContentTypeConfig {
                    path: Some("posts/archive".to_string()),
                    ..ContentTypeConfig::default()
                },
            )
            .with_type(
                "featured",
                ContentTypeConfig {
                    path: Some("featured".to_string()),
                    priority: 10,
                    ..ContentTypeConfig::default()
                },
            );
        let registry = TypeRegistry::from_config(&site).unwrap();
        let names: Vec<&str> = registry.iter().map(|content_type| content_type.name()).collect();
        assert_eq!(names, vec!["featured", "archive", "post", "tag", "page"]);
    }

    #[test]
    fn test_duplicate_type_rejected() {
        let mut registry = TypeRegistry::from_config(&site()).unwrap();
        let result = registry.add(ContentType::from_config(
            "post",
            &ContentTypeConfig::default(),
            &site(),
        ));
        assert!(matches!(result, Err(FolioError::DuplicateType { .. })));
    }

    #[test]
    fn test_unknown_references_are_fatal() {
        let site = site().with_type(
            "series",
            ContentTypeConfig {
                collect: Some(CollectSetting::Name("missing".to_string())),
                ..ContentTypeConfig::default()
            },
        );
        let result = TypeRegistry::from_config(&site);
        assert!(matches!(result, Err(FolioError::UnknownType { .. })));

        let mut site = self::site();
        site.home = Some("nope".to_string());
        assert!(matches!(
            TypeRegistry::from_config(&site),
            Err(FolioError::UnknownType { .. })
        ));
    }
}
