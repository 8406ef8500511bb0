use crate::error::{FolioError, IoContext, Result};
use crate::query::Order;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = "folio.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub title: String,
    pub base_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default = "default_content_dir")]
    pub content_dir: PathBuf,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    /// Seconds a cached scan or parse stays valid; 0 keeps it until evicted.
    #[serde(default)]
    pub cache_ttl: u64,
    /// Content type rendered at the site root instead of its own archive.
    #[serde(default)]
    pub home: Option<String>,
    #[serde(default = "default_per_page")]
    pub per_page: usize,
    #[serde(default = "default_author_type")]
    pub author_type: String,
    #[serde(default = "default_excerpt_words")]
    pub excerpt_words: usize,
    #[serde(default = "default_more")]
    pub more: String,
    /// Front-matter keys left out of cached directory scans.
    #[serde(default)]
    pub locator_exclude: Vec<String>,
    #[serde(default = "default_syntax_theme")]
    pub syntax_theme: String,
    #[serde(default)]
    pub types: BTreeMap<String, ContentTypeConfig>,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

pub fn default_content_dir() -> PathBuf {
    PathBuf::from("content")
}

pub fn default_cache_dir() -> PathBuf {
    PathBuf::from(".folio-cache")
}

pub fn default_per_page() -> usize {
    10
}

pub fn default_author_type() -> String {
    "author".to_string()
}

pub fn default_excerpt_words() -> usize {
    55
}

pub fn default_more() -> String {
    "&hellip;".to_string()
}

pub fn default_syntax_theme() -> String {
    "base16-ocean.dark".to_string()
}

fn default_true() -> bool {
    true
}

impl SiteConfig {
    pub fn new(title: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            base_url: base_url.into(),
            description: None,
            author: None,
            language: None,
            content_dir: default_content_dir(),
            cache_dir: default_cache_dir(),
            cache_ttl: 0,
            home: None,
            per_page: default_per_page(),
            author_type: default_author_type(),
            excerpt_words: default_excerpt_words(),
            more: default_more(),
            locator_exclude: Vec::new(),
            syntax_theme: default_syntax_theme(),
            types: BTreeMap::new(),
            routes: Vec::new(),
        }
    }

    pub fn load(site_dir: &Path) -> Result<Self> {
        let config_path = site_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(FolioError::ConfigNotFound { path: config_path });
        }

        let content =
            fs::read_to_string(&config_path).io_context("reading config", &config_path)?;
        Self::parse(&content, &config_path)
    }

    pub fn parse(content: &str, config_path: &Path) -> Result<Self> {
        let mut config: SiteConfig =
            toml::from_str(content).map_err(|error| FolioError::TomlParse {
                path: config_path.to_path_buf(),
                message: error.to_string(),
            })?;

        config.base_url = config.base_url.trim_end_matches('/').to_string();

        Ok(config)
    }

    pub fn with_type(mut self, name: impl Into<String>, config: ContentTypeConfig) -> Self {
        self.types.insert(name.into(), config);
        self
    }
}

/// What an archive of a content type lists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CollectSetting {
    /// `true` lists the type itself, `false` disables the archive.
    Flag(bool),
    Name(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentTypeConfig {
    /// Folder under the content root; defaults to the type name.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default = "default_true", alias = "public")]
    pub is_public: bool,
    #[serde(default, alias = "taxonomy")]
    pub is_taxonomy: bool,
    #[serde(default)]
    pub collect: Option<CollectSetting>,
    #[serde(default)]
    pub term_collect: Option<String>,
    #[serde(default = "default_true", alias = "routing")]
    pub has_routing: bool,
    #[serde(default, alias = "prefix")]
    pub routing_prefix: Option<String>,
    /// URL template overrides keyed by route kind (`single`, `collection.year`, …).
    #[serde(default)]
    pub routing_paths: BTreeMap<String, String>,
    #[serde(default)]
    pub has_feed: bool,
    #[serde(default = "default_true")]
    pub has_sitemap: bool,
    #[serde(default)]
    pub has_date_archives: bool,
    #[serde(default)]
    pub has_time_archives: bool,
    /// Higher priorities register their routes first.
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub per_page: Option<i64>,
    #[serde(default)]
    pub order: Option<Order>,
    #[serde(default)]
    pub orderby: Option<String>,
}

impl Default for ContentTypeConfig {
    fn default() -> Self {
        Self {
            path: None,
            title: None,
            is_public: true,
            is_taxonomy: false,
            collect: None,
            term_collect: None,
            has_routing: true,
            routing_prefix: None,
            routing_paths: BTreeMap::new(),
            has_feed: false,
            has_sitemap: true,
            has_date_archives: false,
            has_time_archives: false,
            priority: 0,
            per_page: None,
            order: None,
            orderby: None,
        }
    }
}

/// A route declared directly in the site config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteConfig {
    pub uri: String,
    pub handler: String,
    #[serde(default, rename = "type")]
    pub type_name: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "where")]
    pub constraints: BTreeMap<String, String>,
}
