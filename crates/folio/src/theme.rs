use crate::config::SiteConfig;
use crate::content_type::ContentType;
use crate::entry::Entry;
use crate::error::Result;
use crate::parsing::slugify;
use crate::resources::Resources;
use crate::xml::escape;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tera::{Context, Tera};
use walkdir::WalkDir;

const BASE_TEMPLATE: &str = include_str!("../templates/base.html");
const SINGLE_TEMPLATE: &str = include_str!("../templates/single.html");
const COLLECTION_TEMPLATE: &str = include_str!("../templates/collection.html");
const TERM_TEMPLATE: &str = include_str!("../templates/term.html");
const NOT_FOUND_TEMPLATE: &str = include_str!("../templates/not_found.html");
const ENTRY_SUMMARY_PARTIAL: &str = include_str!("../templates/partials/entry_summary.html");
const PAGINATION_PARTIAL: &str = include_str!("../templates/partials/pagination.html");

pub const SINGLE: &str = "single.html";
pub const COLLECTION: &str = "collection.html";
pub const TERM: &str = "term.html";
pub const NOT_FOUND: &str = "not_found.html";

const DATE_DISPLAY_FORMAT: &str = "%B %-d, %Y";

/// Tera templates: the built-in set, overridden file by file by any
/// `templates/*.html` in the site directory.
pub struct Theme {
    tera: Tera,
}

impl Theme {
    pub fn builtin() -> Result<Self> {
        let mut tera = Tera::default();
        tera.set_escape_fn(escape);

        tera.add_raw_templates(vec![
            ("base.html", BASE_TEMPLATE),
            (SINGLE, SINGLE_TEMPLATE),
            (COLLECTION, COLLECTION_TEMPLATE),
            (TERM, TERM_TEMPLATE),
            (NOT_FOUND, NOT_FOUND_TEMPLATE),
            ("partials/entry_summary.html", ENTRY_SUMMARY_PARTIAL),
            ("partials/pagination.html", PAGINATION_PARTIAL),
        ])?;

        Ok(Self { tera })
    }

    pub fn load(site_dir: &Path) -> Result<Self> {
        let mut theme = Self::builtin()?;
        let templates_dir = site_dir.join("templates");

        if !templates_dir.is_dir() {
            return Ok(theme);
        }

        let mut overrides = Vec::new();
        for entry in WalkDir::new(&templates_dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|entry| entry.ok())
        {
            let path = entry.path();
            if !path.is_file() || path.extension().is_none_or(|extension| extension != "html") {
                continue;
            }
            let Ok(relative) = path.strip_prefix(&templates_dir) else {
                continue;
            };
            let name = relative.to_string_lossy().replace('\\', "/");
            overrides.push((path.to_path_buf(), Some(name)));
        }

        tracing::debug!(count = overrides.len(), "loading template overrides");
        theme.tera.add_template_files(overrides)?;

        Ok(theme)
    }

    pub fn has_template(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|existing| existing == name)
    }

    /// First of `candidates` that exists, else `fallback`.
    pub fn pick<'a>(&self, candidates: &[&'a str], fallback: &'a str) -> &'a str {
        candidates
            .iter()
            .copied()
            .find(|candidate| self.has_template(candidate))
            .unwrap_or(fallback)
    }

    pub fn render(&self, template: &str, context: &Context) -> Result<String> {
        Ok(self.tera.render(template, context)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteView {
    pub title: String,
    pub base_url: String,
    pub description: Option<String>,
    pub author: Option<String>,
    pub language: String,
}

impl SiteView {
    pub fn new(config: &SiteConfig) -> Self {
        Self {
            title: config.title.clone(),
            base_url: config.base_url.clone(),
            description: config.description.clone(),
            author: config.author.clone(),
            language: config.language.clone().unwrap_or_else(|| "en".to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkView {
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContentTypeView {
    pub name: String,
    pub title: String,
    pub url: String,
}

impl ContentTypeView {
    pub fn new(content_type: &ContentType) -> Self {
        Self {
            name: content_type.name().to_string(),
            title: content_type.title().to_string(),
            url: content_type.collection_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PaginationView {
    pub page: usize,
    pub pages: usize,
    pub total: usize,
    pub previous: Option<String>,
    pub next: Option<String>,
}

/// Template-facing snapshot of one entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryView {
    pub title: String,
    pub subtitle: Option<String>,
    pub url: String,
    pub slug: String,
    pub name: String,
    pub type_name: String,
    pub date: Option<String>,
    pub date_display: Option<String>,
    pub updated: Option<String>,
    pub author: Option<String>,
    pub excerpt: String,
    pub content: Option<String>,
    pub word_count: usize,
    pub reading_time: usize,
    pub visibility: &'static str,
    pub meta: Value,
    pub terms: BTreeMap<String, Vec<LinkView>>,
}

impl EntryView {
    pub fn build(entry: &Entry, resources: &Resources, with_content: bool) -> Result<Self> {
        let date = entry.date()?;
        let content = if with_content {
            Some(entry.content()?.to_string())
        } else {
            None
        };

        Ok(Self {
            title: entry.title()?,
            subtitle: entry.subtitle()?,
            url: entry.url()?,
            slug: entry.slug()?,
            name: entry.name().to_string(),
            type_name: entry.content_type().name().to_string(),
            date: date.map(|date| date.to_rfc3339()),
            date_display: date.map(|date| date.format(DATE_DISPLAY_FORMAT).to_string()),
            updated: entry.updated()?.map(|updated| updated.to_rfc3339()),
            author: entry.author()?,
            excerpt: entry.summary()?,
            content,
            word_count: entry.word_count()?,
            reading_time: entry.reading_time()?,
            visibility: entry.visibility()?.as_str(),
            meta: entry.meta()?.to_value(),
            terms: term_links(entry, resources)?,
        })
    }
}

/// Links for every taxonomy term the entry lists. Terms with an entry of
/// their own use its title; bare terms fall back to the raw value.
fn term_links(entry: &Entry, resources: &Resources) -> Result<BTreeMap<String, Vec<LinkView>>> {
    let mut links = BTreeMap::new();
    let meta = entry.meta()?;

    for taxonomy in resources.registry.taxonomies() {
        let values = meta.values(taxonomy.name());
        if values.is_empty() {
            continue;
        }

        let mut titles = HashMap::new();
        for term in entry.terms(taxonomy.name())?.all() {
            titles.insert(term.slug()?, term.title()?);
        }

        let taxonomy_links = values
            .into_iter()
            .map(|value| {
                let slug = slugify(&value);
                LinkView {
                    title: titles.get(&slug).cloned().unwrap_or(value),
                    url: taxonomy.entry_url(&slug),
                }
            })
            .collect();
        links.insert(taxonomy.name().to_string(), taxonomy_links);
    }

    Ok(links)
}
