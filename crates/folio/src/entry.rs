use crate::cache::MARKDOWN_STORE;
use crate::content_type::ContentType;
use crate::dotpath::dotted;
use crate::error::{IoContext, Result};
use crate::parsing::{
    Converted, entry_name, parse_date, reading_time, slugify, strip_html_tags, truncate_words,
    word_count,
};
use crate::query::{Query, QueryArgs};
use crate::resources::Resources;
use crate::types::{Meta, Visibility};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

/// How much of the source file has been read so far.
#[derive(Debug, Clone)]
enum ParseState {
    Unparsed,
    MetaOnly(Rc<Meta>),
    Parsed { content: Rc<str>, meta: Rc<Meta> },
}

/// One content file, parsed on demand. Built per query result and never
/// shared across requests.
pub struct Entry {
    resources: Resources,
    filepath: PathBuf,
    filename: String,
    no_content: bool,
    state: RefCell<ParseState>,
    content_type: OnceCell<Arc<ContentType>>,
    related: RefCell<HashMap<String, Rc<Query>>>,
}

impl Entry {
    pub fn new(resources: &Resources, filepath: PathBuf, no_content: bool) -> Self {
        let filename = filepath
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();

        Self {
            resources: resources.clone(),
            filepath,
            filename,
            no_content,
            state: RefCell::new(ParseState::Unparsed),
            content_type: OnceCell::new(),
            related: RefCell::new(HashMap::new()),
        }
    }

    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// Path relative to the content root, `/`-separated.
    pub fn relative_path(&self) -> String {
        self.resources
            .relative(&self.filepath)
            .unwrap_or_else(|| self.filename.clone())
    }

    fn relative_directory(&self) -> String {
        self.filepath
            .parent()
            .and_then(|parent| self.resources.relative(parent))
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        entry_name(&self.filename)
    }

    /// Type owning the file's folder, or the generic page type.
    pub fn content_type(&self) -> Arc<ContentType> {
        self.content_type
            .get_or_init(|| {
                self.resources
                    .registry
                    .resolve_path(&self.relative_directory())
                    .cloned()
                    .unwrap_or_else(|| Arc::new(ContentType::page(&self.resources.config)))
            })
            .clone()
    }

    pub fn meta(&self) -> Result<Rc<Meta>> {
        if let ParseState::MetaOnly(meta) | ParseState::Parsed { meta, .. } = &*self.state.borrow() {
            return Ok(meta.clone());
        }

        if self.no_content {
            let raw = fs::read_to_string(&self.filepath).io_context("reading", &self.filepath)?;
            let meta = Rc::new(self.resources.converter.front_matter(&raw, &self.filepath));
            *self.state.borrow_mut() = ParseState::MetaOnly(meta.clone());
            return Ok(meta);
        }

        Ok(self.parse()?.1)
    }

    pub fn meta_value(&self, name: &str) -> Result<Option<Value>> {
        Ok(self.meta()?.get(name).cloned())
    }

    pub fn content(&self) -> Result<Rc<str>> {
        Ok(self.parse()?.0)
    }

    fn parse(&self) -> Result<(Rc<str>, Rc<Meta>)> {
        if let ParseState::Parsed { content, meta } = &*self.state.borrow() {
            return Ok((content.clone(), meta.clone()));
        }

        let converted = self.load_converted()?;
        let content: Rc<str> = Rc::from(converted.content);
        let meta = Rc::new(converted.meta);
        *self.state.borrow_mut() = ParseState::Parsed {
            content: content.clone(),
            meta: meta.clone(),
        };
        Ok((content, meta))
    }

    fn cache_key(&self) -> String {
        format!("{}.{}", MARKDOWN_STORE, dotted(&self.relative_path()))
    }

    /// Serves the converted file from the markdown store unless the source
    /// changed after the record was written.
    fn load_converted(&self) -> Result<Converted> {
        let cache = &self.resources.cache;
        let key = self.cache_key();

        match (cache.created(&key), self.modified()) {
            (Some(created), Some(modified)) if modified <= created => {
                if let Some(converted) = cache.get(&key).and_then(from_cached) {
                    tracing::debug!(key = %key, "markdown cache hit");
                    return Ok(converted);
                }
                cache.forget(&key);
            }
            (Some(_), _) => {
                tracing::debug!(key = %key, "evicting stale markdown cache entry");
                cache.forget(&key);
            }
            (None, _) => {}
        }

        let raw = fs::read_to_string(&self.filepath).io_context("reading", &self.filepath)?;
        let converted = self.resources.converter.convert(&raw, &self.filepath);

        let record = json!({
            "content": converted.content,
            "meta": converted.meta.to_value(),
        });
        if let Err(error) = cache.put(&key, record, self.resources.config.cache_ttl) {
            tracing::warn!(key = %key, %error, "failed to cache converted markdown");
        }

        Ok(converted)
    }

    pub fn modified(&self) -> Option<DateTime<Utc>> {
        fs::metadata(&self.filepath)
            .and_then(|metadata| metadata.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }

    /// Explicit `slug` front matter, else the filename-derived name.
    pub fn slug(&self) -> Result<String> {
        Ok(self
            .meta()?
            .get_string("slug")
            .unwrap_or_else(|| self.name().to_string()))
    }

    pub fn url(&self) -> Result<String> {
        let meta = self.meta()?;
        if let Some(uri) = meta.get_string("uri") {
            return Ok(format!("/{}", uri.trim_matches('/')));
        }

        let slug = self.slug()?;
        let content_type = self.content_type();
        if !content_type.is_page() {
            return Ok(content_type.entry_url(&slug));
        }

        let mut segments = Vec::new();
        let directory = self.relative_directory();
        if !directory.is_empty() {
            segments.push(directory.as_str());
        }
        if slug != "index" {
            segments.push(slug.as_str());
        }
        Ok(format!("/{}", segments.join("/")))
    }

    pub fn title(&self) -> Result<String> {
        Ok(self
            .meta()?
            .get_string("title")
            .unwrap_or_else(|| self.name().to_string()))
    }

    pub fn subtitle(&self) -> Result<Option<String>> {
        Ok(self.meta()?.get_string("subtitle"))
    }

    pub fn date(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self.meta()?.get("date").and_then(parse_date))
    }

    pub fn published(&self) -> Result<Option<DateTime<Utc>>> {
        match self.meta()?.get("published").and_then(parse_date) {
            Some(published) => Ok(Some(published)),
            None => self.date(),
        }
    }

    /// `updated` front matter, else the file's modification time.
    pub fn updated(&self) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .meta()?
            .get("updated")
            .and_then(parse_date)
            .or_else(|| self.modified()))
    }

    /// Resolves the slugs stored under `name` into entries of the folder at
    /// `type_path` (by default the folder of the type called `name`). The
    /// query is memoized per field.
    pub fn meta_entries(&self, name: &str, type_path: Option<&str>) -> Result<Rc<Query>> {
        let target = type_path
            .map(str::to_string)
            .unwrap_or_else(|| self.type_path(name));
        let memo_key = format!("{}:{}", name, target);

        if let Some(query) = self.related.borrow().get(&memo_key) {
            return Ok(query.clone());
        }

        let slugs: Vec<String> = self
            .meta()?
            .values(name)
            .iter()
            .map(|value| slugify(value))
            .filter(|slug| !slug.is_empty())
            .collect();

        let query = if slugs.is_empty() {
            Query::empty(&self.resources)
        } else {
            let args = QueryArgs {
                slug: slugs,
                no_content: true,
                ..QueryArgs::default()
            };
            Query::new(&self.resources, &target, args)
        };

        let query = Rc::new(query);
        self.related
            .borrow_mut()
            .insert(memo_key, query.clone());
        Ok(query)
    }

    fn type_path(&self, type_name: &str) -> String {
        self.resources
            .registry
            .get(type_name)
            .map(|content_type| content_type.path().to_string())
            .unwrap_or_else(|| type_name.to_string())
    }

    pub fn authors(&self) -> Result<Rc<Query>> {
        let path = self.type_path(&self.resources.config.author_type);
        self.meta_entries("author", Some(&path))
    }

    /// Display name of the first author: the author entry's title when one
    /// exists, else the raw front-matter value.
    pub fn author(&self) -> Result<Option<String>> {
        if let Some(author) = self.authors()?.first() {
            return Ok(Some(author.title()?));
        }
        Ok(self.meta()?.values("author").into_iter().next())
    }

    pub fn terms(&self, taxonomy: &str) -> Result<Rc<Query>> {
        self.meta_entries(taxonomy, None)
    }

    /// The `excerpt` front matter rendered as Markdown, else the first
    /// `words` words of the content in a paragraph.
    pub fn excerpt(&self, words: usize, more: &str) -> Result<String> {
        if let Some(excerpt) = self.meta()?.get_string("excerpt") {
            return Ok(self.resources.converter.render(&excerpt));
        }

        let text = strip_html_tags(&self.content()?);
        let truncated = truncate_words(&text, words, more);
        if truncated.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("<p>{}</p>", truncated))
    }

    /// Excerpt with the site's configured length and marker.
    pub fn summary(&self) -> Result<String> {
        let config = &self.resources.config;
        self.excerpt(config.excerpt_words, &config.more)
    }

    pub fn visibility(&self) -> Result<Visibility> {
        Ok(Visibility::resolve(&*self.meta()?, &self.filename))
    }

    pub fn is_public(&self) -> Result<bool> {
        Ok(self.visibility()? == Visibility::Public)
    }

    pub fn is_hidden(&self) -> Result<bool> {
        Ok(self.visibility()? == Visibility::Hidden)
    }

    pub fn word_count(&self) -> Result<usize> {
        Ok(word_count(&strip_html_tags(&self.content()?)))
    }

    pub fn reading_time(&self) -> Result<usize> {
        Ok(reading_time(self.word_count()?))
    }

    /// Whether the entry is past `MetaOnly`; used by tests and diagnostics.
    pub fn is_parsed(&self) -> bool {
        matches!(&*self.state.borrow(), ParseState::Parsed { .. })
    }
}

impl std::fmt::Debug for Entry {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("Entry")
            .field("filepath", &self.filepath)
            .field("state", &self.state.borrow())
            .finish()
    }
}

fn from_cached(value: Value) -> Option<Converted> {
    let content = value.get("content")?.as_str()?.to_string();
    let meta = Meta::from_value(value.get("meta")?.clone());
    Some(Converted { content, meta })
}
