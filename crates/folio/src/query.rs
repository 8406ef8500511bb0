use crate::entry::Entry;
use crate::locator::FileMap;
use crate::parsing::{entry_name, file_stem, parse_date, slugify};
use crate::resources::Resources;
use crate::types::{Meta, Visibility, compare_values};
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::cmp::Ordering;
use std::path::PathBuf;

/// Meta fields a query may sort by, besides its own `meta_key`.
const SORTABLE_FIELDS: [&str; 3] = ["author", "date", "title"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryArgs {
    /// Content type whose folder is queried when no explicit path is given.
    #[serde(rename = "type")]
    pub type_name: Option<String>,
    pub path: Option<String>,
    /// Page size; 0 returns everything from `offset` on.
    pub number: i64,
    pub offset: i64,
    pub order: Order,
    pub orderby: String,
    pub slug: Vec<String>,
    pub year: Option<i64>,
    pub month: Option<i64>,
    pub day: Option<i64>,
    pub hour: Option<i64>,
    pub minute: Option<i64>,
    pub second: Option<i64>,
    pub meta_key: Option<String>,
    pub meta_value: Option<String>,
    /// Drops `index` files unless `index` is one of the requested slugs.
    pub noindex: bool,
    /// Keeps only entries with this visibility, resolved before paging.
    pub visibility: Option<Visibility>,
    /// Entries load front matter only until their content is asked for.
    pub no_content: bool,
}

impl Default for QueryArgs {
    fn default() -> Self {
        Self {
            type_name: None,
            path: None,
            number: 0,
            offset: 0,
            order: Order::Asc,
            orderby: Self::DEFAULT_ORDERBY.to_string(),
            slug: Vec::new(),
            year: None,
            month: None,
            day: None,
            hour: None,
            minute: None,
            second: None,
            meta_key: None,
            meta_value: None,
            noindex: false,
            visibility: None,
            no_content: false,
        }
    }
}

impl QueryArgs {
    pub const DEFAULT_ORDERBY: &'static str = "filename";

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.slug.push(slug.into());
        self
    }

    /// Moves the window to the 1-based `page` of `number`-sized pages.
    pub fn with_page(mut self, page: i64) -> Self {
        let skipped = page.max(1).saturating_sub(1);
        let size = i64::try_from(self.number.unsigned_abs()).unwrap_or(i64::MAX);
        self.offset = skipped.saturating_mul(size);
        self
    }

    fn has_date_filter(&self) -> bool {
        self.date_components().iter().any(|(_, wanted)| wanted.is_some())
    }

    fn date_components(&self) -> [(DateComponent, Option<i64>); 6] {
        [
            (DateComponent::Year, self.year),
            (DateComponent::Month, self.month),
            (DateComponent::Day, self.day),
            (DateComponent::Hour, self.hour),
            (DateComponent::Minute, self.minute),
            (DateComponent::Second, self.second),
        ]
    }

    fn sorts_by_meta(&self) -> bool {
        SORTABLE_FIELDS.contains(&self.orderby.as_str())
            || self.meta_key.as_deref() == Some(self.orderby.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateComponent {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl DateComponent {
    fn of(&self, date: &DateTime<Utc>) -> i64 {
        match self {
            DateComponent::Year => i64::from(date.year()),
            DateComponent::Month => i64::from(date.month()),
            DateComponent::Day => i64::from(date.day()),
            DateComponent::Hour => i64::from(date.hour()),
            DateComponent::Minute => i64::from(date.minute()),
            DateComponent::Second => i64::from(date.second()),
        }
    }
}

struct Materialized {
    entries: Vec<Entry>,
    total: usize,
}

/// A filtered, sorted, paginated view over one content folder. The result
/// is computed on first access and memoized.
pub struct Query {
    resources: Resources,
    path: Option<String>,
    args: QueryArgs,
    result: OnceCell<Materialized>,
}

impl Query {
    pub fn new(resources: &Resources, path: &str, args: QueryArgs) -> Self {
        Self {
            resources: resources.clone(),
            path: Some(path.trim_matches('/').to_string()),
            args,
            result: OnceCell::new(),
        }
    }

    /// Resolves the base folder from `path`, else from the `type` name.
    /// An unknown type yields an empty query.
    pub fn from_args(resources: &Resources, args: QueryArgs) -> Self {
        let path = match (&args.path, &args.type_name) {
            (Some(path), _) => Some(path.trim_matches('/').to_string()),
            (None, Some(type_name)) => resources
                .registry
                .get(type_name)
                .map(|content_type| content_type.path().to_string()),
            (None, None) => Some(String::new()),
        };

        if path.is_none() {
            tracing::debug!(type_name = ?args.type_name, "query for unknown content type");
        }

        Self {
            resources: resources.clone(),
            path,
            args,
            result: OnceCell::new(),
        }
    }

    /// A query that matches nothing.
    pub fn empty(resources: &Resources) -> Self {
        Self {
            resources: resources.clone(),
            path: None,
            args: QueryArgs::default(),
            result: OnceCell::new(),
        }
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn args(&self) -> &QueryArgs {
        &self.args
    }

    pub fn all(&self) -> &[Entry] {
        &self.materialize().entries
    }

    pub fn into_entries(self) -> Vec<Entry> {
        self.materialize();
        self.result
            .into_inner()
            .map(|materialized| materialized.entries)
            .unwrap_or_default()
    }

    pub fn first(&self) -> Option<&Entry> {
        self.all().first()
    }

    pub fn last(&self) -> Option<&Entry> {
        self.all().last()
    }

    /// Entries on the current page.
    pub fn count(&self) -> usize {
        self.all().len()
    }

    /// Entries matching the filters, before pagination.
    pub fn total(&self) -> usize {
        self.materialize().total
    }

    pub fn offset(&self) -> usize {
        self.args.offset.unsigned_abs() as usize
    }

    pub fn number(&self) -> usize {
        self.args.number.unsigned_abs() as usize
    }

    pub fn has_entries(&self) -> bool {
        !self.all().is_empty()
    }

    pub fn has(&self, slug: &str) -> bool {
        self.all()
            .iter()
            .any(|entry| entry.slug().is_ok_and(|entry_slug| entry_slug == slug))
    }

    /// 1-based page the window starts on.
    pub fn page(&self) -> usize {
        match self.number() {
            0 => 1,
            number => self.offset() / number + 1,
        }
    }

    pub fn pages(&self) -> usize {
        match self.number() {
            0 => 1,
            number => self.total().div_ceil(number).max(1),
        }
    }

    fn materialize(&self) -> &Materialized {
        self.result.get_or_init(|| {
            let Some(path) = &self.path else {
                return Materialized {
                    entries: Vec::new(),
                    total: 0,
                };
            };

            let candidates = self.resources.locator().all(path);
            let filenames = self.filter(candidates);
            let total = filenames.len();

            let window = filenames.into_iter().skip(self.offset());
            let window: Vec<PathBuf> = match self.number() {
                0 => window.collect(),
                number => window.take(number).collect(),
            };

            tracing::debug!(
                path = %path,
                total,
                count = window.len(),
                "query materialized"
            );

            let entries = window
                .into_iter()
                .map(|filepath| Entry::new(&self.resources, filepath, self.args.no_content))
                .collect();

            Materialized { entries, total }
        })
    }

    /// Runs the visibility, slug, date and meta filters, the sort and the
    /// index drop, narrowing the candidate set in that order.
    fn filter(&self, candidates: FileMap) -> Vec<PathBuf> {
        let args = &self.args;
        let mut candidates: Vec<(PathBuf, Meta)> = candidates.into_iter().collect();

        if let Some(wanted) = args.visibility {
            candidates
                .retain(|(path, meta)| Visibility::resolve(meta, &filename(path)) == wanted);
        }

        if !args.slug.is_empty() {
            candidates.retain(|(path, meta)| matches_slug(path, meta, &args.slug));
        }

        if args.has_date_filter() {
            candidates.retain(|(_, meta)| self.matches_date(meta));
        }

        if let Some(meta_key) = &args.meta_key {
            let wanted = slugify(args.meta_value.as_deref().unwrap_or_default());
            candidates.retain(|(_, meta)| {
                meta.values(meta_key)
                    .iter()
                    .any(|value| slugify(value) == wanted)
            });
        }

        if args.sorts_by_meta() {
            let field = args.orderby.as_str();
            candidates.sort_by(|(_, left), (_, right)| {
                let ordering = match (left.get(field), right.get(field)) {
                    (Some(left), Some(right)) => compare_values(left, right),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                match args.order {
                    Order::Asc => ordering,
                    Order::Desc => ordering.reverse(),
                }
            });
        } else if args.order == Order::Desc {
            candidates.reverse();
        }

        let keep_index = !args.noindex || args.slug.iter().any(|slug| slug == "index");

        candidates
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| keep_index || file_stem(&filename(path)) != "index")
            .collect()
    }

    fn matches_date(&self, meta: &Meta) -> bool {
        let Some(date) = meta.get("date").and_then(parse_date) else {
            return false;
        };
        self.args
            .date_components()
            .iter()
            .all(|&(component, wanted)| wanted.is_none_or(|wanted| component.of(&date) == wanted))
    }
}

/// An explicit `slug` in front matter decides alone; only without one does
/// the filename-derived name count.
fn matches_slug(path: &std::path::Path, meta: &Meta, slugs: &[String]) -> bool {
    match meta.get_string("slug") {
        Some(explicit) => slugs.iter().any(|slug| *slug == explicit),
        None => {
            let filename = filename(path);
            let name = entry_name(&filename);
            slugs.iter().any(|slug| slug == name)
        }
    }
}

fn filename(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContentTypeConfig, SiteConfig};
    use crate::resources::test_resources;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &TempDir, relative: &str, content: &str) {
        let path = dir.path().join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn site() -> SiteConfig {
        SiteConfig::new("Test", "https://example.com").with_type(
            "post",
            ContentTypeConfig {
                path: Some("posts".to_string()),
                ..ContentTypeConfig::default()
            },
        )
    }

    fn names(query: &Query) -> Vec<String> {
        query
            .all()
            .iter()
            .map(|entry| entry.name().to_string())
            .collect()
    }

    fn numbered_posts(dir: &TempDir, count: usize) {
        for index in 1..=count {
            write(
                dir,
                &format!("posts/{:02}.post-{}.md", index, index),
                &format!("---\ntitle: Post {}\n---\nBody {}", index, index),
            );
        }
    }

    #[test]
    fn test_pagination_partitions_the_result() {
        let dir = TempDir::new().unwrap();
        numbered_posts(&dir, 7);
        let (resources, _) = test_resources(dir.path(), site());

        let everything = names(&Query::new(&resources, "posts", QueryArgs::default()));
        assert_eq!(everything.len(), 7);

        let mut concatenated = Vec::new();
        let mut summed = 0;
        for page in 1..=3 {
            let args = QueryArgs {
                number: 3,
                ..QueryArgs::default()
            }
            .with_page(page);
            let query = Query::new(&resources, "posts", args);
            assert_eq!(query.total(), 7);
            assert_eq!(query.page(), page as usize);
            assert_eq!(query.pages(), 3);
            summed += query.count();
            concatenated.extend(names(&query));
        }

        assert_eq!(summed, 7);
        assert_eq!(concatenated, everything);
    }

    #[test]
    fn test_negative_window_is_absolute() {
        let dir = TempDir::new().unwrap();
        numbered_posts(&dir, 5);
        let (resources, _) = test_resources(dir.path(), site());

        let query = Query::new(
            &resources,
            "posts",
            QueryArgs {
                number: -2,
                offset: -1,
                ..QueryArgs::default()
            },
        );
        assert_eq!(query.number(), 2);
        assert_eq!(query.offset(), 1);
        assert_eq!(names(&query), vec!["post-2", "post-3"]);
    }

    #[test]
    fn test_far_pages_saturate_instead_of_overflowing() {
        let dir = TempDir::new().unwrap();
        numbered_posts(&dir, 3);
        let (resources, _) = test_resources(dir.path(), site());

        let far = QueryArgs {
            number: 2,
            ..QueryArgs::default()
        }
        .with_page(i64::MAX);
        assert_eq!(far.offset, i64::MAX);
        assert!(!Query::new(&resources, "posts", far).has_entries());

        let widest = QueryArgs {
            number: i64::MIN,
            ..QueryArgs::default()
        }
        .with_page(3);
        assert_eq!(widest.offset, i64::MAX);

        let first = QueryArgs {
            number: 2,
            ..QueryArgs::default()
        }
        .with_page(i64::MIN);
        assert_eq!(first.offset, 0);
    }

    #[test]
    fn test_visibility_filter_runs_before_paging() {
        let dir = TempDir::new().unwrap();
        numbered_posts(&dir, 3);
        write(&dir, "posts/02.hidden.md", "---
visibility: hidden
---
Shh");
        write(&dir, "posts/_draft.md", "---
title: Draft
---
Later");
        let (resources, _) = test_resources(dir.path(), site());

        let public = |page| {
            let args = QueryArgs {
                number: 2,
                visibility: Some(Visibility::Public),
                ..QueryArgs::default()
            }
            .with_page(page);
            Query::new(&resources, "posts", args)
        };

        let first = public(1);
        assert_eq!(first.total(), 3);
        assert_eq!(names(&first), vec!["post-1", "post-2"]);
        assert_eq!(names(&public(2)), vec!["post-3"]);

        let hidden = Query::new(
            &resources,
            "posts",
            QueryArgs {
                visibility: Some(Visibility::Hidden),
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&hidden), vec!["hidden", "_draft"]);

        let everything = Query::new(&resources, "posts", QueryArgs::default());
        assert_eq!(everything.total(), 5);
    }

    #[test]
    fn test_explicit_slug_blocks_filename_match() {
        let dir = TempDir::new().unwrap();
        write(&dir, "posts/bar.md", "---\nslug: foo\n---\nBody");
        write(&dir, "posts/baz.md", "Body");
        let (resources, _) = test_resources(dir.path(), site());

        let by_filename = Query::new(&resources, "posts", QueryArgs::default().with_slug("bar"));
        assert!(!by_filename.has_entries());

        let by_slug = Query::new(&resources, "posts", QueryArgs::default().with_slug("foo"));
        assert_eq!(by_slug.count(), 1);
        assert!(by_slug.has("foo"));

        let fallback = Query::new(&resources, "posts", QueryArgs::default().with_slug("baz"));
        assert_eq!(fallback.count(), 1);
    }

    #[test]
    fn test_slug_ignores_ordering_prefix() {
        let dir = TempDir::new().unwrap();
        numbered_posts(&dir, 3);
        let (resources, _) = test_resources(dir.path(), site());

        let query = Query::new(&resources, "posts", QueryArgs::default().with_slug("post-2"));
        assert_eq!(names(&query), vec!["post-2"]);
    }

    #[test]
    fn test_missing_dates_sort_last_ascending_first_descending() {
        let dir = TempDir::new().unwrap();
        write(&dir, "posts/a.md", "---\ndate: 2021-01-01\n---\n");
        write(&dir, "posts/b.md", "---\ntitle: Undated\n---\n");
        write(&dir, "posts/c.md", "---\ndate: 2020-01-01\n---\n");
        let (resources, _) = test_resources(dir.path(), site());

        let ascending = Query::new(
            &resources,
            "posts",
            QueryArgs {
                orderby: "date".to_string(),
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&ascending), vec!["c", "a", "b"]);

        let descending = Query::new(
            &resources,
            "posts",
            QueryArgs {
                orderby: "date".to_string(),
                order: Order::Desc,
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&descending), vec!["b", "a", "c"]);
    }

    #[test]
    fn test_filename_order_and_unsortable_field() {
        let dir = TempDir::new().unwrap();
        write(&dir, "posts/a.md", "---\nweight: 3\n---\n");
        write(&dir, "posts/b.md", "---\nweight: 1\n---\n");
        let (resources, _) = test_resources(dir.path(), site());

        let descending = Query::new(
            &resources,
            "posts",
            QueryArgs {
                order: Order::Desc,
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&descending), vec!["b", "a"]);

        let by_weight = Query::new(
            &resources,
            "posts",
            QueryArgs {
                orderby: "weight".to_string(),
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&by_weight), vec!["a", "b"]);

        let by_meta_key = Query::new(
            &resources,
            "posts",
            QueryArgs {
                orderby: "weight".to_string(),
                meta_key: Some("weight".to_string()),
                meta_value: Some("1".to_string()),
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&by_meta_key), vec!["b"]);
    }

    #[test]
    fn test_date_filter_components() {
        let dir = TempDir::new().unwrap();
        write(&dir, "posts/a.md", "---\ndate: 2024-03-05 10:30:00\n---\n");
        write(&dir, "posts/b.md", "---\ndate: 2024-04-01\n---\n");
        write(&dir, "posts/c.md", "---\ndate: 1709634600\n---\n");
        write(&dir, "posts/d.md", "---\ntitle: Undated\n---\n");
        let (resources, _) = test_resources(dir.path(), site());

        let year = Query::new(
            &resources,
            "posts",
            QueryArgs {
                year: Some(2024),
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&year), vec!["a", "b", "c"]);

        let march = Query::new(
            &resources,
            "posts",
            QueryArgs {
                year: Some(2024),
                month: Some(3),
                day: Some(5),
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&march), vec!["a", "c"]);

        let hour = Query::new(
            &resources,
            "posts",
            QueryArgs {
                year: Some(2024),
                month: Some(3),
                day: Some(5),
                hour: Some(10),
                minute: Some(30),
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&hour), vec!["a", "c"]);
    }

    #[test]
    fn test_meta_filter_compares_slugs() {
        let dir = TempDir::new().unwrap();
        write(&dir, "posts/a.md", "---\ntag: [Rust Lang, web]\n---\n");
        write(&dir, "posts/b.md", "---\ntag: rust-lang\n---\n");
        write(&dir, "posts/c.md", "---\ntag: python\n---\n");
        write(&dir, "posts/d.md", "No tags");
        let (resources, _) = test_resources(dir.path(), site());

        let query = Query::new(
            &resources,
            "posts",
            QueryArgs {
                meta_key: Some("tag".to_string()),
                meta_value: Some("rust-lang".to_string()),
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&query), vec!["a", "b"]);
    }

    #[test]
    fn test_noindex_unless_requested() {
        let dir = TempDir::new().unwrap();
        write(&dir, "docs/index.md", "Docs home");
        write(&dir, "docs/setup.md", "Setup");
        let (resources, _) = test_resources(dir.path(), site());

        let listing = Query::new(
            &resources,
            "docs",
            QueryArgs {
                noindex: true,
                ..QueryArgs::default()
            },
        );
        assert_eq!(names(&listing), vec!["setup"]);

        let explicit = Query::new(
            &resources,
            "docs",
            QueryArgs {
                noindex: true,
                ..QueryArgs::default()
            }
            .with_slug("index"),
        );
        assert_eq!(names(&explicit), vec!["index"]);
    }

    #[test]
    fn test_from_args_resolves_type_path() {
        let dir = TempDir::new().unwrap();
        numbered_posts(&dir, 2);
        let (resources, _) = test_resources(dir.path(), site());

        let query = Query::from_args(
            &resources,
            QueryArgs {
                type_name: Some("post".to_string()),
                ..QueryArgs::default()
            },
        );
        assert_eq!(query.path(), Some("posts"));
        assert_eq!(query.total(), 2);
        assert_eq!(query.first().unwrap().name(), "post-1");
        assert_eq!(query.last().unwrap().name(), "post-2");

        let unknown = Query::from_args(
            &resources,
            QueryArgs {
                type_name: Some("nope".to_string()),
                ..QueryArgs::default()
            },
        );
        assert!(!unknown.has_entries());
        assert_eq!(unknown.total(), 0);
    }

    #[test]
    fn test_args_deserialize_from_options() {
        let args: QueryArgs = serde_json::from_value(serde_json::json!({
            "type": "post",
            "number": 5,
            "order": "desc",
            "slug": ["a", "b"],
        }))
        .unwrap();
        assert_eq!(args.type_name.as_deref(), Some("post"));
        assert_eq!(args.number, 5);
        assert_eq!(args.order, Order::Desc);
        assert_eq!(args.orderby, "filename");
        assert_eq!(args.slug.len(), 2);
    }
}
