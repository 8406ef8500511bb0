use crate::config::{CollectSetting, ContentTypeConfig, SiteConfig};
use crate::query::{Order, QueryArgs};
use crate::types::Visibility;
use std::collections::BTreeMap;
use std::sync::OnceLock;

pub const PAGE_TYPE: &str = "page";

/// What an archive of a type aggregates. Never an empty name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Collect {
    Own,
    Type(String),
    Disabled,
}

impl From<Option<&CollectSetting>> for Collect {
    fn from(setting: Option<&CollectSetting>) -> Self {
        match setting {
            None | Some(CollectSetting::Flag(true)) => Collect::Own,
            Some(CollectSetting::Flag(false)) => Collect::Disabled,
            Some(CollectSetting::Name(name)) if name.trim().is_empty() => Collect::Own,
            Some(CollectSetting::Name(name)) => Collect::Type(name.trim().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
}

impl Granularity {
    const ORDERED: [Granularity; 6] = [
        Granularity::Year,
        Granularity::Month,
        Granularity::Day,
        Granularity::Hour,
        Granularity::Minute,
        Granularity::Second,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Year => "year",
            Granularity::Month => "month",
            Granularity::Day => "day",
            Granularity::Hour => "hour",
            Granularity::Minute => "minute",
            Granularity::Second => "second",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ORDERED
            .into_iter()
            .find(|granularity| granularity.as_str() == name)
    }

    /// Date components this archive level pins, coarsest first.
    pub fn components(&self) -> &'static [Granularity] {
        let depth = Self::ORDERED
            .iter()
            .position(|granularity| granularity == self)
            .unwrap_or(0);
        &Self::ORDERED[..=depth]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedFormat {
    Atom,
    Rss,
}

impl FeedFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedFormat::Atom => "atom",
            FeedFormat::Rss => "rss",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            FeedFormat::Atom => "application/atom+xml; charset=utf-8",
            FeedFormat::Rss => "application/rss+xml; charset=utf-8",
        }
    }
}

/// The handler a type route binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    Collection { paged: bool },
    Archive { granularity: Granularity, paged: bool },
    Feed(FeedFormat),
    Single,
    Term { paged: bool },
}

impl RouteKind {
    /// Symbolic suffix used in route names and `routing_paths` overrides.
    pub fn key(&self) -> String {
        let paged = |base: String, paged: bool| {
            if paged {
                format!("{}.paged", base)
            } else {
                base
            }
        };
        match self {
            RouteKind::Collection { paged: is_paged } => paged("collection".to_string(), *is_paged),
            RouteKind::Archive {
                granularity,
                paged: is_paged,
            } => paged(format!("collection.{}", granularity.as_str()), *is_paged),
            RouteKind::Feed(format) => format!("feed.{}", format.as_str()),
            RouteKind::Single => "single".to_string(),
            RouteKind::Term { paged: is_paged } => paged("term".to_string(), *is_paged),
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let (base, paged) = match key.strip_suffix(".paged") {
            Some(base) => (base, true),
            None => (key, false),
        };
        match base {
            "collection" => Some(RouteKind::Collection { paged }),
            "single" if !paged => Some(RouteKind::Single),
            "term" => Some(RouteKind::Term { paged }),
            "feed.atom" if !paged => Some(RouteKind::Feed(FeedFormat::Atom)),
            "feed.rss" if !paged => Some(RouteKind::Feed(FeedFormat::Rss)),
            other => other
                .strip_prefix("collection.")
                .and_then(Granularity::parse)
                .map(|granularity| RouteKind::Archive { granularity, paged }),
        }
    }

    fn default_suffix(&self) -> String {
        let paged_suffix = |paged: bool| if paged { "/page/{page}" } else { "" };
        match self {
            RouteKind::Collection { paged } => paged_suffix(*paged).trim_start_matches('/').to_string(),
            RouteKind::Archive { granularity, paged } => {
                let segments: Vec<String> = granularity
                    .components()
                    .iter()
                    .map(|component| format!("{{{}}}", component.as_str()))
                    .collect();
                format!("{}{}", segments.join("/"), paged_suffix(*paged))
            }
            RouteKind::Feed(format) => format!("feed/{}", format.as_str()),
            RouteKind::Single => "{name}".to_string(),
            RouteKind::Term { paged } => format!("{{name}}{}", paged_suffix(*paged)),
        }
    }
}

/// One route a content type contributes to the route table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteSpec {
    pub name: String,
    pub uri: String,
    pub kind: RouteKind,
    pub type_name: String,
}

#[derive(Debug, Clone)]
pub struct ContentType {
    name: String,
    path: String,
    title: String,
    is_public: bool,
    is_taxonomy: bool,
    collect: Collect,
    term_collect: Option<String>,
    has_routing: bool,
    routing_prefix: Option<String>,
    routing_paths: BTreeMap<String, String>,
    has_feed: bool,
    has_sitemap: bool,
    has_date_archives: bool,
    has_time_archives: bool,
    is_home_alias: bool,
    priority: i32,
    per_page: i64,
    order: Order,
    orderby: String,
    routes: OnceLock<Vec<RouteSpec>>,
}

impl ContentType {
    pub fn from_config(name: &str, config: &ContentTypeConfig, site: &SiteConfig) -> Self {
        let path = config
            .path
            .clone()
            .unwrap_or_else(|| name.to_string())
            .trim_matches('/')
            .to_string();

        Self {
            name: name.to_string(),
            path,
            title: config.title.clone().unwrap_or_else(|| name.to_string()),
            is_public: config.is_public,
            is_taxonomy: config.is_taxonomy,
            collect: Collect::from(config.collect.as_ref()),
            term_collect: config
                .term_collect
                .as_ref()
                .map(|term_collect| term_collect.trim().to_string())
                .filter(|term_collect| !term_collect.is_empty()),
            has_routing: config.has_routing,
            routing_prefix: config
                .routing_prefix
                .as_ref()
                .map(|prefix| prefix.trim_matches('/').to_string()),
            routing_paths: config.routing_paths.clone(),
            has_feed: config.has_feed,
            has_sitemap: config.has_sitemap,
            has_date_archives: config.has_date_archives,
            has_time_archives: config.has_time_archives,
            is_home_alias: site.home.as_deref() == Some(name),
            priority: config.priority,
            per_page: config
                .per_page
                .unwrap_or(site.per_page as i64),
            order: config.order.unwrap_or_default(),
            orderby: config
                .orderby
                .clone()
                .unwrap_or_else(|| QueryArgs::DEFAULT_ORDERBY.to_string()),
            routes: OnceLock::new(),
        }
    }

    /// Generic pages addressed by their folder hierarchy. Owns no routes of
    /// its own; the site's catch-all route serves it.
    pub fn page(site: &SiteConfig) -> Self {
        let config = ContentTypeConfig {
            path: Some(String::new()),
            has_routing: false,
            collect: Some(CollectSetting::Flag(false)),
            priority: i32::MIN,
            ..ContentTypeConfig::default()
        };
        Self::from_config(PAGE_TYPE, &config, site)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_public(&self) -> bool {
        self.is_public
    }

    pub fn is_taxonomy(&self) -> bool {
        self.is_taxonomy
    }

    pub fn is_page(&self) -> bool {
        self.name == PAGE_TYPE
    }

    pub fn has_routing(&self) -> bool {
        self.has_routing
    }

    pub fn has_feed(&self) -> bool {
        self.has_feed
    }

    pub fn has_sitemap(&self) -> bool {
        self.has_sitemap
    }

    /// Time archives imply date archives.
    pub fn has_date_archives(&self) -> bool {
        self.has_date_archives || self.has_time_archives
    }

    pub fn has_time_archives(&self) -> bool {
        self.has_time_archives
    }

    pub fn is_home_alias(&self) -> bool {
        self.is_home_alias
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    pub fn per_page(&self) -> i64 {
        self.per_page
    }

    pub fn collect(&self) -> Option<&str> {
        match &self.collect {
            Collect::Own => Some(&self.name),
            Collect::Type(name) => Some(name),
            Collect::Disabled => None,
        }
    }

    pub fn term_collect(&self) -> Option<&str> {
        self.term_collect.as_deref()
    }

    /// URL prefix the type's routes hang off.
    pub fn base(&self) -> &str {
        self.routing_prefix.as_deref().unwrap_or(&self.path)
    }

    pub fn route_template(&self, kind: &RouteKind) -> String {
        if let Some(template) = self.routing_paths.get(&kind.key()) {
            return template.trim_matches('/').to_string();
        }

        let suffix = kind.default_suffix();
        match (self.base(), suffix.as_str()) {
            (base, "") => base.to_string(),
            ("", suffix) => suffix.to_string(),
            (base, suffix) => format!("{}/{}", base, suffix),
        }
    }

    /// Routes in match-precedence order; computed once.
    pub fn routes(&self) -> &[RouteSpec] {
        self.routes.get_or_init(|| self.build_routes())
    }

    fn build_routes(&self) -> Vec<RouteSpec> {
        let mut kinds = Vec::new();
        let archived = self.collect().is_some();

        if archived && !self.is_home_alias {
            kinds.push(RouteKind::Collection { paged: true });
        }

        if archived && self.has_feed && !self.is_home_alias {
            kinds.push(RouteKind::Feed(FeedFormat::Atom));
            kinds.push(RouteKind::Feed(FeedFormat::Rss));
        }

        if archived && self.has_time_archives() {
            for granularity in [Granularity::Second, Granularity::Minute, Granularity::Hour] {
                kinds.push(RouteKind::Archive { granularity, paged: true });
                kinds.push(RouteKind::Archive { granularity, paged: false });
            }
        }

        if archived && self.has_date_archives() {
            for granularity in [Granularity::Day, Granularity::Month, Granularity::Year] {
                kinds.push(RouteKind::Archive { granularity, paged: true });
                kinds.push(RouteKind::Archive { granularity, paged: false });
            }
        }

        if self.is_taxonomy {
            kinds.push(RouteKind::Term { paged: true });
            kinds.push(RouteKind::Term { paged: false });
        } else {
            kinds.push(RouteKind::Single);
        }

        if archived && !self.is_home_alias {
            kinds.push(RouteKind::Collection { paged: false });
        }

        kinds
            .into_iter()
            .map(|kind| RouteSpec {
                name: format!("{}.{}", self.name, kind.key()),
                uri: self.route_template(&kind),
                kind,
                type_name: self.name.clone(),
            })
            .collect()
    }

    /// Fills a route template; unknown placeholders stay in place.
    pub fn url(&self, kind: &RouteKind, params: &[(&str, &str)]) -> String {
        let mut uri = self.route_template(kind);
        for (key, value) in params {
            uri = uri.replace(&format!("{{{}}}", key), value);
        }
        format!("/{}", uri.trim_matches('/'))
    }

    /// URL of one entry (or term) of this type.
    pub fn entry_url(&self, slug: &str) -> String {
        let kind = if self.is_taxonomy {
            RouteKind::Term { paged: false }
        } else {
            RouteKind::Single
        };
        self.url(&kind, &[("name", slug)])
    }

    pub fn collection_url(&self) -> String {
        if self.is_home_alias {
            return "/".to_string();
        }
        self.url(&RouteKind::Collection { paged: false }, &[])
    }

    fn seeded_args(&self, type_name: Option<&str>) -> QueryArgs {
        QueryArgs {
            type_name: type_name.map(str::to_string),
            number: self.per_page,
            order: self.order,
            orderby: self.orderby.clone(),
            visibility: Some(Visibility::Public),
            ..QueryArgs::default()
        }
    }

    /// Default query for this type's own archive.
    pub fn collection_args(&self) -> QueryArgs {
        self.seeded_args(self.collect())
    }

    /// Default query for one term's archive: entries of `term_collect` (or
    /// `collect`) whose front matter lists the term under this type's name.
    pub fn term_collection_args(&self, term: &str) -> QueryArgs {
        let target = self.term_collect().or_else(|| self.collect());
        QueryArgs {
            meta_key: Some(self.name.clone()),
            meta_value: Some(term.to_string()),
            ..self.seeded_args(target)
        }
    }

    pub fn feed_args(&self) -> QueryArgs {
        QueryArgs {
            offset: 0,
            ..self.collection_args()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteConfig {
        SiteConfig::new("Test", "https://example.com")
    }

    fn route_names(content_type: &ContentType) -> Vec<String> {
        content_type
            .routes()
            .iter()
            .map(|route| route.name.clone())
            .collect()
    }

    #[test]
    fn test_plain_type_routes() {
        let config = ContentTypeConfig {
            path: Some("posts".to_string()),
            ..ContentTypeConfig::default()
        };
        let post = ContentType::from_config("post", &config, &site());

        assert_eq!(
            route_names(&post),
            vec!["post.collection.paged", "post.single", "post.collection"]
        );
        let uris: Vec<&str> = post.routes().iter().map(|route| route.uri.as_str()).collect();
        assert_eq!(uris, vec!["posts/page/{page}", "posts/{name}", "posts"]);
    }

    #[test]
    fn test_full_route_precedence() {
        let config = ContentTypeConfig {
            path: Some("posts".to_string()),
            has_feed: true,
            has_time_archives: true,
            ..ContentTypeConfig::default()
        };
        let post = ContentType::from_config("post", &config, &site());

        assert!(post.has_date_archives());
        assert_eq!(
            route_names(&post),
            vec![
                "post.collection.paged",
                "post.feed.atom",
                "post.feed.rss",
                "post.collection.second.paged",
                "post.collection.second",
                "post.collection.minute.paged",
                "post.collection.minute",
                "post.collection.hour.paged",
                "post.collection.hour",
                "post.collection.day.paged",
                "post.collection.day",
                "post.collection.month.paged",
                "post.collection.month",
                "post.collection.year.paged",
                "post.collection.year",
                "post.single",
                "post.collection",
            ]
        );

        let year_paged = post
            .routes()
            .iter()
            .find(|route| route.name == "post.collection.year.paged")
            .unwrap();
        assert_eq!(year_paged.uri, "posts/{year}/page/{page}");

        let second = post
            .routes()
            .iter()
            .find(|route| route.name == "post.collection.second")
            .unwrap();
        assert_eq!(
            second.uri,
            "posts/{year}/{month}/{day}/{hour}/{minute}/{second}"
        );
    }

    #[test]
    fn test_home_alias_skips_collection_and_feeds() {
        let mut site = site();
        site.home = Some("post".to_string());
        let config = ContentTypeConfig {
            path: Some("posts".to_string()),
            has_feed: true,
            ..ContentTypeConfig::default()
        };
        let post = ContentType::from_config("post", &config, &site);

        assert!(post.is_home_alias());
        assert_eq!(route_names(&post), vec!["post.single"]);
        assert_eq!(post.collection_url(), "/");
    }

    #[test]
    fn test_taxonomy_emits_term_routes() {
        let config = ContentTypeConfig {
            path: Some("tags".to_string()),
            is_taxonomy: true,
            term_collect: Some("post".to_string()),
            ..ContentTypeConfig::default()
        };
        let tag = ContentType::from_config("tag", &config, &site());

        let names = route_names(&tag);
        assert_eq!(names, vec!["tag.collection.paged", "tag.term.paged", "tag.term", "tag.collection"]);
        assert!(!names.iter().any(|name| name == "tag.single"));
        assert_eq!(tag.entry_url("rust"), "/tags/rust");
    }

    #[test]
    fn test_disabled_collect_drops_archive_routes() {
        let config = ContentTypeConfig {
            path: Some("tags".to_string()),
            is_taxonomy: true,
            collect: Some(CollectSetting::Flag(false)),
            ..ContentTypeConfig::default()
        };
        let tag = ContentType::from_config("tag", &config, &site());

        assert_eq!(tag.collect(), None);
        assert_eq!(route_names(&tag), vec!["tag.term.paged", "tag.term"]);
    }

    #[test]
    fn test_collect_is_never_empty() {
        let config = ContentTypeConfig {
            collect: Some(CollectSetting::Name("  ".to_string())),
            ..ContentTypeConfig::default()
        };
        let series = ContentType::from_config("series", &config, &site());
        assert_eq!(series.collect(), Some("series"));

        let config = ContentTypeConfig {
            collect: Some(CollectSetting::Name("post".to_string())),
            ..ContentTypeConfig::default()
        };
        let series = ContentType::from_config("series", &config, &site());
        assert_eq!(series.collect(), Some("post"));
    }

    #[test]
    fn test_routing_prefix_and_overrides() {
        let mut routing_paths = BTreeMap::new();
        routing_paths.insert("single".to_string(), "/blog/read/{name}/".to_string());
        let config = ContentTypeConfig {
            path: Some("posts".to_string()),
            routing_prefix: Some("/blog/".to_string()),
            routing_paths,
            ..ContentTypeConfig::default()
        };
        let post = ContentType::from_config("post", &config, &site());

        let uris: Vec<&str> = post.routes().iter().map(|route| route.uri.as_str()).collect();
        assert_eq!(uris, vec!["blog/page/{page}", "blog/read/{name}", "blog"]);
        assert_eq!(post.entry_url("hello"), "/blog/read/hello");
        assert_eq!(post.collection_url(), "/blog");
    }

    #[test]
    fn test_collection_args_seed_type_and_overrides() {
        let config = ContentTypeConfig {
            path: Some("posts".to_string()),
            per_page: Some(5),
            order: Some(Order::Desc),
            orderby: Some("date".to_string()),
            ..ContentTypeConfig::default()
        };
        let post = ContentType::from_config("post", &config, &site());

        let args = post.collection_args();
        assert_eq!(args.type_name.as_deref(), Some("post"));
        assert_eq!(args.number, 5);
        assert_eq!(args.order, Order::Desc);
        assert_eq!(args.orderby, "date");
        assert_eq!(args.visibility, Some(Visibility::Public));

        let feed = post.feed_args();
        assert_eq!(feed.type_name.as_deref(), Some("post"));
        assert_eq!(feed.offset, 0);
    }

    #[test]
    fn test_term_collection_args_fall_back_to_collect() {
        let config = ContentTypeConfig {
            path: Some("tags".to_string()),
            is_taxonomy: true,
            term_collect: Some("post".to_string()),
            ..ContentTypeConfig::default()
        };
        let tag = ContentType::from_config("tag", &config, &site());
        let args = tag.term_collection_args("rust");
        assert_eq!(args.type_name.as_deref(), Some("post"));
        assert_eq!(args.meta_key.as_deref(), Some("tag"));
        assert_eq!(args.meta_value.as_deref(), Some("rust"));
        assert_eq!(args.number, 10);

        let config = ContentTypeConfig {
            is_taxonomy: true,
            ..ContentTypeConfig::default()
        };
        let category = ContentType::from_config("category", &config, &site());
        assert_eq!(
            category.term_collection_args("x").type_name.as_deref(),
            Some("category")
        );
    }

    #[test]
    fn test_route_kind_keys_round_trip() {
        let kinds = [
            RouteKind::Collection { paged: true },
            RouteKind::Collection { paged: false },
            RouteKind::Archive {
                granularity: Granularity::Month,
                paged: true,
            },
            RouteKind::Feed(FeedFormat::Rss),
            RouteKind::Single,
            RouteKind::Term { paged: true },
        ];
        for kind in kinds {
            assert_eq!(RouteKind::from_key(&kind.key()), Some(kind));
        }
        assert_eq!(RouteKind::from_key("nonsense"), None);
    }

    #[test]
    fn test_page_type_has_no_routes_of_its_own() {
        let page = ContentType::page(&site());
        assert!(page.is_page());
        assert_eq!(page.path(), "");
        assert!(!page.has_routing());
        assert_eq!(page.collect(), None);
    }
}
