use crate::cache::{FileCache, KeyedCache};
use crate::config::{RouteConfig, SiteConfig};
use crate::content_type::{ContentType, FeedFormat, RouteKind, RouteSpec};
use crate::entry::Entry;
use crate::error::{FolioError, Result};
use crate::feeds::{self, FeedChannel, FeedItem};
use crate::locator::Locator;
use crate::parsing::PulldownConverter;
use crate::query::{Query, QueryArgs};
use crate::registry::TypeRegistry;
use crate::resources::Resources;
use crate::router::{PATH_PARAM, ParamKind, Params, Route, Router};
use crate::sitemap::{SitemapUrl, render_sitemap};
use crate::theme::{
    COLLECTION, ContentTypeView, EntryView, NOT_FOUND, PaginationView, SINGLE, SiteView, TERM,
    Theme,
};
use crate::types::Visibility;
use crate::xml::absolute_url;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tera::Context;
use walkdir::WalkDir;

const DATE_PARAMS: [&str; 6] = ["year", "month", "day", "hour", "minute", "second"];

/// Handler a route dispatches to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Home,
    Collection(String),
    Term(String),
    Single(String),
    Feed(String, FeedFormat),
    Page,
    Sitemap,
}

impl Action {
    fn for_route(spec: &RouteSpec) -> Self {
        let type_name = spec.type_name.clone();
        match spec.kind {
            RouteKind::Collection { .. } | RouteKind::Archive { .. } => {
                Action::Collection(type_name)
            }
            RouteKind::Feed(format) => Action::Feed(type_name, format),
            RouteKind::Single => Action::Single(type_name),
            RouteKind::Term { .. } => Action::Term(type_name),
        }
    }

    /// Resolves the handler named by a configured route. Unknown handlers
    /// and unknown or missing types are boot errors.
    pub fn from_config(route: &RouteConfig, registry: &TypeRegistry) -> Result<Self> {
        let type_name = || match &route.type_name {
            Some(name) if registry.get(name).is_some() => Ok(name.clone()),
            other => Err(FolioError::UnknownType {
                name: other.clone().unwrap_or_default(),
                context: format!("route '{}'", route.uri),
            }),
        };

        match route.handler.as_str() {
            "home" => Ok(Action::Home),
            "collection" => Ok(Action::Collection(type_name()?)),
            "term" => Ok(Action::Term(type_name()?)),
            "single" => Ok(Action::Single(type_name()?)),
            "feed" | "feed.atom" => Ok(Action::Feed(type_name()?, FeedFormat::Atom)),
            "feed.rss" => Ok(Action::Feed(type_name()?, FeedFormat::Rss)),
            "page" => Ok(Action::Page),
            "sitemap" => Ok(Action::Sitemap),
            other => Err(FolioError::UnknownHandler {
                name: other.to_string(),
                uri: route.uri.clone(),
            }),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Home => write!(formatter, "home"),
            Action::Collection(type_name) => write!(formatter, "collection({})", type_name),
            Action::Term(type_name) => write!(formatter, "term({})", type_name),
            Action::Single(type_name) => write!(formatter, "single({})", type_name),
            Action::Feed(type_name, format) => {
                write!(formatter, "feed.{}({})", format.as_str(), type_name)
            }
            Action::Page => write!(formatter, "page"),
            Action::Sitemap => write!(formatter, "sitemap"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl Response {
    pub const HTML: &'static str = "text/html; charset=utf-8";
    pub const XML: &'static str = "application/xml; charset=utf-8";
    pub const TEXT: &'static str = "text/plain; charset=utf-8";

    pub fn new(status: u16, content_type: &'static str, body: impl Into<String>) -> Self {
        Self {
            status,
            content_type,
            body: body.into(),
        }
    }

    pub fn html(body: impl Into<String>) -> Self {
        Self::new(200, Self::HTML, body)
    }

    /// What a path no route matches gets.
    pub fn empty() -> Self {
        Self::new(200, Self::TEXT, "")
    }

    pub fn server_error() -> Self {
        Self::new(500, Self::TEXT, "Internal Server Error")
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub struct SiteBuilder {
    site_dir: PathBuf,
    config: Option<SiteConfig>,
    base_url_override: Option<String>,
    cache: Option<Arc<dyn KeyedCache>>,
}

impl SiteBuilder {
    pub fn new(site_dir: impl AsRef<Path>) -> Self {
        Self {
            site_dir: site_dir.as_ref().to_path_buf(),
            config: None,
            base_url_override: None,
            cache: None,
        }
    }

    /// Uses `config` instead of reading `folio.toml`.
    pub fn config(mut self, config: SiteConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url_override = Some(url.into());
        self
    }

    /// Replaces the on-disk cache under `cache_dir`.
    pub fn cache(mut self, cache: Arc<dyn KeyedCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Site> {
        let mut config = match self.config {
            Some(config) => config,
            None => SiteConfig::load(&self.site_dir)?,
        };

        if let Some(url) = self.base_url_override {
            config.base_url = url.trim_end_matches('/').to_string();
        }

        let registry = TypeRegistry::from_config(&config)?;
        let router = build_router(&config, &registry)?;
        let theme = Theme::load(&self.site_dir)?;

        let cache = self.cache.unwrap_or_else(|| {
            Arc::new(FileCache::new(self.site_dir.join(&config.cache_dir))) as Arc<dyn KeyedCache>
        });
        let converter = Arc::new(PulldownConverter::with_theme(&config.syntax_theme));
        let content_dir = self.site_dir.join(&config.content_dir);

        tracing::info!(
            types = registry.len(),
            routes = router.len(),
            content_dir = %content_dir.display(),
            "site loaded"
        );

        Ok(Site {
            site_dir: self.site_dir,
            resources: Resources::new(
                content_dir,
                Arc::new(config),
                Arc::new(registry),
                cache,
                converter,
            ),
            router,
            theme,
        })
    }
}

/// Route table in dispatch order: sitemap, home, each routable public type,
/// configured routes, then the catch-all page route.
pub fn build_router(config: &SiteConfig, registry: &TypeRegistry) -> Result<Router<Action>> {
    let mut router = Router::new();

    router.add(Route::new("sitemap.xml", Action::Sitemap)?.named("sitemap"))?;
    router.add(Route::new("/", Action::Home)?.named("home"))?;

    if let Some(home) = config.home.as_deref().and_then(|name| registry.get(name)) {
        if home.collect().is_some() {
            router.add(Route::new("page/{page}", Action::Home)?.named("home.paged"))?;
        }
        if home.has_feed() {
            for format in [FeedFormat::Atom, FeedFormat::Rss] {
                let uri = format!("feed/{}", format.as_str());
                let action = Action::Feed(home.name().to_string(), format);
                let name = format!("home.feed.{}", format.as_str());
                router.add(Route::new(&uri, action)?.named(name))?;
            }
        }
    }

    for content_type in registry
        .iter()
        .filter(|content_type| content_type.has_routing() && content_type.is_public())
    {
        for spec in content_type.routes() {
            router.add(Route::new(&spec.uri, Action::for_route(spec))?.named(spec.name.clone()))?;
        }
    }

    for custom in &config.routes {
        let action = Action::from_config(custom, registry)?;
        let constraints: BTreeMap<String, ParamKind> = custom
            .constraints
            .iter()
            .map(|(param, constraint)| (param.clone(), ParamKind::parse(constraint)))
            .collect();
        let route = Route::with_constraints(&custom.uri, action, &constraints)?;
        let route = match &custom.name {
            Some(name) => route.named(name.clone()),
            None => route,
        };
        router.add(route)?;
    }

    router.add(Route::new(&format!("{{{}}}", PATH_PARAM), Action::Page)?.named("page"))?;

    Ok(router)
}

/// A loaded site: shared, read-only state plus the request entry point.
pub struct Site {
    site_dir: PathBuf,
    resources: Resources,
    router: Router<Action>,
    theme: Theme,
}

impl Site {
    pub fn load(site_dir: impl AsRef<Path>) -> Result<Self> {
        SiteBuilder::new(site_dir).build()
    }

    pub fn site_dir(&self) -> &Path {
        &self.site_dir
    }

    pub fn static_dir(&self) -> PathBuf {
        self.site_dir.join("static")
    }

    pub fn config(&self) -> &SiteConfig {
        &self.resources.config
    }

    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    pub fn router(&self) -> &Router<Action> {
        &self.router
    }

    /// Evicts the cached scan of a content folder after it changed.
    pub fn forget(&self, folder: &str) {
        tracing::debug!(folder, "evicting folder scan");
        self.resources.locator().forget(folder);
    }

    pub fn url(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        self.router.url(name, params)
    }

    pub fn handle(&self, path: &str) -> Response {
        let Some(matched) = self.router.dispatch(path) else {
            return Response::empty();
        };

        match self.run(matched.route.handler(), &matched.params, matched.route.name()) {
            Ok(Some(response)) => response,
            Ok(None) => self.not_found(path),
            Err(error) => {
                tracing::error!(path, %error, "failed to render");
                Response::server_error()
            }
        }
    }

    fn run(
        &self,
        action: &Action,
        params: &Params,
        route_name: Option<&str>,
    ) -> Result<Option<Response>> {
        let registry = &self.resources.registry;

        match action {
            Action::Home => self.home(params, route_name),
            Action::Collection(type_name) => match registry.get(type_name) {
                Some(content_type) => self.collection(content_type, params, route_name),
                None => Ok(None),
            },
            Action::Term(type_name) => match registry.get(type_name) {
                Some(content_type) => self.term(content_type, params, route_name),
                None => Ok(None),
            },
            Action::Single(type_name) => match registry.get(type_name) {
                Some(content_type) => self.single(content_type, params),
                None => Ok(None),
            },
            Action::Feed(type_name, format) => match registry.get(type_name) {
                Some(content_type) => self.feed(content_type, *format),
                None => Ok(None),
            },
            Action::Page => self.page(params),
            Action::Sitemap => self.sitemap(),
        }
    }

    fn context(&self) -> Context {
        let mut context = Context::new();
        context.insert("site", &SiteView::new(self.config()));
        context
    }

    fn home(&self, params: &Params, route_name: Option<&str>) -> Result<Option<Response>> {
        if let Some(home) = self
            .config()
            .home
            .as_deref()
            .and_then(|name| self.resources.registry.get(name))
        {
            return self.collection(home, params, route_name);
        }

        match self.find_page("")? {
            Some(entry) => self.render_entry(&entry).map(Some),
            None => Ok(None),
        }
    }

    fn collection(
        &self,
        content_type: &ContentType,
        params: &Params,
        route_name: Option<&str>,
    ) -> Result<Option<Response>> {
        let Some(page) = page_param(params) else {
            return Ok(None);
        };

        let mut args = content_type.collection_args();
        let archive = apply_date_params(&mut args, params);
        let query = Query::from_args(&self.resources, args.with_page(page));

        let is_strict = params.get("page").is_some() || archive.is_some();
        if is_strict && !query.has_entries() {
            return Ok(None);
        }

        let mut context = self.context();
        context.insert("content_type", &ContentTypeView::new(content_type));
        context.insert("entries", &self.listing(&query)?);
        context.insert("archive", &archive);
        context.insert("pagination", &self.pagination(&query, params, route_name));

        let custom = format!("{}_collection.html", content_type.name());
        let template = self.theme.pick(&[custom.as_str()], COLLECTION);
        Ok(Some(Response::html(self.theme.render(template, &context)?)))
    }

    fn term(
        &self,
        taxonomy: &ContentType,
        params: &Params,
        route_name: Option<&str>,
    ) -> Result<Option<Response>> {
        let (Some(name), Some(page)) = (params.get("name"), page_param(params)) else {
            return Ok(None);
        };

        let term_query = Query::new(&self.resources, taxonomy.path(), single_args(name));
        let entries = Query::from_args(
            &self.resources,
            taxonomy.term_collection_args(name).with_page(page),
        );

        let is_paged = params.get("page").is_some();
        if !entries.has_entries() && (is_paged || term_query.first().is_none()) {
            return Ok(None);
        }

        let term = term_query
            .first()
            .map(|term| EntryView::build(term, &self.resources, true))
            .transpose()?;

        let mut context = self.context();
        context.insert("content_type", &ContentTypeView::new(taxonomy));
        context.insert("name", name);
        context.insert("term", &term);
        context.insert("entries", &self.listing(&entries)?);
        context.insert("pagination", &self.pagination(&entries, params, route_name));

        let custom = format!("{}_term.html", taxonomy.name());
        let template = self.theme.pick(&[custom.as_str()], TERM);
        Ok(Some(Response::html(self.theme.render(template, &context)?)))
    }

    fn single(&self, content_type: &ContentType, params: &Params) -> Result<Option<Response>> {
        let Some(name) = params.get("name") else {
            return Ok(None);
        };

        let query = Query::new(&self.resources, content_type.path(), single_args(name));
        match query.first() {
            Some(entry) => self.render_entry(entry).map(Some),
            None => Ok(None),
        }
    }

    fn page(&self, params: &Params) -> Result<Option<Response>> {
        let path = params.get(PATH_PARAM).unwrap_or_default();
        match self.find_page(path)? {
            Some(entry) => self.render_entry(&entry).map(Some),
            None => Ok(None),
        }
    }

    /// Looks `path` up as `dir/name.md`, then as `path/index.md`.
    fn find_page(&self, path: &str) -> Result<Option<Entry>> {
        let path = path.trim_matches('/');
        if !Locator::is_contained(path) {
            return Ok(None);
        }
        let (directory, name) = path.rsplit_once('/').unwrap_or(("", path));

        for (directory, slug) in [(directory, name), (path, "index")] {
            if slug.is_empty() {
                continue;
            }
            let query = Query::new(&self.resources, directory, single_args(slug));
            if let Some(entry) = query.into_entries().into_iter().next() {
                return Ok(Some(entry));
            }
        }

        Ok(None)
    }

    fn render_entry(&self, entry: &Entry) -> Result<Response> {
        let view = EntryView::build(entry, &self.resources, true)?;

        let requested = entry.meta()?.get_string("template");
        let by_type = format!("{}.html", view.type_name);
        let template = match requested.as_deref() {
            Some(requested) if self.theme.has_template(requested) => requested,
            _ => self.theme.pick(&[by_type.as_str()], SINGLE),
        };

        let mut context = self.context();
        context.insert("entry", &view);
        Ok(Response::html(self.theme.render(template, &context)?))
    }

    /// Entries of the current page, without their full content.
    fn listing(&self, query: &Query) -> Result<Vec<EntryView>> {
        query
            .all()
            .iter()
            .map(|entry| EntryView::build(entry, &self.resources, false))
            .collect()
    }

    /// Previous/next links through the route's paged twin, found by name.
    fn pagination(
        &self,
        query: &Query,
        params: &Params,
        route_name: Option<&str>,
    ) -> PaginationView {
        let page = query.page();
        let pages = query.pages();

        let link = |target: usize| -> Option<String> {
            let name = route_name?;
            let plain = name.strip_suffix(".paged").unwrap_or(name);
            let paged = format!("{}.paged", plain);

            let target_page = target.to_string();
            let mut values: Vec<(&str, &str)> = params
                .iter()
                .filter(|(param, _)| *param != "page" && *param != PATH_PARAM)
                .collect();

            if target <= 1 {
                self.router.url(plain, &values)
            } else {
                values.push(("page", &target_page));
                self.router.url(&paged, &values)
            }
        };

        PaginationView {
            page,
            pages,
            total: query.total(),
            previous: if page > 1 { link(page - 1) } else { None },
            next: if page < pages { link(page + 1) } else { None },
        }
    }

    fn feed(&self, content_type: &ContentType, format: FeedFormat) -> Result<Option<Response>> {
        if !content_type.has_feed() {
            return Ok(None);
        }

        let config = self.config();
        let query = Query::from_args(&self.resources, content_type.feed_args());

        let mut items = Vec::with_capacity(query.count());
        for entry in query.all() {
            items.push(FeedItem {
                title: entry.title()?,
                url: absolute_url(&config.base_url, &entry.url()?),
                published: entry.published()?,
                updated: entry.updated()?,
                author: entry.author()?,
                summary: entry.summary()?,
                content: entry.content()?.to_string(),
            });
        }

        let feed_path = if content_type.is_home_alias() {
            format!("/feed/{}", format.as_str())
        } else {
            content_type.url(&RouteKind::Feed(format), &[])
        };

        let channel = FeedChannel {
            title: format!("{} - {}", config.title, content_type.title()),
            site_url: absolute_url(&config.base_url, &content_type.collection_url()),
            self_url: absolute_url(&config.base_url, &feed_path),
            description: config.description.clone().unwrap_or_default(),
            language: config.language.clone().unwrap_or_else(|| "en".to_string()),
            author: config.author.clone().unwrap_or_else(|| config.title.clone()),
        };

        let body = feeds::render(format, &channel, &items);
        Ok(Some(Response::new(200, format.mime_type(), body)))
    }

    fn sitemap(&self) -> Result<Option<Response>> {
        let registry = &self.resources.registry;
        let mut urls = vec![SitemapUrl::new("/")];

        for content_type in registry.iter().filter(|content_type| {
            !content_type.is_page()
                && content_type.has_sitemap()
                && content_type.is_public()
                && content_type.has_routing()
        }) {
            if content_type.collect().is_some() {
                urls.push(SitemapUrl::new(content_type.collection_url()));
            }

            let args = QueryArgs {
                type_name: Some(content_type.name().to_string()),
                visibility: Some(Visibility::Public),
                no_content: true,
                ..QueryArgs::default()
            };
            self.push_entries(&mut urls, &Query::from_args(&self.resources, args))?;
        }

        if registry
            .page_type()
            .is_some_and(|page_type| page_type.has_sitemap())
        {
            for directory in self.page_directories() {
                let args = QueryArgs {
                    visibility: Some(Visibility::Public),
                    no_content: true,
                    ..QueryArgs::default()
                };
                self.push_entries(&mut urls, &Query::new(&self.resources, &directory, args))?;
            }
        }

        let body = render_sitemap(&self.config().base_url, &urls);
        Ok(Some(Response::new(200, Response::XML, body)))
    }

    fn push_entries(&self, urls: &mut Vec<SitemapUrl>, query: &Query) -> Result<()> {
        for entry in query.all() {
            urls.push(SitemapUrl::new(entry.url()?).with_lastmod(entry.updated()?));
        }
        Ok(())
    }

    /// Content folders not owned by a registered type.
    fn page_directories(&self) -> Vec<String> {
        let owned: HashSet<&str> = self
            .resources
            .registry
            .iter()
            .filter(|content_type| !content_type.is_page())
            .map(|content_type| content_type.path())
            .collect();

        WalkDir::new(&self.resources.content_dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| self.resources.relative(entry.path()))
            .filter(|relative| !owned.contains(relative.as_str()))
            .collect()
    }

    fn not_found(&self, path: &str) -> Response {
        let mut context = self.context();
        context.insert("path", path);
        match self.theme.render(NOT_FOUND, &context) {
            Ok(body) => Response::html(body).with_status(404),
            Err(error) => {
                tracing::error!(%error, "failed to render not found page");
                Response::new(404, Response::TEXT, "Not Found")
            }
        }
    }
}

/// `None` for a page number that can never exist.
fn page_param(params: &Params) -> Option<i64> {
    match params.get("page") {
        None => Some(1),
        Some(_) => params.get_i64("page").filter(|page| *page >= 1),
    }
}

fn single_args(slug: &str) -> QueryArgs {
    QueryArgs {
        number: 1,
        ..QueryArgs::default()
    }
    .with_slug(slug)
}

/// Copies date route parameters into the query; returns the archive label
/// (`2024/03`) when any were present.
fn apply_date_params(args: &mut QueryArgs, params: &Params) -> Option<String> {
    let slots = [
        &mut args.year,
        &mut args.month,
        &mut args.day,
        &mut args.hour,
        &mut args.minute,
        &mut args.second,
    ];

    let mut label = Vec::new();
    for (name, slot) in DATE_PARAMS.iter().zip(slots) {
        if let Some(value) = params.get(name) {
            *slot = value.parse().ok();
            label.push(value);
        }
    }

    if label.is_empty() {
        None
    } else {
        Some(label.join("/"))
    }
}
