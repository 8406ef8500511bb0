use crate::error::{FolioError, Result};
use regex::Regex;
use std::collections::{BTreeMap, HashMap};

pub const PATH_PARAM: &str = "path";

/// What a `{param}` placeholder accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Slug,
    Alpha,
    Alphanumeric,
    Numeric,
    Year,
    TwoDigit,
    Path,
    /// A caller-supplied regular expression.
    Pattern(String),
}

impl ParamKind {
    /// Default kind for a placeholder, chosen by its name.
    pub fn for_param(name: &str) -> Self {
        match name {
            "year" => ParamKind::Year,
            "month" | "day" | "hour" | "minute" | "second" => ParamKind::TwoDigit,
            "page" => ParamKind::Numeric,
            PATH_PARAM => ParamKind::Path,
            _ => ParamKind::Slug,
        }
    }

    /// Reads a `where` constraint: a kind name, or else a raw pattern.
    pub fn parse(constraint: &str) -> Self {
        match constraint {
            "slug" => ParamKind::Slug,
            "alpha" => ParamKind::Alpha,
            "alphanumeric" | "alnum" => ParamKind::Alphanumeric,
            "numeric" | "number" => ParamKind::Numeric,
            "year" => ParamKind::Year,
            "month" | "day" | "hour" | "minute" | "second" => ParamKind::TwoDigit,
            "path" | "any" => ParamKind::Path,
            pattern => ParamKind::Pattern(pattern.to_string()),
        }
    }

    pub fn pattern(&self) -> &str {
        match self {
            ParamKind::Slug => "[A-Za-z0-9_.-]+",
            ParamKind::Alpha => "[A-Za-z]+",
            ParamKind::Alphanumeric => "[A-Za-z0-9]+",
            ParamKind::Numeric => "[0-9]+",
            ParamKind::Year => "[0-9]{4}",
            ParamKind::TwoDigit => "[0-9]{2}",
            ParamKind::Path => ".+",
            ParamKind::Pattern(pattern) => pattern,
        }
    }
}

/// Trims surrounding slashes; the root stays `/`.
pub fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

enum Segment {
    Literal(String),
    Param(String),
}

fn tokenize(uri: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut rest = uri;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|close| open + close) else {
            break;
        };
        if open > 0 {
            segments.push(Segment::Literal(rest[..open].to_string()));
        }
        segments.push(Segment::Param(rest[open + 1..close].trim().to_string()));
        rest = &rest[close + 1..];
    }
    if !rest.is_empty() {
        segments.push(Segment::Literal(rest.to_string()));
    }

    segments
}

/// Parameters captured by a route match, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    values: Vec<(String, String)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.values.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.values.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|value| value.parse().ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A URI template bound to a handler. Routes without placeholders are
/// literal and skip regex matching entirely.
#[derive(Debug, Clone)]
pub struct Route<H> {
    name: Option<String>,
    uri: String,
    params: Vec<String>,
    pattern: Option<Regex>,
    handler: H,
}

impl<H> Route<H> {
    pub fn new(uri: &str, handler: H) -> Result<Self> {
        Self::with_constraints(uri, handler, &BTreeMap::new())
    }

    /// Builds a route whose placeholders use `constraints` instead of the
    /// default kind for their name.
    pub fn with_constraints(
        uri: &str,
        handler: H,
        constraints: &BTreeMap<String, ParamKind>,
    ) -> Result<Self> {
        let uri = normalize(uri);
        let segments = tokenize(&uri);

        let params: Vec<String> = segments
            .iter()
            .filter_map(|segment| match segment {
                Segment::Param(name) => Some(name.clone()),
                Segment::Literal(_) => None,
            })
            .collect();

        let pattern = if params.is_empty() {
            None
        } else {
            let mut source = String::from("^");
            for segment in &segments {
                match segment {
                    Segment::Literal(text) => source.push_str(&regex::escape(text)),
                    Segment::Param(name) => {
                        let kind = constraints
                            .get(name)
                            .cloned()
                            .unwrap_or_else(|| ParamKind::for_param(name));
                        source.push_str(&format!("(?P<{}>{})", name, kind.pattern()));
                    }
                }
            }
            source.push('$');

            let compiled = Regex::new(&source).map_err(|source| FolioError::RoutePattern {
                uri: uri.clone(),
                source,
            })?;
            Some(compiled)
        };

        Ok(Self {
            name: None,
            uri,
            params,
            pattern,
            handler,
        })
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }

    pub fn handler(&self) -> &H {
        &self.handler
    }

    pub fn is_literal(&self) -> bool {
        self.pattern.is_none()
    }

    /// Matches an already normalized path.
    pub fn matches(&self, path: &str) -> Option<Params> {
        let mut params = Params::new();

        match &self.pattern {
            None if self.uri == path => {}
            None => return None,
            Some(pattern) => {
                let captures = pattern.captures(path)?;
                for name in &self.params {
                    if let Some(value) = captures.name(name) {
                        params.insert(name.clone(), value.as_str());
                    }
                }
            }
        }

        if !self.params.iter().any(|name| name == PATH_PARAM) {
            params.insert(PATH_PARAM, path);
        }
        Some(params)
    }

    /// Fills the template; placeholders without a value are left in place.
    pub fn url(&self, params: &[(&str, &str)]) -> String {
        let mut uri = self.uri.clone();
        for (name, value) in params {
            uri = uri.replace(&format!("{{{}}}", name), value);
        }
        if uri == "/" {
            uri
        } else {
            format!("/{}", uri)
        }
    }
}

/// Outcome of a dispatch: the winning route and its parameters.
#[derive(Debug)]
pub struct Matched<'a, H> {
    pub route: &'a Route<H>,
    pub params: Params,
}

/// Ordered route table. Literal routes win first through an exact lookup;
/// otherwise the first templated route in registration order matches.
#[derive(Debug, Clone)]
pub struct Router<H> {
    routes: Vec<Route<H>>,
    literals: HashMap<String, usize>,
    names: HashMap<String, usize>,
}

impl<H> Default for Router<H> {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            literals: HashMap::new(),
            names: HashMap::new(),
        }
    }
}

impl<H> Router<H> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, route: Route<H>) -> Result<()> {
        let position = self.routes.len();

        if let Some(name) = route.name() {
            if self.names.contains_key(name) {
                return Err(FolioError::DuplicateRoute {
                    name: name.to_string(),
                });
            }
            self.names.insert(name.to_string(), position);
        }

        if route.is_literal() {
            self.literals.entry(route.uri().to_string()).or_insert(position);
        }

        self.routes.push(route);
        Ok(())
    }

    pub fn routes(&self) -> &[Route<H>] {
        &self.routes
    }

    pub fn route(&self, name: &str) -> Option<&Route<H>> {
        self.names.get(name).map(|position| &self.routes[*position])
    }

    pub fn dispatch(&self, path: &str) -> Option<Matched<'_, H>> {
        let path = normalize(path);

        if let Some(position) = self.literals.get(&path) {
            let route = &self.routes[*position];
            if let Some(params) = route.matches(&path) {
                tracing::debug!(path = %path, route = route.uri(), "literal route matched");
                return Some(Matched { route, params });
            }
        }

        let matched = self
            .routes
            .iter()
            .filter(|route| !route.is_literal())
            .find_map(|route| route.matches(&path).map(|params| Matched { route, params }));

        match &matched {
            Some(matched) => {
                tracing::debug!(path = %path, route = matched.route.uri(), "route matched")
            }
            None => tracing::debug!(path = %path, "no route matched"),
        }
        matched
    }

    /// Reverse routing by symbolic name.
    pub fn url(&self, name: &str, params: &[(&str, &str)]) -> Option<String> {
        self.route(name).map(|route| route.url(params))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
