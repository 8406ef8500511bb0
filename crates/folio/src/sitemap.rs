use crate::xml::{absolute_url, escape};
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// One `<url>` record; `path` is root-relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitemapUrl {
    pub path: String,
    pub lastmod: Option<DateTime<Utc>>,
}

impl SitemapUrl {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            lastmod: None,
        }
    }

    pub fn with_lastmod(mut self, lastmod: Option<DateTime<Utc>>) -> Self {
        self.lastmod = lastmod;
        self
    }
}

/// Serializes `urls` in order, keeping the first record for each path and
/// leaving out the 404 page.
pub fn render_sitemap(base_url: &str, urls: &[SitemapUrl]) -> String {
    let mut seen = HashSet::new();
    let mut records = String::new();

    for url in urls {
        if url.path.trim_matches('/') == "404" || !seen.insert(url.path.as_str()) {
            continue;
        }

        let lastmod = url
            .lastmod
            .map(|lastmod| format!("\n    <lastmod>{}</lastmod>", lastmod.format("%Y-%m-%d")))
            .unwrap_or_default();

        records.push_str(&format!(
            "  <url>\n    <loc>{}</loc>{}\n  </url>\n",
            escape(&absolute_url(base_url, &url.path)),
            lastmod
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
{}</urlset>
"#,
        records
    )
}
