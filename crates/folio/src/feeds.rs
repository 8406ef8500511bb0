use crate::content_type::FeedFormat;
use crate::xml::escape;
use chrono::{DateTime, Utc};

/// Feed-level metadata. URLs are absolute.
#[derive(Debug, Clone)]
pub struct FeedChannel {
    pub title: String,
    pub site_url: String,
    pub self_url: String,
    pub description: String,
    pub language: String,
    pub author: String,
}

#[derive(Debug, Clone)]
pub struct FeedItem {
    pub title: String,
    pub url: String,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub author: Option<String>,
    pub summary: String,
    pub content: String,
}

impl FeedItem {
    fn timestamp(&self) -> Option<DateTime<Utc>> {
        self.updated.or(self.published)
    }
}

pub fn render(format: FeedFormat, channel: &FeedChannel, items: &[FeedItem]) -> String {
    match format {
        FeedFormat::Atom => render_atom(channel, items),
        FeedFormat::Rss => render_rss(channel, items),
    }
}

pub fn render_rss(channel: &FeedChannel, items: &[FeedItem]) -> String {
    let mut rendered_items = String::new();
    for item in items {
        let pub_date = item
            .published
            .map(|date| {
                format!(
                    "      <pubDate>{}</pubDate>\n",
                    date.format("%a, %d %b %Y %H:%M:%S +0000")
                )
            })
            .unwrap_or_default();
        let author = item
            .author
            .as_deref()
            .map(|author| format!("      <dc:creator>{}</dc:creator>\n", escape(author)))
            .unwrap_or_default();

        rendered_items.push_str(&format!(
            r#"    <item>
      <title>{}</title>
      <link>{}</link>
      <guid>{}</guid>
{}{}      <description>{}</description>
    </item>
"#,
            escape(&item.title),
            escape(&item.url),
            escape(&item.url),
            pub_date,
            author,
            escape(&item.summary)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:atom="http://www.w3.org/2005/Atom" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>{}</title>
    <link>{}</link>
    <description>{}</description>
    <language>{}</language>
    <atom:link href="{}" rel="self" type="application/rss+xml"/>
{}  </channel>
</rss>
"#,
        escape(&channel.title),
        escape(&channel.site_url),
        escape(&channel.description),
        escape(&channel.language),
        escape(&channel.self_url),
        rendered_items
    )
}

pub fn render_atom(channel: &FeedChannel, items: &[FeedItem]) -> String {
    let updated = items
        .iter()
        .filter_map(FeedItem::timestamp)
        .max()
        .unwrap_or_else(Utc::now)
        .to_rfc3339();

    let mut entries = String::new();
    for item in items {
        let item_updated = item.timestamp().unwrap_or_else(Utc::now).to_rfc3339();
        let published = item
            .published
            .map(|date| format!("    <published>{}</published>\n", date.to_rfc3339()))
            .unwrap_or_default();
        let author = item
            .author
            .as_deref()
            .map(|author| format!("    <author><name>{}</name></author>\n", escape(author)))
            .unwrap_or_default();

        entries.push_str(&format!(
            r#"  <entry>
    <title>{title}</title>
    <link href="{url}" rel="alternate"/>
    <id>{url}</id>
    <updated>{updated}</updated>
{published}{author}    <summary type="html">{summary}</summary>
    <content type="html">{content}</content>
  </entry>
"#,
            title = escape(&item.title),
            url = escape(&item.url),
            updated = item_updated,
            published = published,
            author = author,
            summary = escape(&item.summary),
            content = escape(&item.content),
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>{title}</title>
  <link href="{site_url}" rel="alternate"/>
  <link href="{self_url}" rel="self"/>
  <id>{site_url}</id>
  <updated>{updated}</updated>
  <author>
    <name>{author}</name>
  </author>
  <subtitle>{description}</subtitle>
{entries}</feed>
"#,
        title = escape(&channel.title),
        site_url = escape(&channel.site_url),
        self_url = escape(&channel.self_url),
        updated = updated,
        author = escape(&channel.author),
        description = escape(&channel.description),
        entries = entries,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime, TimeZone};

    fn channel() -> FeedChannel {
        FeedChannel {
            title: "Test Blog".to_string(),
            site_url: "https://example.com/posts".to_string(),
            self_url: "https://example.com/posts/feed/atom".to_string(),
            description: "A test blog".to_string(),
            language: "en".to_string(),
            author: "Author".to_string(),
        }
    }

    fn items() -> Vec<FeedItem> {
        let date = Utc.from_utc_datetime(
            &NaiveDate::from_ymd_opt(2024, 6, 15)
                .unwrap()
                .and_time(NaiveTime::MIN),
        );
        vec![FeedItem {
            title: "Hello World".to_string(),
            url: "https://example.com/posts/hello-world".to_string(),
            published: Some(date),
            updated: None,
            author: Some("Jane".to_string()),
            summary: "<p>Hello excerpt</p>".to_string(),
            content: "<p>Hello</p>".to_string(),
        }]
    }

    #[test]
    fn test_rss_basic_structure() {
        let rss = render_rss(&channel(), &items());
        assert!(rss.contains("<?xml version=\"1.0\""));
        assert!(rss.contains("<rss version=\"2.0\""));
        assert!(rss.contains("<title>Test Blog</title>"));
        assert!(rss.contains("<title>Hello World</title>"));
        assert!(rss.contains("&lt;p&gt;Hello excerpt&lt;/p&gt;"));
        assert!(rss.contains("<pubDate>Sat, 15 Jun 2024 00:00:00 +0000</pubDate>"));
        assert!(rss.contains("<dc:creator>Jane</dc:creator>"));
    }

    #[test]
    fn test_atom_basic_structure() {
        let atom = render_atom(&channel(), &items());
        assert!(atom.contains("<feed xmlns=\"http://www.w3.org/2005/Atom\""));
        assert!(atom.contains("<title>Test Blog</title>"));
        assert!(atom.contains("<title>Hello World</title>"));
        assert!(atom.contains("<name>Author</name>"));
        assert!(atom.contains("<link href=\"https://example.com/posts/feed/atom\" rel=\"self\"/>"));
    }

    #[test]
    fn test_rss_xml_escaping() {
        let mut channel = channel();
        channel.title = "Blog & <Friends>".to_string();
        let rss = render_rss(&channel, &items());
        assert!(rss.contains("Blog &amp; &lt;Friends&gt;"));
    }

    #[test]
    fn test_atom_updated_uses_latest_item_date() {
        let atom = render(FeedFormat::Atom, &channel(), &items());
        assert!(atom.contains("<updated>2024-06-15"));
    }

    #[test]
    fn test_undated_items_omit_pub_date() {
        let mut undated = items();
        undated[0].published = None;
        let rss = render(FeedFormat::Rss, &channel(), &undated);
        assert!(!rss.contains("<pubDate>"));
    }
}
