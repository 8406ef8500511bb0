use crate::error::{FolioError, Result};
use crate::types::Meta;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use syntect::highlighting::ThemeSet;
use syntect::html::highlighted_html_for_string;
use syntect::parsing::SyntaxSet;

const WORDS_PER_MINUTE: usize = 200;
const DEFAULT_SYNTAX_THEME: &str = "base16-ocean.dark";
const TOML_DATETIME_FIELD: &str = "$__toml_private_datetime";

/// Output of converting one Markdown document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Converted {
    pub content: String,
    pub meta: Meta,
}

/// Turns Markdown source (front matter included) into HTML plus metadata.
pub trait MarkdownConverter: Send + Sync {
    /// Renders a Markdown body with no front matter.
    fn render(&self, markdown: &str) -> String;

    /// Reads only the front matter; never renders the body.
    fn front_matter(&self, raw: &str, path: &Path) -> Meta {
        split_document(raw, path).0
    }

    fn convert(&self, raw: &str, path: &Path) -> Converted {
        let (meta, body) = split_document(raw, path);
        Converted {
            content: self.render(&body),
            meta,
        }
    }
}

pub struct PulldownConverter {
    syntax_set: SyntaxSet,
    theme_set: ThemeSet,
    theme_name: String,
}

impl Default for PulldownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl PulldownConverter {
    pub fn new() -> Self {
        Self::with_theme(DEFAULT_SYNTAX_THEME)
    }

    pub fn with_theme(theme_name: &str) -> Self {
        let theme_set = ThemeSet::load_defaults();
        let theme_name = if theme_set.themes.contains_key(theme_name) {
            theme_name.to_string()
        } else {
            tracing::warn!(theme = theme_name, "unknown syntax theme, using default");
            DEFAULT_SYNTAX_THEME.to_string()
        };
        Self {
            syntax_set: SyntaxSet::load_defaults_newlines(),
            theme_set,
            theme_name,
        }
    }

    fn highlight(&self, code: &str, lang: Option<&str>) -> String {
        let Some(lang) = lang else {
            return format!("<pre><code>{}</code></pre>", escape_html(code));
        };

        let theme = &self.theme_set.themes[&self.theme_name];
        self.syntax_set
            .find_syntax_by_token(lang)
            .and_then(|syntax| {
                highlighted_html_for_string(code, &self.syntax_set, syntax, theme).ok()
            })
            .unwrap_or_else(|| {
                format!(
                    "<pre><code class=\"language-{}\">{}</code></pre>",
                    escape_html(lang),
                    escape_html(code)
                )
            })
    }
}

impl MarkdownConverter for PulldownConverter {
    fn render(&self, markdown: &str) -> String {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_FOOTNOTES);
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_HEADING_ATTRIBUTES);

        let parser = Parser::new_ext(markdown, options);
        let mut html_output = String::new();
        let mut code_block: Option<(Option<String>, String)> = None;

        for event in parser {
            match event {
                Event::Start(Tag::CodeBlock(kind)) => {
                    let lang = match kind {
                        CodeBlockKind::Fenced(lang) if !lang.is_empty() => Some(lang.to_string()),
                        _ => None,
                    };
                    code_block = Some((lang, String::new()));
                }
                Event::End(TagEnd::CodeBlock) => {
                    if let Some((lang, code)) = code_block.take() {
                        html_output.push_str(&self.highlight(&code, lang.as_deref()));
                    }
                }
                Event::Text(text) if code_block.is_some() => {
                    if let Some((_, code)) = code_block.as_mut() {
                        code.push_str(&text);
                    }
                }
                other => {
                    pulldown_cmark::html::push_html(&mut html_output, std::iter::once(other));
                }
            }
        }

        html_output
    }
}

fn escape_html(input: &str) -> String {
    input
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Splits a document into front matter and body. Malformed front matter
/// degrades to an empty map with the whole document as body.
pub fn split_document(raw: &str, path: &Path) -> (Meta, String) {
    match extract_frontmatter(raw, path) {
        Ok(parts) => parts,
        Err(error) => {
            tracing::warn!(path = %path.display(), %error, "ignoring unreadable front matter");
            (Meta::default(), raw.replace("\r\n", "\n"))
        }
    }
}

pub fn extract_frontmatter(content: &str, path: &Path) -> Result<(Meta, String)> {
    let content = content.replace("\r\n", "\n");
    let content = content.trim_start_matches('\u{feff}').trim_start();

    if content.starts_with("+++") {
        parse_toml_frontmatter(content, path)
    } else if content.starts_with("---") {
        parse_yaml_frontmatter(content, path)
    } else {
        Ok((Meta::default(), content.to_string()))
    }
}

fn parse_toml_frontmatter(content: &str, path: &Path) -> Result<(Meta, String)> {
    let rest = &content[3..];

    let end_index =
        find_closing_delimiter(rest, "+++").ok_or_else(|| FolioError::InvalidFrontmatter {
            path: path.to_path_buf(),
        })?;

    let frontmatter_str = &rest[..end_index];
    let body = &rest[end_index + 3..];

    let raw: BTreeMap<String, Value> =
        toml::from_str(frontmatter_str).map_err(|error| FolioError::TomlParse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

    Ok((Meta::new(normalize_toml_dates(raw)), body.trim().to_string()))
}

fn parse_yaml_frontmatter(content: &str, path: &Path) -> Result<(Meta, String)> {
    let rest = &content[3..];

    let end_index =
        find_closing_delimiter(rest, "---").ok_or_else(|| FolioError::InvalidFrontmatter {
            path: path.to_path_buf(),
        })?;

    let frontmatter_str = &rest[..end_index];
    let body = &rest[end_index + 3..];

    if frontmatter_str.trim().is_empty() {
        return Ok((Meta::default(), body.trim().to_string()));
    }

    let raw: BTreeMap<String, Value> =
        serde_yml::from_str(frontmatter_str).map_err(|error| FolioError::YamlParse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })?;

    Ok((Meta::new(raw), body.trim().to_string()))
}

fn find_closing_delimiter(content: &str, delimiter: &str) -> Option<usize> {
    let mut position = 0;

    for line in content.split('\n') {
        if line.trim() == delimiter {
            return Some(position);
        }
        position += line.len() + 1;
    }

    None
}

/// TOML datetimes deserialize into a private wrapper map; unwrap them into
/// plain strings so they read like YAML dates.
fn normalize_toml_dates(raw: BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    raw.into_iter()
        .map(|(key, value)| (key, unwrap_toml_datetime(value)))
        .collect()
}

fn unwrap_toml_datetime(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            if map.len() == 1
                && let Some(Value::String(text)) = map.get(TOML_DATETIME_FIELD)
            {
                return Value::String(text.clone());
            }
            Value::Object(
                map.into_iter()
                    .map(|(key, inner)| (key, unwrap_toml_datetime(inner)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.into_iter().map(unwrap_toml_datetime).collect()),
        other => other,
    }
}

/// Parses a front-matter date: numbers (and all-digit strings) are Unix
/// timestamps, anything else goes through the accepted textual formats.
pub fn parse_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|float| float as i64))
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single()),
        Value::String(text) => parse_date_str(text),
        _ => None,
    }
}

pub fn parse_date_str(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if text.bytes().all(|byte| byte.is_ascii_digit()) {
        return text
            .parse::<i64>()
            .ok()
            .and_then(|seconds| Utc.timestamp_opt(seconds, 0).single());
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(text) {
        return Some(parsed.with_timezone(&Utc));
    }

    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ];
    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }

    const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d %B %Y", "%B %d, %Y", "%b %d, %Y"];
    for format in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&parsed.and_time(NaiveTime::MIN)));
        }
    }

    None
}

/// Derives an entry name from a filename: extension dropped, then anything
/// up to the last `.` (an ordering prefix such as `01.`) dropped too.
pub fn entry_name(filename: &str) -> &str {
    let stem = file_stem(filename);
    match stem.rfind('.') {
        Some(index) => &stem[index + 1..],
        None => stem,
    }
}

/// Filename with its final extension removed.
pub fn file_stem(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(index) if index > 0 => &filename[..index],
        _ => filename,
    }
}

pub fn slugify(input: &str) -> String {
    slug::slugify(input)
}

pub fn strip_html_tags(html: &str) -> String {
    let mut output = String::with_capacity(html.len());
    let mut inside_tag = false;
    let mut skip_content = false;
    let mut tag_name_buffer = String::new();
    let mut collecting_tag_name = false;
    let mut is_closing_tag = false;

    for character in html.chars() {
        match character {
            '<' => {
                inside_tag = true;
                collecting_tag_name = true;
                is_closing_tag = false;
                tag_name_buffer.clear();
            }
            '>' if inside_tag => {
                inside_tag = false;
                collecting_tag_name = false;
                let tag_lower = tag_name_buffer.to_lowercase();
                if tag_lower == "script" || tag_lower == "style" {
                    skip_content = !is_closing_tag;
                }
            }
            '/' if inside_tag && tag_name_buffer.is_empty() => {
                is_closing_tag = true;
            }
            ' ' | '\t' | '\n' | '\r' | '/' if inside_tag => {
                collecting_tag_name = false;
            }
            _ if inside_tag => {
                if collecting_tag_name {
                    tag_name_buffer.push(character);
                }
            }
            _ if skip_content => {}
            _ => output.push(character),
        }
    }

    decode_entities(&output)
}

fn decode_entities(input: &str) -> String {
    input
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Byte ranges of the whitespace-separated words in `text`.
pub fn word_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;

    for (index, character) in text.char_indices() {
        match (character.is_whitespace(), start) {
            (true, Some(word_start)) => {
                spans.push((word_start, index));
                start = None;
            }
            (false, None) => start = Some(index),
            _ => {}
        }
    }
    if let Some(word_start) = start {
        spans.push((word_start, text.len()));
    }

    spans
}

/// Cuts `text` after its `limit`-th word and appends `more`. Text with at
/// most `limit` words comes back whole, without the marker.
pub fn truncate_words(text: &str, limit: usize, more: &str) -> String {
    let spans = word_spans(text);
    let Some(first) = spans.first() else {
        return String::new();
    };

    if spans.len() <= limit {
        let last = spans[spans.len() - 1];
        return text[first.0..last.1].to_string();
    }
    if limit == 0 {
        return more.to_string();
    }

    let cut = spans[limit - 1].1;
    format!("{}{}", &text[first.0..cut], more)
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

pub fn reading_time(words: usize) -> usize {
    words.div_ceil(WORDS_PER_MINUTE).max(1)
}
