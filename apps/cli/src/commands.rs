use axum::extract::State;
use axum::http::{StatusCode, Uri, header};
use axum::response::IntoResponse;
use folio::{FileCache, Site, SiteBuilder, SiteConfig};
use notify::{Config, Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{RecvTimeoutError, channel};
use std::time::{Duration, Instant};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

const DEBOUNCE_DURATION: Duration = Duration::from_millis(300);

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn escape_toml_string(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    for character in input.chars() {
        match character {
            '\\' => output.push_str("\\\\"),
            '"' => output.push_str("\\\""),
            '\n' => output.push_str("\\n"),
            '\r' => output.push_str("\\r"),
            '\t' => output.push_str("\\t"),
            control if control < '\u{0020}' => {
                output.push_str(&format!("\\u{:04X}", control as u32));
            }
            other => output.push(other),
        }
    }
    output
}

fn site_dir(input: Option<&Path>) -> PathBuf {
    input.unwrap_or(Path::new(".")).to_path_buf()
}

pub fn new_site(name: &str) -> CommandResult {
    let site_dir = Path::new(name);

    if site_dir.exists() {
        return Err(format!("Directory '{}' already exists", name).into());
    }

    let content_dir = site_dir.join("content");
    fs::create_dir_all(content_dir.join("posts"))?;
    fs::create_dir_all(content_dir.join("tags"))?;
    fs::create_dir_all(site_dir.join("static"))?;

    let title = site_dir
        .file_name()
        .map(|file_name| file_name.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let escaped_title = escape_toml_string(&title);
    let config = format!(
        r#"title = "{escaped_title}"
base_url = "http://localhost:3000"
description = "A new Folio site"
language = "en"

[types.post]
path = "posts"
has_feed = true
has_date_archives = true
orderby = "date"
order = "desc"

[types.tag]
path = "tags"
taxonomy = true
term_collect = "post"
"#
    );
    fs::write(site_dir.join("folio.toml"), config)?;

    fs::write(
        content_dir.join("index.md"),
        "---\ntitle: Home\n---\n\nWelcome to your new Folio site!\n",
    )?;
    fs::write(
        content_dir.join("about.md"),
        "---\ntitle: About\n---\n\nThis is the about page.\n",
    )?;
    fs::write(
        content_dir.join("tags").join("welcome.md"),
        "---\ntitle: Welcome\n---\n\nPosts for new readers.\n",
    )?;

    let post_content = r#"---
title: Hello World
date: 2024-01-01
tag: [welcome]
---

This is your first post. Start writing!

You can use **markdown** formatting, including:

- Lists
- Code blocks
- And more!

```rust
fn main() {
    println!("Hello, world!");
}
```
"#;
    fs::write(
        content_dir.join("posts").join("2024-01-01.hello-world.md"),
        post_content,
    )?;

    println!("Created new site: {name}");
    println!("  cd {name}");
    println!("  folio serve --watch");

    Ok(())
}

pub fn print_routes(input: Option<&Path>) -> CommandResult {
    let site = Site::load(site_dir(input))?;

    for route in site.router().routes() {
        println!(
            "{:<32} /{:<40} {}",
            route.name().unwrap_or("-"),
            route.uri().trim_start_matches('/'),
            route.handler()
        );
    }

    Ok(())
}

pub fn resolve_path(input: Option<&Path>, path: &str) -> CommandResult {
    let site = Site::load(site_dir(input))?;

    let start = Instant::now();
    let response = site.handle(path);
    tracing::info!(path, status = response.status, elapsed = ?start.elapsed(), "resolved");

    println!("{} {}", response.status, response.content_type);
    println!();
    println!("{}", response.body);

    Ok(())
}

pub fn clear_cache(input: Option<&Path>) -> CommandResult {
    let site_dir = site_dir(input);
    let config = SiteConfig::load(&site_dir)?;
    let cache = FileCache::new(site_dir.join(&config.cache_dir));

    cache.clear()?;
    println!("Cleared {}", cache.root().display());

    Ok(())
}

pub async fn serve_site(
    input: Option<&Path>,
    port: u16,
    base_url: Option<&str>,
    open_browser: bool,
    watch: bool,
) -> CommandResult {
    let input_dir = fs::canonicalize(site_dir(input))?;
    let serve_url = format!("http://localhost:{}", port);

    let site = Arc::new(
        SiteBuilder::new(&input_dir)
            .base_url(base_url.unwrap_or(&serve_url))
            .build()?,
    );

    let _watcher = if watch {
        Some(watch_content(Arc::clone(&site))?)
    } else {
        None
    };

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("Serving at http://{addr}");
    println!("Press Ctrl+C to stop");

    if open_browser && let Err(error) = open::that(&serve_url) {
        eprintln!("Failed to open browser: {error}");
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(site)).await?;

    Ok(())
}

fn app(site: Arc<Site>) -> axum::Router {
    axum::Router::new()
        .nest_service("/static", ServeDir::new(site.static_dir()))
        .fallback(dispatch)
        .layer(TraceLayer::new_for_http())
        .with_state(site)
}

async fn dispatch(State(site): State<Arc<Site>>, uri: Uri) -> axum::response::Response {
    let path = uri.path().to_string();

    match tokio::task::spawn_blocking(move || site.handle(&path)).await {
        Ok(response) => into_http(response),
        Err(error) => {
            tracing::error!(%error, "dispatch task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn into_http(response: folio::Response) -> axum::response::Response {
    let status =
        StatusCode::from_u16(response.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, response.content_type)], response.body).into_response()
}

/// Evicts the folder scans of changed content. Dropping the returned
/// watcher stops the watch.
fn watch_content(site: Arc<Site>) -> Result<RecommendedWatcher, Box<dyn std::error::Error>> {
    let content_dir = site.resources().content_dir.clone();
    let (notify_tx, notify_rx) = channel();

    let mut watcher = RecommendedWatcher::new(
        notify_tx,
        Config::default().with_poll_interval(Duration::from_millis(200)),
    )?;

    if content_dir.exists() {
        watcher.watch(&content_dir, RecursiveMode::Recursive)?;
    }

    std::thread::spawn(move || {
        loop {
            let mut folders = BTreeSet::new();

            match notify_rx.recv() {
                Ok(event) => changed_folders(&site, event, &mut folders),
                Err(_) => return,
            }

            loop {
                match notify_rx.recv_timeout(DEBOUNCE_DURATION) {
                    Ok(event) => changed_folders(&site, event, &mut folders),
                    Err(RecvTimeoutError::Timeout) => break,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            }

            for folder in &folders {
                site.forget(folder);
            }
            if !folders.is_empty() {
                tracing::info!(folders = folders.len(), "content changed");
            }
        }
    });

    Ok(watcher)
}

fn changed_folders(site: &Site, event: notify::Result<Event>, folders: &mut BTreeSet<String>) {
    match event {
        Ok(event) => {
            for path in event.paths {
                if let Some(folder) = path
                    .parent()
                    .and_then(|parent| site.resources().relative(parent))
                {
                    folders.insert(folder);
                }
            }
        }
        Err(error) => tracing::warn!(%error, "watch error"),
    }
}
