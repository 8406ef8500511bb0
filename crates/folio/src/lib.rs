pub mod cache;
pub mod config;
pub mod content_type;
pub mod dotpath;
pub mod entry;
pub mod error;
pub mod feeds;
pub mod locator;
pub mod parsing;
pub mod query;
pub mod registry;
pub mod resources;
pub mod router;
pub mod site;
pub mod sitemap;
pub mod theme;
pub mod types;
pub mod xml;

pub use cache::{CacheRecord, FileCache, KeyedCache, MemoryCache};
pub use config::{CollectSetting, ContentTypeConfig, RouteConfig, SiteConfig};
pub use content_type::{Collect, ContentType, FeedFormat, Granularity, RouteKind, RouteSpec};
pub use dotpath::DotPath;
pub use entry::Entry;
pub use error::*;
pub use locator::{FileMap, Locator};
pub use parsing::{Converted, MarkdownConverter, PulldownConverter};
pub use query::{Order, Query, QueryArgs};
pub use registry::TypeRegistry;
pub use resources::Resources;
pub use router::{Matched, ParamKind, Params, Route, Router};
pub use site::{Action, Response, Site, SiteBuilder};
pub use theme::Theme;
pub use types::*;
