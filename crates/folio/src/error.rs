use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FolioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {action} {path}: {source}")]
    IoAt {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("TOML parse error in {path}: {message}")]
    TomlParse { path: PathBuf, message: String },

    #[error("YAML parse error in {path}: {message}")]
    YamlParse { path: PathBuf, message: String },

    #[error("JSON parse error in {path}: {message}")]
    JsonParse { path: PathBuf, message: String },

    #[error("Template error: {0}")]
    Template(#[from] tera::Error),

    #[error("Invalid frontmatter in file: {path}")]
    InvalidFrontmatter { path: PathBuf },

    #[error("Config file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Unknown content type '{name}' referenced by {context}")]
    UnknownType { name: String, context: String },

    #[error("Unknown route handler '{name}' for route '{uri}'")]
    UnknownHandler { name: String, uri: String },

    #[error("Invalid route pattern for '{uri}': {source}")]
    RoutePattern {
        uri: String,
        #[source]
        source: regex::Error,
    },

    #[error("Duplicate route name '{name}'")]
    DuplicateRoute { name: String },

    #[error("Content type '{name}' is registered twice")]
    DuplicateType { name: String },
}

pub type Result<T> = std::result::Result<T, FolioError>;

pub trait IoContext<T> {
    fn io_context(self, action: &'static str, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn io_context(self, action: &'static str, path: &Path) -> Result<T> {
        self.map_err(|source| FolioError::IoAt {
            action,
            path: path.to_path_buf(),
            source,
        })
    }
}
