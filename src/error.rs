use std::path::PathBuf;

use thiserror::Error;

use crate::sources::Category;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("API request failed while fetching {category}: {message}")]
    Api { category: Category, message: String },

    #[error("Rate limited while fetching {category}, gave up after {attempts} attempts")]
    RateLimited { category: Category, attempts: u32 },

    #[error("Unexpected {category} data: {message}")]
    DataShape { category: Category, message: String },

    #[error("{category} still had more pages after {pages}; raise --max-pages to collect the full window")]
    Truncated { category: Category, pages: usize },

    #[error("Template/record mismatch: no value for placeholder '{0}'")]
    TemplateMismatch(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Another run holds the lock at {}", .0.display())]
    Locked(PathBuf),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
