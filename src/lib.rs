//! Canvas-Extract: resilient hierarchical extraction from the Canvas LMS API
//!
//! This crate pulls paginated, nested resources (accounts → courses → quizzes,
//! assignments, discussions → submissions and entries) out of a Canvas
//! instance, flattens them into records, and loads one table per endpoint into
//! a SQLite database.

pub mod api;
pub mod config;
pub mod extract;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Canvas-Extract operations
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    StorageError(#[from] storage::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Destination store unreachable: {0}")]
    StoreUnreachable(String),

    #[error("{endpoint} record is missing required field '{field}'")]
    MissingField {
        endpoint: &'static str,
        field: &'static str,
    },
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("No bearer token configured and ${0} is not set")]
    MissingToken(String),
}

/// Terminal failure of a single HTTP call or page chain
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Invalid request URL {url}: {message}")]
    InvalidUrl { url: String, message: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Gave up on {url} after {attempts} attempts: {reason}")]
    Exhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("Unexpected response body from {url}: {message}")]
    InvalidBody { url: String, message: String },

    #[error("Pagination loop detected at {url}")]
    PaginationCycle { url: String },
}

/// Result type alias for Canvas-Extract operations
pub type Result<T> = std::result::Result<T, ExtractError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for single-request and pagination operations
pub type FetchResult<T> = std::result::Result<T, FetchError>;

// Re-export commonly used types
pub use api::{Record, Session};
pub use config::Config;
pub use extract::{run_extraction, Coordinator, Endpoint};
pub use output::ExtractionReport;
pub use storage::{LoadMode, LoadResult, LoadStatus};
