use crate::storage::LoadMode;
use crate::ConfigError;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Canvas-Extract
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub canvas: CanvasConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    pub output: OutputConfig,
}

/// Connection parameters for the Canvas instance
#[derive(Debug, Clone, Deserialize)]
pub struct CanvasConfig {
    /// Base URL of the Canvas instance (e.g. "https://school.instructure.com/")
    pub host: String,

    /// Root account whose users and courses are extracted
    #[serde(rename = "account-id")]
    pub account_id: String,

    /// API token; when absent the token is read from `token_env`
    #[serde(rename = "bearer-token", default)]
    pub bearer_token: Option<String>,

    /// Environment variable holding the API token
    #[serde(rename = "token-env", default = "default_token_env")]
    pub token_env: String,

    /// Page size requested from every list endpoint
    #[serde(rename = "per-page", default = "default_per_page")]
    pub per_page: u32,

    /// Skip TLS certificate verification
    #[serde(rename = "accept-invalid-certs", default)]
    pub accept_invalid_certs: bool,
}

impl CanvasConfig {
    /// Returns the configured token, falling back to the environment
    pub fn resolve_token(&self) -> Result<String, ConfigError> {
        if let Some(token) = self.bearer_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(token.to_string());
        }

        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ConfigError::MissingToken(self.token_env.clone()))
    }
}

/// Per-request retry behaviour
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    /// Total attempts for one request, including the first
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Fixed wait between attempts (milliseconds)
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,

    /// Immediate re-sends performed by the session on 5xx/connect errors
    #[serde(default = "default_transport_retries")]
    pub transport_retries: u32,

    /// Base of the session's exponential backoff (milliseconds)
    #[serde(default = "default_transport_backoff_ms")]
    pub transport_backoff_ms: u64,
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn transport_backoff(&self) -> Duration {
        Duration::from_millis(self.transport_backoff_ms)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
            transport_retries: default_transport_retries(),
            transport_backoff_ms: default_transport_backoff_ms(),
        }
    }
}

/// Orchestration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ExtractionConfig {
    /// Load mode used when the CLI does not override it
    #[serde(default)]
    pub load_mode: LoadMode,

    /// Whole-endpoint retries after the first failed fetch
    #[serde(default = "default_endpoint_retries")]
    pub endpoint_retries: u32,

    /// Wait between whole-endpoint retries (milliseconds)
    #[serde(default = "default_endpoint_retry_delay_ms")]
    pub endpoint_retry_delay_ms: u64,

    /// Number of endpoints fetched at the same time
    #[serde(default = "default_max_concurrent_endpoints")]
    pub max_concurrent_endpoints: usize,

    /// Overall deadline for the fetch phase (seconds)
    #[serde(default)]
    pub deadline_secs: Option<u64>,
}

impl ExtractionConfig {
    pub fn endpoint_retry_delay(&self) -> Duration {
        Duration::from_millis(self.endpoint_retry_delay_ms)
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            load_mode: LoadMode::default(),
            endpoint_retries: default_endpoint_retries(),
            endpoint_retry_delay_ms: default_endpoint_retry_delay_ms(),
            max_concurrent_endpoints: default_max_concurrent_endpoints(),
            deadline_secs: None,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,
}

fn default_token_env() -> String {
    "CANVAS_API_TOKEN".to_string()
}

fn default_per_page() -> u32 {
    100
}

fn default_max_attempts() -> u32 {
    3
}

fn default_delay_ms() -> u64 {
    5_000
}

fn default_transport_retries() -> u32 {
    5
}

fn default_transport_backoff_ms() -> u64 {
    100
}

fn default_endpoint_retries() -> u32 {
    2
}

fn default_endpoint_retry_delay_ms() -> u64 {
    30_000
}

fn default_max_concurrent_endpoints() -> usize {
    9
}
