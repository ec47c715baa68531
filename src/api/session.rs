//! Authenticated session against one Canvas instance
//!
//! A [`Session`] owns the HTTP connection pool, the bearer token, and the
//! normalized base URL for the whole run. It is shared read-only between all
//! concurrent endpoint fetches.

use crate::config::{CanvasConfig, RetryConfig};
use crate::{ExtractError, FetchError};
use reqwest::header::ACCEPT;
use reqwest::{Client, Response};
use std::fmt;
use std::time::Duration;
use url::Url;

/// Statuses the session re-sends on its own before handing the response back
pub const TRANSPORT_RETRY_STATUSES: [u16; 4] = [500, 502, 503, 504];

/// Path prefix of the REST API under the instance host
const API_PREFIX: &str = "api/v1/";

/// One authenticated Canvas session
pub struct Session {
    client: Client,
    base_url: Url,
    account_id: String,
    token: String,
    transport_retries: u32,
    transport_backoff: Duration,
}

impl Session {
    /// Builds a session from the connection and retry configuration
    ///
    /// The bearer token is resolved here (config value first, then the
    /// configured environment variable).
    pub fn new(canvas: &CanvasConfig, retry: &RetryConfig) -> Result<Self, ExtractError> {
        let token = canvas.resolve_token()?;
        let base_url = Url::parse(&format_base_url(&canvas.host))
            .map_err(|e| crate::ConfigError::InvalidUrl(format!("{}: {}", canvas.host, e)))?;
        let client = build_http_client(canvas.accept_invalid_certs)?;

        tracing::debug!(
            "Session ready for {} (account {})",
            base_url,
            canvas.account_id
        );

        Ok(Self {
            client,
            base_url,
            account_id: canvas.account_id.clone(),
            token,
            transport_retries: retry.transport_retries,
            transport_backoff: retry.transport_backoff(),
        })
    }

    /// Base URL of the instance, always ending with '/'
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Root account being extracted
    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Resolves an API path (with optional query string) against the base URL
    ///
    /// # Example
    ///
    /// `api_url("courses/7/quizzes?per_page=100")` on host
    /// `https://school.instructure.com/` yields
    /// `https://school.instructure.com/api/v1/courses/7/quizzes?per_page=100`.
    pub fn api_url(&self, path: &str) -> Result<Url, FetchError> {
        let relative = format!("{}{}", API_PREFIX, path.trim_start_matches('/'));
        self.base_url
            .join(&relative)
            .map_err(|e| FetchError::InvalidUrl {
                url: relative,
                message: e.to_string(),
            })
    }

    /// Sends one authenticated GET, re-sending on server errors
    ///
    /// Up to `transport_retries` extra sends are made for statuses in
    /// [`TRANSPORT_RETRY_STATUSES`] and for connection failures, with
    /// exponential backoff. Whatever the last send produced is returned.
    pub(crate) async fn send(&self, url: &Url) -> Result<Response, reqwest::Error> {
        let mut retries = 0;

        loop {
            let result = self
                .client
                .get(url.clone())
                .bearer_auth(&self.token)
                .header(ACCEPT, "application/json")
                .send()
                .await;

            let retryable = match &result {
                Ok(response) => TRANSPORT_RETRY_STATUSES.contains(&response.status().as_u16()),
                Err(e) => e.is_connect(),
            };

            if !retryable || retries >= self.transport_retries {
                return result;
            }

            let backoff = backoff_for(self.transport_backoff, retries);
            retries += 1;
            tracing::trace!(
                "Transport retry {}/{} for {} in {:?}",
                retries,
                self.transport_retries,
                url,
                backoff
            );
            tokio::time::sleep(backoff).await;
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("base_url", &self.base_url.as_str())
            .field("account_id", &self.account_id)
            .field("token", &"<redacted>")
            .field("transport_retries", &self.transport_retries)
            .finish()
    }
}

/// Delay before transport retry number `retries + 1`: `base * 2^retries`, saturating
fn backoff_for(base: Duration, retries: u32) -> Duration {
    let factor = 2u32.checked_pow(retries).unwrap_or(u32::MAX);
    base.saturating_mul(factor)
}

/// Ensures the host URL ends with a trailing slash
pub fn format_base_url(host: &str) -> String {
    if host.ends_with('/') {
        host.to_string()
    } else {
        format!("{}/", host)
    }
}

/// Builds the HTTP client shared by every request of the run
pub fn build_http_client(accept_invalid_certs: bool) -> Result<Client, reqwest::Error> {
    let user_agent = format!("canvas-extract/{}", env!("CARGO_PKG_VERSION"));

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
}
