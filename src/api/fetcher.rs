//! Resilient request execution
//!
//! [`execute`] wraps a single GET with a bounded, fixed-delay retry loop on top
//! of the session's own transport retries. Failures never escape as panics:
//! the caller always gets either a decoded [`ApiResponse`] or a terminal
//! [`FetchError`].
//!
//! # Retry Logic
//!
//! | Condition | Action |
//! |-----------|--------|
//! | HTTP 2xx | Return immediately |
//! | HTTP 403, 500, 502, 503, 504 | Wait `delay`, retry until `max_attempts` |
//! | Transport error (no response) | Wait `delay`, retry until `max_attempts` |
//! | Any other status | Terminal → `FetchError::Status` |
//! | Body is not JSON | Terminal → `FetchError::InvalidBody` |

use crate::api::Session;
use crate::config::RetryConfig;
use crate::{FetchError, FetchResult};
use reqwest::header::LINK;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Statuses treated as transient by the executor
pub const RETRYABLE_STATUSES: [u16; 5] = [403, 500, 502, 503, 504];

/// Attempt bound and fixed delay for one request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first (never below 1)
    pub max_attempts: u32,

    /// Wait between attempts; not scaled between retries
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_attempts, config.delay())
    }
}

/// A successfully fetched and decoded page
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// Final URL of the page (after redirects)
    pub url: Url,

    /// HTTP status code
    pub status: u16,

    /// Raw `Link` header, if the server sent one
    pub link_header: Option<String>,

    /// Decoded JSON body (`Null` for an empty body)
    pub body: Value,

    /// Attempts it took to get this response
    pub attempts: u32,
}

/// Outcome of a single attempt
enum Attempt {
    Done(ApiResponse),
    Retry(String),
    Fatal(FetchError),
}

/// Executes a GET against an absolute URL with bounded retry
///
/// # Arguments
///
/// * `session` - The authenticated session
/// * `url` - Absolute URL to fetch
/// * `policy` - Attempt bound and delay
///
/// # Returns
///
/// * `Ok(ApiResponse)` - A 2xx response with its decoded body
/// * `Err(FetchError)` - Terminal failure for this call
pub async fn execute(session: &Session, url: &str, policy: &RetryPolicy) -> FetchResult<ApiResponse> {
    let parsed = Url::parse(url).map_err(|e| FetchError::InvalidUrl {
        url: url.to_string(),
        message: e.to_string(),
    })?;
    execute_url(session, &parsed, policy).await
}

/// Same as [`execute`] for an already parsed URL
pub async fn execute_url(
    session: &Session,
    url: &Url,
    policy: &RetryPolicy,
) -> FetchResult<ApiResponse> {
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match try_once(session, url, attempt).await {
            Attempt::Done(response) => return Ok(response),
            Attempt::Fatal(err) => {
                tracing::warn!("Request to {} failed: {}", url, err);
                return Err(err);
            }
            Attempt::Retry(reason) => {
                if attempt >= max_attempts {
                    tracing::error!(
                        "Request to {} failed after {} attempts: {}",
                        url,
                        attempt,
                        reason
                    );
                    return Err(FetchError::Exhausted {
                        url: url.to_string(),
                        attempts: attempt,
                        reason,
                    });
                }

                tracing::warn!(
                    "Request attempt {}/{} for {} failed: {}. Retrying in {:?}",
                    attempt,
                    max_attempts,
                    url,
                    reason,
                    policy.delay
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}

async fn try_once(session: &Session, url: &Url, attempt: u32) -> Attempt {
    let response = match session.send(url).await {
        Ok(response) => response,
        Err(e) => return Attempt::Retry(describe_transport_error(&e)),
    };

    let status = response.status().as_u16();
    if RETRYABLE_STATUSES.contains(&status) {
        return Attempt::Retry(format!("HTTP {}", status));
    }

    if !response.status().is_success() {
        return Attempt::Fatal(FetchError::Status {
            url: url.to_string(),
            status,
        });
    }

    let link_header = response
        .headers()
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let final_url = response.url().clone();

    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(e) => return Attempt::Retry(format!("reading body: {}", describe_transport_error(&e))),
    };

    let body = if bytes.iter().all(u8::is_ascii_whitespace) {
        Value::Null
    } else {
        match serde_json::from_slice(&bytes) {
            Ok(body) => body,
            Err(e) => {
                return Attempt::Fatal(FetchError::InvalidBody {
                    url: final_url.to_string(),
                    message: e.to_string(),
                })
            }
        }
    };

    Attempt::Done(ApiResponse {
        url: final_url,
        status,
        link_header,
        body,
        attempts: attempt,
    })
}

fn describe_transport_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        e.to_string()
    }
}
