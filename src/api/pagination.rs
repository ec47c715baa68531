//! Link-header pagination
//!
//! Canvas list endpoints return at most `per_page` records and advertise the
//! following page in a `Link` header:
//!
//! ```text
//! <https://x/api/v1/users?page=2&per_page=100>; rel="next", <https://x/api/v1/users?page=9&per_page=100>; rel="last"
//! ```
//!
//! [`paginate`] follows the `next` relation until it disappears and returns the
//! records of every page in arrival order.

use crate::api::fetcher::{execute_url, ApiResponse, RetryPolicy};
use crate::api::{Record, Session};
use crate::{FetchError, FetchResult};
use serde_json::Value;
use std::collections::HashSet;
use url::Url;

/// One `<url>; rel="..."` entry of a Link header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRelation {
    pub url: String,
    pub rels: Vec<String>,
}

/// Parses every entry of a Link header
///
/// Targets are taken verbatim from between the angle brackets, so commas
/// inside a URL do not split it. `rel` values are lower-cased and may list
/// several space-separated relations.
pub fn parse_link_header(header: &str) -> Vec<LinkRelation> {
    let mut links = Vec::new();
    let mut rest = header;

    while let Some(start) = rest.find('<') {
        let after = &rest[start + 1..];
        let Some(end) = after.find('>') else {
            break;
        };

        let target = after[..end].trim();
        let tail = &after[end + 1..];
        let params_end = tail.find('<').unwrap_or(tail.len());

        let rels = tail[..params_end]
            .split(';')
            .filter_map(|param| param.split_once('='))
            .filter(|(key, _)| key.trim().eq_ignore_ascii_case("rel"))
            .flat_map(|(_, value)| {
                value
                    .trim()
                    .trim_end_matches(',')
                    .trim()
                    .trim_matches('"')
                    .split_whitespace()
            })
            .map(str::to_ascii_lowercase)
            .collect();

        links.push(LinkRelation {
            url: target.to_string(),
            rels,
        });
        rest = &tail[params_end..];
    }

    links
}

/// Returns the target of the `next` relation, if any
pub fn find_next_link(header: &str) -> Option<String> {
    parse_link_header(header)
        .into_iter()
        .find(|link| link.rels.iter().any(|rel| rel == "next"))
        .map(|link| link.url)
}

/// Extracts the records of one decoded page
///
/// With `wrap_key` the records are read from that field of an object body.
/// Otherwise an array body is the record list and an object body is a single
/// record. An empty body yields no records.
pub fn records_from_body(body: Value, wrap_key: Option<&str>, url: &Url) -> FetchResult<Vec<Record>> {
    let invalid = |message: String| FetchError::InvalidBody {
        url: url.to_string(),
        message,
    };

    let payload = match (wrap_key, body) {
        (None, body) => body,
        (Some(key), Value::Object(mut map)) => map
            .remove(key)
            .ok_or_else(|| invalid(format!("missing '{}' field", key)))?,
        (Some(key), other) => {
            return Err(invalid(format!(
                "expected an object wrapping '{}', got {}",
                key,
                json_kind(&other)
            )))
        }
    };

    match payload {
        Value::Null => Ok(Vec::new()),
        Value::Object(record) => Ok(vec![record]),
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(record) => Ok(record),
                other => Err(invalid(format!(
                    "expected record objects, got {}",
                    json_kind(&other)
                ))),
            })
            .collect(),
        other => Err(invalid(format!(
            "expected records, got {}",
            json_kind(&other)
        ))),
    }
}

/// Follows the `next` chain starting from an already fetched first page
///
/// # Arguments
///
/// * `session` - The authenticated session
/// * `first` - The first page, already fetched
/// * `wrap_key` - Field the records are wrapped under, if any
/// * `policy` - Retry policy used for every follow-up page
///
/// # Returns
///
/// * `Ok(Vec<Record>)` - All records, in page order
/// * `Err(FetchError)` - A follow-up page failed terminally; no partial
///   results are returned
pub async fn paginate(
    session: &Session,
    first: ApiResponse,
    wrap_key: Option<&str>,
    policy: &RetryPolicy,
) -> FetchResult<Vec<Record>> {
    let ApiResponse {
        url,
        link_header,
        body,
        ..
    } = first;

    let mut records = records_from_body(body, wrap_key, &url)?;
    let mut visited = HashSet::from([url.to_string()]);
    let mut current_url = url;
    let mut link_header = link_header;
    let mut pages = 1;

    loop {
        let Some(next) = link_header.as_deref().and_then(find_next_link) else {
            break;
        };

        let next_url = current_url
            .join(&next)
            .map_err(|e| FetchError::InvalidUrl {
                url: next.clone(),
                message: e.to_string(),
            })?;

        if !visited.insert(next_url.to_string()) {
            return Err(FetchError::PaginationCycle {
                url: next_url.to_string(),
            });
        }

        let page = execute_url(session, &next_url, policy).await?;
        records.extend(records_from_body(page.body, wrap_key, &page.url)?);
        pages += 1;

        current_url = page.url;
        link_header = page.link_header;
    }

    tracing::debug!(
        "Collected {} records across {} page(s) ending at {}",
        records.len(),
        pages,
        current_url
    );

    Ok(records)
}

/// Fetches the first page of `url` and paginates through the rest
pub async fn fetch_all(
    session: &Session,
    url: &Url,
    wrap_key: Option<&str>,
    policy: &RetryPolicy,
) -> FetchResult<Vec<Record>> {
    let first = execute_url(session, url, policy).await?;
    paginate(session, first, wrap_key, policy).await
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
