//! Canvas REST client
//!
//! This module contains the transport layer of the extractor:
//! - The authenticated [`Session`] with transport-level retry
//! - A resilient single-request executor with bounded, fixed-delay retry
//! - Link-header pagination that accumulates every page of a collection

mod fetcher;
mod pagination;
mod session;

pub use fetcher::{execute, execute_url, ApiResponse, RetryPolicy, RETRYABLE_STATUSES};
pub use pagination::{
    fetch_all, find_next_link, paginate, parse_link_header, records_from_body, LinkRelation,
};
pub use session::{build_http_client, format_base_url, Session, TRANSPORT_RETRY_STATUSES};

/// One API entity as returned by Canvas
///
/// Records stay schema-flexible so new API fields flow through to the
/// destination tables without code changes.
pub type Record = serde_json::Map<String, serde_json::Value>;
