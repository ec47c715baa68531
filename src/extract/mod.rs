//! Extraction module - endpoints, hierarchical collection, normalization
//!
//! This module contains the Canvas-specific side of the extractor:
//! - The catalogue of extractable endpoints and their tables
//! - Walking the account → course → item hierarchy
//! - Normalizing records for relational loading
//! - Orchestrating a concurrent run across all endpoints

mod collector;
mod coordinator;
mod endpoints;
pub mod normalize;

pub use collector::Collector;
pub use coordinator::{run_extraction, Coordinator, EndpointResult};
pub use endpoints::{Endpoint, FetchStrategy};
pub use normalize::{canonical_id, canonicalize_ids, flatten_nested, flatten_replies, strip_markup};
