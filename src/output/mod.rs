//! Output module for run reports and history
//!
//! This module handles:
//! - The per-run extraction report and its console summary
//! - Listing past runs from the bookkeeping tables

mod report;
pub mod stats;

pub use report::{print_report, EndpointFailure, ExtractionReport, FailureStage};
pub use stats::{load_history, print_history, RunHistory};
