//! Per-run extraction report

use crate::extract::Endpoint;
use crate::storage::{LoadMode, LoadResult, LoadStatus};
use std::time::Duration;

/// Stage at which an endpoint failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureStage {
    Fetch,
    Load,
}

impl FailureStage {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Fetch => "fetch_failed",
            Self::Load => "load_failed",
        }
    }
}

/// An endpoint that produced no loaded result
#[derive(Debug, Clone)]
pub struct EndpointFailure {
    pub endpoint: Endpoint,
    pub stage: FailureStage,
    pub error: String,
}

/// Outcome of one orchestrated extraction run
#[derive(Debug, Clone)]
pub struct ExtractionReport {
    pub run_id: i64,
    pub load_mode: LoadMode,

    /// Successful loads, in completion order
    pub results: Vec<LoadResult>,

    /// Endpoints that failed to fetch or load
    pub failures: Vec<EndpointFailure>,

    pub elapsed: Duration,
}

impl ExtractionReport {
    /// Number of endpoints successfully loaded (saved or no data)
    pub fn endpoints_processed(&self) -> usize {
        self.results.len()
    }

    /// Number of endpoints the run was asked to extract
    pub fn endpoints_attempted(&self) -> usize {
        self.results.len() + self.failures.len()
    }

    /// Total number of rows written across all endpoints
    pub fn total_records(&self) -> usize {
        self.results.iter().map(|r| r.record_count).sum()
    }

    /// True when every endpoint loaded (with or without data)
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Looks up the load result for `endpoint`
    pub fn result_for(&self, endpoint: Endpoint) -> Option<&LoadResult> {
        self.results.iter().find(|r| r.endpoint == endpoint)
    }

    /// Looks up the failure for `endpoint`
    pub fn failure_for(&self, endpoint: Endpoint) -> Option<&EndpointFailure> {
        self.failures.iter().find(|f| f.endpoint == endpoint)
    }
}

/// Prints the run report to stdout
pub fn print_report(report: &ExtractionReport) {
    println!("=== Extraction Report (run {}) ===\n", report.run_id);

    println!("Overview:");
    println!("  Load mode: {}", report.load_mode);
    println!(
        "  Endpoints processed: {}/{}",
        report.endpoints_processed(),
        report.endpoints_attempted()
    );
    println!("  Records loaded: {}", report.total_records());
    println!("  Elapsed: {:.1}s", report.elapsed.as_secs_f64());
    println!();

    if !report.results.is_empty() {
        println!("Loaded:");
        for result in &report.results {
            match result.status {
                LoadStatus::Saved => println!(
                    "  {:<24} {:>8} rows → {}",
                    result.endpoint.name(),
                    result.record_count,
                    result.table_name
                ),
                LoadStatus::NoData => {
                    println!("  {:<24} no data", result.endpoint.name())
                }
            }
        }
        println!();
    }

    if !report.failures.is_empty() {
        println!("Failed ({}):", report.failures.len());
        for failure in &report.failures {
            println!(
                "  {:<24} [{}] {}",
                failure.endpoint.name(),
                failure.stage.to_db_string(),
                failure.error
            );
        }
        println!();
    }

    if report.is_complete() {
        println!("All endpoints completed.");
    } else {
        println!(
            "Completed with failures: {} of {} endpoints loaded.",
            report.endpoints_processed(),
            report.endpoints_attempted()
        );
    }
}
