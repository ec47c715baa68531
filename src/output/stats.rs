//! Run history from the bookkeeping tables
//!
//! This module provides functionality for extracting and displaying
//! past extraction runs from the storage layer.

use crate::storage::{EndpointRecord, RunRecord, Storage};
use crate::ExtractError;
use chrono::{DateTime, Utc};

/// One past run with its per-endpoint outcomes
#[derive(Debug, Clone)]
pub struct RunHistory {
    pub run: RunRecord,
    pub endpoints: Vec<EndpointRecord>,

    /// Wall-clock duration, when the run finished
    pub duration_seconds: Option<i64>,
}

impl RunHistory {
    pub fn failed_endpoints(&self) -> usize {
        self.endpoints
            .iter()
            .filter(|e| e.error_message.is_some())
            .count()
    }
}

/// Loads the most recent runs, newest first
///
/// # Arguments
///
/// * `storage` - The storage backend to query
/// * `limit` - Maximum number of runs to load
///
/// # Returns
///
/// * `Ok(Vec<RunHistory>)` - Successfully loaded history
/// * `Err(ExtractError)` - Failed to query history
pub fn load_history(storage: &dyn Storage, limit: usize) -> Result<Vec<RunHistory>, ExtractError> {
    let mut history = Vec::new();

    for run in storage.get_recent_runs(limit)? {
        let endpoints = storage.get_endpoint_records(run.id)?;
        let duration_seconds = duration_of(&run);
        history.push(RunHistory {
            run,
            endpoints,
            duration_seconds,
        });
    }

    Ok(history)
}

fn duration_of(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<DateTime<Utc>>().ok()?;
    let finished = run.finished_at.as_ref()?.parse::<DateTime<Utc>>().ok()?;
    Some((finished - started).num_seconds())
}

/// Prints run history to stdout in a formatted manner
pub fn print_history(history: &[RunHistory]) {
    println!("=== Extraction History ===\n");

    if history.is_empty() {
        println!("No extraction runs recorded.");
        return;
    }

    for entry in history {
        let run = &entry.run;
        println!(
            "Run {} [{}] started {} ({} mode)",
            run.id,
            run.status.to_db_string(),
            run.started_at,
            run.load_mode
        );
        match entry.duration_seconds {
            Some(secs) => println!("  Duration: {}s", secs),
            None => println!("  Duration: unfinished"),
        }
        println!("  Records: {}", run.total_records);
        println!("  Config hash: {}", run.config_hash);

        for endpoint in &entry.endpoints {
            match &endpoint.error_message {
                Some(error) => println!(
                    "    {:<24} {:<12} {}",
                    endpoint.endpoint, endpoint.status, error
                ),
                None => println!(
                    "    {:<24} {:<12} {} rows",
                    endpoint.endpoint, endpoint.status, endpoint.record_count
                ),
            }
        }
        if entry.failed_endpoints() > 0 {
            println!("  Failed endpoints: {}", entry.failed_endpoints());
        }
        println!();
    }
}
