//! Storage traits and error types
//!
//! This module defines the trait interface for destination stores and
//! associated error types.

use crate::api::Record;
use crate::storage::{EndpointRecord, LoadMode, RunRecord, RunStatus};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Table {0} already exists (load mode 'fail')")]
    TableExists(String),

    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for destination store implementations
///
/// Loads are invoked one endpoint at a time from the coordinator's own control
/// flow, so implementations need no internal locking.
pub trait Storage {
    // ===== Connectivity =====

    /// Verifies the store can be queried
    fn ping(&self) -> StorageResult<()>;

    // ===== Record Loading =====

    /// Writes `records` into `table` under `mode` as one unit of work
    ///
    /// # Arguments
    ///
    /// * `table` - Destination table name
    /// * `records` - Normalized records (scalar values only)
    /// * `mode` - Replace, append, or fail if the table exists
    ///
    /// # Returns
    ///
    /// The number of rows written
    fn write_records(
        &mut self,
        table: &str,
        records: &[Record],
        mode: LoadMode,
    ) -> StorageResult<usize>;

    /// Checks whether a table exists
    fn table_exists(&self, table: &str) -> StorageResult<bool>;

    /// Counts the rows of a table
    fn count_rows(&self, table: &str) -> StorageResult<u64>;

    // ===== Run Management =====

    /// Creates a new extraction run
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str, mode: LoadMode) -> StorageResult<i64>;

    /// Records one endpoint's outcome for a run
    fn record_endpoint(
        &mut self,
        run_id: i64,
        endpoint: &str,
        table_name: &str,
        record_count: u64,
        status: &str,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Marks a run as finished
    fn finish_run(&mut self, run_id: i64, status: RunStatus, total_records: u64)
        -> StorageResult<()>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent runs, newest first
    fn get_recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>>;

    /// Gets the endpoint outcomes recorded for a run
    fn get_endpoint_records(&self, run_id: i64) -> StorageResult<Vec<EndpointRecord>>;
}
