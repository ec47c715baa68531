//! Storage module for persisting extracted records
//!
//! This module handles all database operations for the extractor, including:
//! - Bulk loading of normalized records into one table per endpoint
//! - Replace / append / fail-if-exists load modes
//! - Run and per-endpoint bookkeeping for the extraction history

mod schema;
mod sqlite;
mod traits;

pub use sqlite::{quote_identifier, SqliteStorage};
pub use traits::{Storage, StorageError, StorageResult};

use crate::extract::Endpoint;
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// How new records interact with an existing destination table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Drop the existing table and recreate it from this run's records
    Replace,

    /// Add this run's records to the existing rows
    #[default]
    Append,

    /// Refuse to write if the table already exists
    Fail,
}

impl LoadMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Append => "append",
            Self::Fail => "fail",
        }
    }
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            "fail" => Ok(Self::Fail),
            other => Err(format!(
                "unknown load mode '{}' (expected replace, append or fail)",
                other
            )),
        }
    }
}

/// Outcome of a successful load step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Records were written
    Saved,

    /// The endpoint returned no records; nothing was written
    NoData,
}

impl LoadStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Saved => "saved",
            Self::NoData => "no_data",
        }
    }
}

/// Result of loading one endpoint's records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadResult {
    pub endpoint: Endpoint,
    pub table_name: String,
    pub record_count: usize,
    pub load_mode: LoadMode,
    pub status: LoadStatus,
}

/// Status of an extraction run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Represents an extraction run in the database
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub load_mode: String,
    pub status: RunStatus,
    pub total_records: u64,
}

/// Represents one endpoint's outcome within a run
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub run_id: i64,
    pub endpoint: String,
    pub table_name: String,
    pub record_count: u64,
    pub status: String,
    pub error_message: Option<String>,
    pub recorded_at: String,
}
