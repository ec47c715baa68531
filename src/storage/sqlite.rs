//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Storage trait.
//! Record tables get their columns from the records they receive: a column's
//! type is INTEGER when every non-null value is an integer or boolean, REAL
//! when the values are numeric, and TEXT otherwise.

use crate::api::Record;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{EndpointRecord, LoadMode, RunRecord, RunStatus};
use crate::ExtractError;
use chrono::Utc;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Opens (or creates) the database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(ExtractError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, ExtractError> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, ExtractError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn read_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<RunRecord> {
        Ok(RunRecord {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            config_hash: row.get(3)?,
            load_mode: row.get(4)?,
            status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
                .unwrap_or(RunStatus::Running),
            total_records: row.get::<_, i64>(6)? as u64,
        })
    }
}

/// Quotes a table or column name for interpolation into SQL
pub fn quote_identifier(name: &str) -> StorageResult<String> {
    if name.is_empty() || name.contains('\0') {
        return Err(StorageError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(Self::Integer),
            Value::Number(n) if n.is_i64() => Some(Self::Integer),
            Value::Number(n) if n.is_f64() => Some(Self::Real),
            _ => Some(Self::Text),
        }
    }

    fn widen(self, other: Self) -> Self {
        match (self, other) {
            (a, b) if a == b => a,
            (Self::Text, _) | (_, Self::Text) => Self::Text,
            _ => Self::Real,
        }
    }
}

/// A destination column inferred from the records
#[derive(Debug)]
struct Column {
    name: String,
    /// `None` while only nulls have been seen
    kind: Option<ColumnType>,
}

impl Column {
    fn sql_type(&self) -> &'static str {
        self.kind.unwrap_or(ColumnType::Text).sql()
    }
}

/// Infers columns in first-seen order; names differing only in case share a column
fn infer_columns(records: &[Record]) -> Vec<Column> {
    let mut columns: Vec<Column> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for record in records {
        for (key, value) in record {
            let slot = *index.entry(key.to_lowercase()).or_insert_with(|| {
                columns.push(Column {
                    name: key.clone(),
                    kind: None,
                });
                columns.len() - 1
            });

            if let Some(kind) = ColumnType::of(value) {
                let column = &mut columns[slot];
                column.kind = Some(column.kind.map_or(kind, |k| k.widen(kind)));
            }
        }
    }

    columns
}

/// Maps a scalar JSON value to the SQLite value stored for it
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if n.is_f64() {
                n.as_f64().map_or(SqlValue::Null, SqlValue::Real)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        nested => SqlValue::Text(nested.to_string()),
    }
}

fn table_exists_in(conn: &Connection, table: &str) -> StorageResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        params![table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn existing_columns(tx: &Transaction<'_>, quoted_table: &str) -> StorageResult<HashSet<String>> {
    let mut stmt = tx.prepare(&format!("PRAGMA table_info({})", quoted_table))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(1))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(names.into_iter().map(|n| n.to_lowercase()).collect())
}

fn create_table(tx: &Transaction<'_>, quoted_table: &str, columns: &[Column]) -> StorageResult<()> {
    let defs = columns
        .iter()
        .map(|c| Ok(format!("{} {}", quote_identifier(&c.name)?, c.sql_type())))
        .collect::<StorageResult<Vec<_>>>()?;
    tx.execute(
        &format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quoted_table,
            defs.join(", ")
        ),
        [],
    )?;
    Ok(())
}

fn add_missing_columns(
    tx: &Transaction<'_>,
    quoted_table: &str,
    columns: &[Column],
) -> StorageResult<()> {
    let existing = existing_columns(tx, quoted_table)?;
    for column in columns {
        if existing.contains(&column.name.to_lowercase()) {
            continue;
        }
        tracing::debug!("Adding column {} to {}", column.name, quoted_table);
        tx.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quoted_table,
                quote_identifier(&column.name)?,
                column.sql_type()
            ),
            [],
        )?;
    }
    Ok(())
}

fn insert_rows(
    tx: &Transaction<'_>,
    quoted_table: &str,
    columns: &[Column],
    records: &[Record],
) -> StorageResult<usize> {
    let names = columns
        .iter()
        .map(|c| quote_identifier(&c.name))
        .collect::<StorageResult<Vec<_>>>()?;
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");

    let mut stmt = tx.prepare(&format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quoted_table,
        names.join(", "),
        placeholders
    ))?;

    let mut written = 0;
    for record in records {
        let by_name: HashMap<String, &Value> = record
            .iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        let values = columns.iter().map(|c| {
            by_name
                .get(&c.name.to_lowercase())
                .map_or(SqlValue::Null, |v| to_sql_value(v))
        });
        written += stmt.execute(params_from_iter(values))?;
    }
    Ok(written)
}

impl Storage for SqliteStorage {
    // ===== Connectivity =====

    fn ping(&self) -> StorageResult<()> {
        self.conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    // ===== Record Loading =====

    fn write_records(
        &mut self,
        table: &str,
        records: &[Record],
        mode: LoadMode,
    ) -> StorageResult<usize> {
        let quoted = quote_identifier(table)?;
        let columns = infer_columns(records);
        if columns.is_empty() {
            tracing::debug!("No columns to write into {}", table);
            return Ok(0);
        }

        let tx = self.conn.transaction()?;
        let exists = table_exists_in(&tx, table)?;

        match mode {
            LoadMode::Fail if exists => return Err(StorageError::TableExists(table.to_string())),
            LoadMode::Replace if exists => {
                tx.execute(&format!("DROP TABLE {}", quoted), [])?;
                create_table(&tx, &quoted, &columns)?;
            }
            LoadMode::Append if exists => add_missing_columns(&tx, &quoted, &columns)?,
            _ => create_table(&tx, &quoted, &columns)?,
        }

        let written = insert_rows(&tx, &quoted, &columns, records)?;
        tx.commit()?;

        tracing::debug!("Wrote {} rows to {} ({})", written, table, mode);
        Ok(written)
    }

    fn table_exists(&self, table: &str) -> StorageResult<bool> {
        table_exists_in(&self.conn, table)
    }

    fn count_rows(&self, table: &str) -> StorageResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)?),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str, mode: LoadMode) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO extraction_runs (started_at, config_hash, load_mode, status)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                now,
                config_hash,
                mode.as_str(),
                RunStatus::Running.to_db_string()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn record_endpoint(
        &mut self,
        run_id: i64,
        endpoint: &str,
        table_name: &str,
        record_count: u64,
        status: &str,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO endpoint_loads
                (run_id, endpoint, table_name, record_count, status, error_message, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                run_id,
                endpoint,
                table_name,
                record_count as i64,
                status,
                error_message,
                now
            ],
        )?;
        Ok(())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        total_records: u64,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE extraction_runs SET finished_at = ?1, status = ?2, total_records = ?3
             WHERE id = ?4",
            params![now, status.to_db_string(), total_records as i64, run_id],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        self.conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, load_mode, status, total_records
                 FROM extraction_runs WHERE id = ?1",
                params![run_id],
                Self::read_run,
            )
            .map_err(|_| StorageError::RunNotFound(run_id))
    }

    fn get_recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, load_mode, status, total_records
             FROM extraction_runs ORDER BY id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], Self::read_run)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    fn get_endpoint_records(&self, run_id: i64) -> StorageResult<Vec<EndpointRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT run_id, endpoint, table_name, record_count, status, error_message, recorded_at
             FROM endpoint_loads WHERE run_id = ?1 ORDER BY id",
        )?;
        let records = stmt
            .query_map(params![run_id], |row| {
                Ok(EndpointRecord {
                    run_id: row.get(0)?,
                    endpoint: row.get(1)?,
                    table_name: row.get(2)?,
                    record_count: row.get::<_, i64>(3)? as u64,
                    status: row.get(4)?,
                    error_message: row.get(5)?,
                    recorded_at: row.get(6)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
