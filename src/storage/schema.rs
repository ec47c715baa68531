//! Bookkeeping schema
//!
//! Record tables are created on demand from the data they receive; only the
//! run history tables have a fixed schema.

/// SQL schema for the run history tables
pub const SCHEMA_SQL: &str = r#"
-- Track extraction runs
CREATE TABLE IF NOT EXISTS extraction_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    load_mode TEXT NOT NULL,
    status TEXT NOT NULL,
    total_records INTEGER NOT NULL DEFAULT 0
);

-- Track each endpoint's outcome within a run
CREATE TABLE IF NOT EXISTS endpoint_loads (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    run_id INTEGER NOT NULL REFERENCES extraction_runs(id),
    endpoint TEXT NOT NULL,
    table_name TEXT NOT NULL,
    record_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL,
    error_message TEXT,
    recorded_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_endpoint_loads_run ON endpoint_loads(run_id);
"#;

/// Initializes the bookkeeping schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
