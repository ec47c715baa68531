//! Extraction coordinator - fan-out over endpoints, fan-in into the store
//!
//! This module contains the run loop that coordinates an extraction:
//! - Checking the destination store before any request is made
//! - Fetching every endpoint concurrently, bounded by a semaphore
//! - Loading each endpoint as soon as its fetch completes
//! - Recording per-endpoint outcomes and the final run status

use crate::api::{Record, RetryPolicy, Session};
use crate::config::Config;
use crate::extract::collector::Collector;
use crate::extract::endpoints::Endpoint;
use crate::output::{EndpointFailure, ExtractionReport, FailureStage};
use crate::storage::{LoadMode, LoadResult, LoadStatus, RunStatus, SqliteStorage, Storage};
use crate::{ExtractError, Result};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Records fetched for one endpoint
#[derive(Debug, Clone)]
pub struct EndpointResult {
    pub endpoint: Endpoint,
    pub records: Vec<Record>,
}

impl EndpointResult {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

type TaskOutput = (Endpoint, Result<EndpointResult>);

/// Main extraction coordinator structure
pub struct Coordinator<S: Storage> {
    config: Arc<Config>,
    session: Arc<Session>,
    storage: S,
    config_hash: String,
    endpoints: Vec<Endpoint>,
}

impl<S: Storage> Coordinator<S> {
    /// Creates a new coordinator over all endpoints
    ///
    /// # Arguments
    ///
    /// * `config` - The extraction configuration
    /// * `storage` - Destination store for records and run bookkeeping
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Session built, ready to run
    /// * `Err(ExtractError)` - Missing token or unusable host
    pub fn new(config: Config, storage: S) -> Result<Self> {
        let session = Session::new(&config.canvas, &config.retry)?;
        Ok(Self {
            config: Arc::new(config),
            session: Arc::new(session),
            storage,
            config_hash: String::new(),
            endpoints: Endpoint::ALL.to_vec(),
        })
    }

    /// Sets the configuration hash recorded with the run
    pub fn with_config_hash(mut self, hash: impl Into<String>) -> Self {
        self.config_hash = hash.into();
        self
    }

    /// Restricts the run to a subset of endpoints
    pub fn with_endpoints(mut self, endpoints: &[Endpoint]) -> Self {
        let unique: BTreeSet<Endpoint> = endpoints.iter().copied().collect();
        self.endpoints = Endpoint::ALL
            .iter()
            .copied()
            .filter(|e| unique.contains(e))
            .collect();
        self
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Runs one extraction
    ///
    /// Endpoint failures never abort the run; they are collected in the
    /// report. A failing per-endpoint bookkeeping write is logged and the run
    /// carries on. Only an unreachable store or a failure to open or close
    /// the run row surfaces as an error.
    pub async fn run(&mut self, load_mode: LoadMode) -> Result<ExtractionReport> {
        self.storage
            .ping()
            .map_err(|e| ExtractError::StoreUnreachable(e.to_string()))?;

        let started = Instant::now();
        let run_id = self.storage.create_run(&self.config_hash, load_mode)?;
        tracing::info!(
            "Starting run {} over {} endpoints ({} mode)",
            run_id,
            self.endpoints.len(),
            load_mode
        );

        let mut report = ExtractionReport {
            run_id,
            load_mode,
            results: Vec::new(),
            failures: Vec::new(),
            elapsed: Duration::ZERO,
        };

        let mut tasks = self.spawn_fetches();
        let mut pending: BTreeSet<Endpoint> = self.endpoints.iter().copied().collect();
        let deadline = self
            .config
            .extraction
            .deadline()
            .and_then(|d| deadline_after(tokio::time::Instant::now(), d));
        let mut timed_out = false;

        loop {
            let joined = match deadline {
                Some(at) => match tokio::time::timeout_at(at, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tracing::warn!("Deadline reached with {} endpoints pending", pending.len());
                        tasks.abort_all();
                        timed_out = true;
                        break;
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = joined else { break };
            match joined {
                Ok((endpoint, outcome)) => {
                    pending.remove(&endpoint);
                    self.settle(run_id, endpoint, outcome, load_mode, &mut report);
                }
                Err(e) => tracing::error!("Extraction task ended abnormally: {}", e),
            }
        }

        let reason = if timed_out {
            "deadline exceeded"
        } else {
            "task failed"
        };
        for endpoint in pending {
            self.record_failure(run_id, endpoint, FailureStage::Fetch, reason.to_string(), &mut report);
        }

        let status = final_status(&report);
        self.storage
            .finish_run(run_id, status, report.total_records() as u64)?;
        report.elapsed = started.elapsed();

        tracing::info!(
            "Run {} {}: {} records loaded, {} endpoints failed",
            run_id,
            status.to_db_string(),
            report.total_records(),
            report.failures.len()
        );
        Ok(report)
    }

    /// Spawns one bounded fetch task per endpoint
    fn spawn_fetches(&self) -> JoinSet<TaskOutput> {
        let extraction = &self.config.extraction;
        let collector = Arc::new(Collector::new(
            Arc::clone(&self.session),
            RetryPolicy::from(&self.config.retry),
            self.config.canvas.per_page,
        ));
        let semaphore = Arc::new(Semaphore::new(extraction.max_concurrent_endpoints.max(1)));
        let retries = extraction.endpoint_retries;
        let delay = extraction.endpoint_retry_delay();

        let mut tasks = JoinSet::new();
        for &endpoint in &self.endpoints {
            let collector = Arc::clone(&collector);
            let semaphore = Arc::clone(&semaphore);
            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = collect_with_retries(&collector, endpoint, retries, delay).await;
                (endpoint, outcome)
            });
        }
        tasks
    }

    /// Loads a completed fetch, or records why it failed
    fn settle(
        &mut self,
        run_id: i64,
        endpoint: Endpoint,
        outcome: Result<EndpointResult>,
        load_mode: LoadMode,
        report: &mut ExtractionReport,
    ) {
        let fetched = match outcome {
            Ok(fetched) => fetched,
            Err(e) => {
                tracing::error!("{}: fetch failed: {}", endpoint, e);
                self.record_failure(run_id, endpoint, FailureStage::Fetch, e.to_string(), report);
                return;
            }
        };

        tracing::info!("{}: fetched {} records", endpoint, fetched.record_count());
        if let Some(first) = fetched.records.first() {
            tracing::debug!(
                "{}: sample record {}",
                endpoint,
                serde_json::to_string(first).unwrap_or_default()
            );
        }

        match self.load(fetched, load_mode) {
            Ok(loaded) => {
                let recorded = self.storage.record_endpoint(
                    run_id,
                    endpoint.name(),
                    &loaded.table_name,
                    loaded.record_count as u64,
                    loaded.status.to_db_string(),
                    None,
                );
                if let Err(e) = recorded {
                    tracing::error!("{}: could not record load outcome: {}", endpoint, e);
                }
                report.results.push(loaded);
            }
            Err(e) => {
                tracing::error!("{}: load failed: {}", endpoint, e);
                self.record_failure(run_id, endpoint, FailureStage::Load, e.to_string(), report)
            }
        }
    }

    /// Writes one endpoint's records; an empty set is reported without a write
    fn load(&mut self, fetched: EndpointResult, mode: LoadMode) -> Result<LoadResult> {
        let endpoint = fetched.endpoint;
        let table_name = endpoint.table_name().to_string();

        if fetched.records.is_empty() {
            tracing::info!("{}: no data, {} left untouched", endpoint, table_name);
            return Ok(LoadResult {
                endpoint,
                table_name,
                record_count: 0,
                load_mode: mode,
                status: LoadStatus::NoData,
            });
        }

        let written = self
            .storage
            .write_records(&table_name, &fetched.records, mode)?;
        tracing::info!("{}: saved {} rows to {}", endpoint, written, table_name);

        Ok(LoadResult {
            endpoint,
            table_name,
            record_count: written,
            load_mode: mode,
            status: LoadStatus::Saved,
        })
    }

    fn record_failure(
        &mut self,
        run_id: i64,
        endpoint: Endpoint,
        stage: FailureStage,
        error: String,
        report: &mut ExtractionReport,
    ) {
        let recorded = self.storage.record_endpoint(
            run_id,
            endpoint.name(),
            endpoint.table_name(),
            0,
            stage.to_db_string(),
            Some(&error),
        );
        if let Err(e) = recorded {
            tracing::error!("{}: could not record failure: {}", endpoint, e);
        }
        report.failures.push(EndpointFailure {
            endpoint,
            stage,
            error,
        });
    }
}

/// Fetches an endpoint, retrying the whole hierarchy on fetch errors
async fn collect_with_retries(
    collector: &Collector,
    endpoint: Endpoint,
    retries: u32,
    delay: Duration,
) -> Result<EndpointResult> {
    let mut attempt = 0;
    loop {
        match collector.collect(endpoint).await {
            Ok(records) => return Ok(EndpointResult { endpoint, records }),
            Err(ExtractError::Fetch(e)) if attempt < retries => {
                attempt += 1;
                tracing::warn!(
                    "{}: {} (endpoint retry {}/{} in {:?})",
                    endpoint,
                    e,
                    attempt,
                    retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Instant `timeout` after `now`; `None` when that is past the clock's range
fn deadline_after(now: tokio::time::Instant, timeout: Duration) -> Option<tokio::time::Instant> {
    let at = now.checked_add(timeout);
    if at.is_none() {
        tracing::warn!("Deadline of {:?} is out of range, running without one", timeout);
    }
    at
}

fn final_status(report: &ExtractionReport) -> RunStatus {
    if report.is_complete() {
        RunStatus::Completed
    } else if report.results.is_empty() {
        RunStatus::Failed
    } else {
        RunStatus::Partial
    }
}

/// Opens the configured database and runs a full extraction
///
/// # Returns
///
/// * `Ok(ExtractionReport)` - The run finished (possibly with endpoint failures)
/// * `Err(ExtractError::StoreUnreachable)` - The database could not be opened
pub async fn run_extraction(config: Config, load_mode: LoadMode) -> Result<ExtractionReport> {
    let path = config.output.database_path.clone();
    let storage = SqliteStorage::new(Path::new(&path))
        .map_err(|e| ExtractError::StoreUnreachable(format!("{}: {}", path, e)))?;

    Coordinator::new(config, storage)?.run(load_mode).await
}
