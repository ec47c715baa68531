//! Canvas-Extract main entry point
//!
//! This is the command-line interface for the Canvas LMS extractor.

use anyhow::{bail, Context};
use canvas_extract::config::{load_config_with_hash, Config};
use canvas_extract::output::{load_history, print_history, print_report};
use canvas_extract::storage::{LoadMode, SqliteStorage};
use canvas_extract::{Coordinator, Endpoint};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Canvas-Extract: pulls Canvas LMS data into a relational store
///
/// Canvas-Extract fetches users, courses, enrollments, quizzes, assignments,
/// discussions and their submissions and entries from one Canvas account,
/// and loads one table per endpoint into a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "canvas-extract")]
#[command(version = "1.0.0")]
#[command(about = "Resilient Canvas LMS extractor", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// How to treat existing tables (overrides the config file)
    #[arg(long, value_name = "MODE")]
    load_mode: Option<LoadMode>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show what would be extracted without making requests
    #[arg(long, conflicts_with = "history")]
    dry_run: bool,

    /// Show recent runs from the database and exit
    #[arg(long, conflicts_with = "dry_run")]
    history: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let load_mode = cli.load_mode.unwrap_or(config.extraction.load_mode);

    if cli.dry_run {
        handle_dry_run(&config, load_mode);
        Ok(())
    } else if cli.history {
        handle_history(&config)
    } else {
        handle_extract(config, config_hash, load_mode).await
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("canvas_extract=info,warn"),
            1 => EnvFilter::new("canvas_extract=debug,info"),
            2 => EnvFilter::new("canvas_extract=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows what would be extracted
fn handle_dry_run(config: &Config, load_mode: LoadMode) {
    println!("=== Canvas-Extract Dry Run ===\n");

    println!("Source:");
    println!("  Host: {}", config.canvas.host);
    println!("  Account: {}", config.canvas.account_id);
    println!("  Page size: {}", config.canvas.per_page);
    let token = match (&config.canvas.bearer_token, std::env::var(&config.canvas.token_env)) {
        (Some(_), _) => "from config".to_string(),
        (None, Ok(_)) => format!("from ${}", config.canvas.token_env),
        (None, Err(_)) => format!("MISSING (${} not set)", config.canvas.token_env),
    };
    println!("  Token: {}", token);
    println!();

    println!("Retry Policy:");
    println!(
        "  Requests: {} attempts, {:?} apart",
        config.retry.max_attempts,
        config.retry.delay()
    );
    println!(
        "  Transport: {} retries, {:?} base backoff",
        config.retry.transport_retries,
        config.retry.transport_backoff()
    );
    println!(
        "  Endpoints: {} retries, {:?} apart",
        config.extraction.endpoint_retries,
        config.extraction.endpoint_retry_delay()
    );
    println!();

    println!("Destination:");
    println!("  Database: {}", config.output.database_path);
    println!("  Load mode: {}", load_mode);
    println!(
        "  Concurrency: {} endpoints",
        config.extraction.max_concurrent_endpoints
    );
    if let Some(deadline) = config.extraction.deadline() {
        println!("  Deadline: {:?}", deadline);
    }
    println!();

    println!("Endpoints ({}):", Endpoint::ALL.len());
    for endpoint in Endpoint::ALL {
        let stamps = endpoint.stamped_fields();
        if stamps.is_empty() {
            println!(
                "  {:<24} → {:<30} [{}]",
                endpoint.name(),
                endpoint.table_name(),
                endpoint.strategy()
            );
        } else {
            println!(
                "  {:<24} → {:<30} [{}; stamps {}]",
                endpoint.name(),
                endpoint.table_name(),
                endpoint.strategy(),
                stamps.join(", ")
            );
        }
    }
    println!();

    println!("✓ Configuration is valid");
}

/// Handles the --history mode: lists recent runs
fn handle_history(config: &Config) -> anyhow::Result<()> {
    let db_path = Path::new(&config.output.database_path);
    if !db_path.exists() {
        println!("No database found at: {}", db_path.display());
        return Ok(());
    }

    let storage = SqliteStorage::new(db_path).context("failed to open database")?;
    let history = load_history(&storage, 10).context("failed to read run history")?;
    print_history(&history);
    Ok(())
}

/// Handles the main extraction
async fn handle_extract(
    config: Config,
    config_hash: String,
    load_mode: LoadMode,
) -> anyhow::Result<()> {
    let db_path = config.output.database_path.clone();
    let storage = SqliteStorage::new(Path::new(&db_path))
        .with_context(|| format!("destination store unreachable: {}", db_path))?;

    let mut coordinator = Coordinator::new(config, storage)
        .context("failed to prepare extraction")?
        .with_config_hash(config_hash);

    let report = coordinator.run(load_mode).await?;
    print_report(&report);

    if !report.is_complete() {
        bail!(
            "{} of {} endpoints failed ({} processed)",
            report.failures.len(),
            report.endpoints_attempted(),
            report.endpoints_processed()
        );
    }
    Ok(())
}
