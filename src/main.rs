//! Logsift CLI entry point.
//!
//! `run` performs the daily batch (scan, aggregate, upsert). `scan` is the
//! same aggregation without the database. `init-db` creates the table and
//! `show` prints what is stored for a date. A non-zero exit status means
//! the run failed and may be retried by the scheduler.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use logsift::config::Config;
use logsift::logging::{self, LoggingGuard};
use logsift::persister::Persister;
use logsift::pipeline;
use logsift::run_date::{parse_run_date, resolve_run_date, today};
use logsift::scanner::scan_directory;
use logsift::store::open_store;

/// Logsift: daily error-signature aggregation for plain-text logs.
#[derive(Parser)]
#[command(name = "logsift", version, about)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

/// Available CLI subcommands.
#[derive(Subcommand)]
enum Command {
    /// Scan the log directory and upsert the counts for the run date.
    Run {
        /// Directory to scan instead of `LOG_DIR`.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Run date (YYYY-MM-DD) instead of `RUN_DATE`.
        #[arg(long)]
        run_date: Option<String>,
    },
    /// Aggregate without writing; print signatures by descending count.
    Scan {
        /// Directory to scan instead of `LOG_DIR`.
        #[arg(long)]
        log_dir: Option<PathBuf>,
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Create the destination table if it does not exist.
    InitDb,
    /// Print the stored counts for a date.
    Show {
        /// Date to show (YYYY-MM-DD); defaults to today.
        #[arg(long)]
        run_date: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = Config::from_env().context("failed to load configuration")?;
    let _logging_guard = init_logging(&config)?;
    config.log_loaded();

    match cli.command {
        Command::Run { log_dir, run_date } => {
            if let Some(dir) = log_dir {
                config.log_dir = dir;
            }
            if run_date.is_some() {
                config.run_date_override = run_date;
            }
            handle_run(&config).await
        }
        Command::Scan { log_dir, json } => {
            if let Some(dir) = log_dir {
                config.log_dir = dir;
            }
            handle_scan(&config, json)
        }
        Command::InitDb => handle_init_db(&config).await,
        Command::Show { run_date } => handle_show(&config, run_date.as_deref()).await,
    }
}

fn init_logging(config: &Config) -> anyhow::Result<Option<LoggingGuard>> {
    match &config.trace_dir {
        Some(dir) => logging::init_production(dir).map(Some),
        None => {
            logging::init_cli();
            Ok(None)
        }
    }
}

async fn handle_run(config: &Config) -> anyhow::Result<()> {
    let persister = Persister::new(open_store(&config.database), config.db_timeout);
    let summary = pipeline::run(config, &persister, today()).await?;
    info!(
        run_date = %summary.run_date,
        error_lines = summary.error_lines,
        "run finished"
    );
    Ok(())
}

fn handle_scan(config: &Config, json: bool) -> anyhow::Result<()> {
    let report = scan_directory(&config.log_dir)
        .with_context(|| format!("failed to scan {}", config.log_dir.display()))?;

    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("failed to render scan report")?;
        println!("{rendered}");
    } else {
        for (signature, count) in report.counts.ranked() {
            println!("{count}\t{signature}");
        }
    }
    Ok(())
}

async fn handle_init_db(config: &Config) -> anyhow::Result<()> {
    let store = open_store(&config.database);
    tokio::time::timeout(config.db_timeout, store.ensure_schema())
        .await
        .context("schema bootstrap timed out")?
        .context("failed to create log_table")?;
    info!(backend = store.backend(), "log_table ready");
    Ok(())
}

async fn handle_show(config: &Config, run_date: Option<&str>) -> anyhow::Result<()> {
    let date = match run_date {
        Some(raw) => parse_run_date(raw)?,
        None => resolve_run_date(config.run_date_override.as_deref(), today()),
    };
    let store = open_store(&config.database);
    let rows = tokio::time::timeout(config.db_timeout, store.load_counts(date))
        .await
        .context("query timed out")?
        .with_context(|| format!("failed to load counts for {date}"))?;

    for row in rows {
        println!("{}\t{}", row.count, row.signature);
    }
    Ok(())
}
