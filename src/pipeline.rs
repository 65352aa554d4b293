//! One batch run: resolve the date, scan, aggregate, persist.

use anyhow::Context;
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::config::Config;
use crate::persister::Persister;
use crate::run_date::resolve_run_date;
use crate::scanner::scan_directory;

/// What a completed run did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Date the counts were attributed to.
    pub run_date: NaiveDate,
    /// Files read to the end.
    pub files_parsed: usize,
    /// Files skipped because of read failures.
    pub files_failed: usize,
    /// Distinct signatures found.
    pub signatures: usize,
    /// Total error lines counted.
    pub error_lines: u64,
    /// Rows written to the store.
    pub rows_written: u64,
}

/// Run the batch against `persister`, attributing counts to the configured
/// run date (or `today` when none is valid).
///
/// Unreadable files are skipped; only a persistence failure (or an
/// unlistable log directory) fails the run.
///
/// # Errors
///
/// Returns an error if the log directory cannot be listed or the upsert
/// fails.
pub async fn run(
    config: &Config,
    persister: &Persister,
    today: NaiveDate,
) -> anyhow::Result<RunSummary> {
    let run_date = resolve_run_date(config.run_date_override.as_deref(), today);

    let report = scan_directory(&config.log_dir)
        .with_context(|| format!("failed to scan {}", config.log_dir.display()))?;

    let rows_written = persister
        .upsert(&report.counts, run_date)
        .await
        .with_context(|| format!("failed to persist counts for {run_date}"))?;

    let summary = RunSummary {
        run_date,
        files_parsed: report.files_parsed,
        files_failed: report.files_failed,
        signatures: report.counts.len(),
        error_lines: report.counts.total(),
        rows_written,
    };

    info!(
        %run_date,
        files_parsed = summary.files_parsed,
        files_failed = summary.files_failed,
        signatures = summary.signatures,
        rows = summary.rows_written,
        "run completed"
    );
    Ok(summary)
}
