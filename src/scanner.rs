//! Log directory scanning.
//!
//! Lists `.log` files in a directory (non-recursive) and feeds each one
//! through an [`Aggregator`]. Uses synchronous `std::fs` reads since these
//! are quick local operations. A file that cannot be read is logged and
//! skipped; it never aborts the scan.

use std::fs;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::aggregator::{Aggregator, SignatureCounts};

/// File extension (without the dot) of files picked up by a scan.
pub const LOG_EXTENSION: &str = "log";

/// Errors listing the log directory itself.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    /// The directory exists but could not be listed.
    #[error("failed to list log directory {path}: {source}")]
    ListDir {
        /// Directory being listed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
}

/// A single log file could not be fully read.
#[derive(Debug, thiserror::Error)]
#[error("failed to read {path} after {lines_read} lines: {source}")]
pub struct FileReadError {
    /// File that failed.
    pub path: PathBuf,
    /// Lines ingested before the failure.
    pub lines_read: u64,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}

/// Outcome of scanning one directory.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanReport {
    /// Aggregated signature counts over all readable lines.
    pub counts: SignatureCounts,
    /// Files read to the end.
    pub files_parsed: usize,
    /// Files skipped (entirely or partially) because of read failures.
    pub files_failed: usize,
}

/// List files in `dir` whose name ends in `.log`, sorted by path.
///
/// A missing directory yields an empty list.
///
/// # Errors
///
/// Returns [`ScanError::ListDir`] if the directory exists but cannot be read.
pub fn list_log_files(dir: &Path) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(dir).map_err(|source| ScanError::ListDir {
        path: dir.to_path_buf(),
        source,
    })?;

    Ok(select_log_files(
        dir,
        entries.map(|entry| entry.map(|entry| entry.path())),
    ))
}

/// Keep `.log` paths in sorted order. Entries that fail to read are
/// logged and skipped.
fn select_log_files<I>(dir: &Path, entries: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = io::Result<PathBuf>>,
{
    let mut files = Vec::new();
    for entry in entries {
        match entry {
            Ok(path) if has_log_extension(&path) => files.push(path),
            Ok(_) => {}
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
            }
        }
    }
    files.sort();
    files
}

/// Matches on the raw name bytes so names that are not valid UTF-8 still
/// qualify.
fn has_log_extension(path: &Path) -> bool {
    path.file_name().is_some_and(|name| {
        let name = name.as_encoded_bytes();
        name.strip_suffix(LOG_EXTENSION.as_bytes())
            .is_some_and(|stem| stem.ends_with(b"."))
    })
}

/// Ingest one file into `aggregator`.
///
/// Returns the number of lines read. Lines read before a failure remain
/// counted.
///
/// # Errors
///
/// Returns [`FileReadError`] if the file cannot be opened or a read fails.
pub fn ingest_file(aggregator: &mut Aggregator, path: &Path) -> Result<u64, FileReadError> {
    let file = fs::File::open(path).map_err(|source| FileReadError {
        path: path.to_path_buf(),
        lines_read: 0,
        source,
    })?;

    aggregator
        .ingest_reader(BufReader::new(file))
        .map_err(|partial| FileReadError {
            path: path.to_path_buf(),
            lines_read: partial.lines_read,
            source: partial.source,
        })
}

/// Scan every `.log` file in `dir` and aggregate its error signatures.
///
/// A missing directory is reported as a warning and yields empty counts.
///
/// # Errors
///
/// Returns [`ScanError`] only when an existing directory cannot be listed.
/// Per-file failures are logged and counted in the report instead.
pub fn scan_directory(dir: &Path) -> Result<ScanReport, ScanError> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "log directory does not exist");
        return Ok(ScanReport::default());
    }

    let mut aggregator = Aggregator::new();
    let mut report = ScanReport::default();

    for path in list_log_files(dir)? {
        info!(file = %path.display(), "parsing file");
        match ingest_file(&mut aggregator, &path) {
            Ok(lines) => {
                report.files_parsed = report.files_parsed.saturating_add(1);
                debug!(file = %path.display(), lines, "file parsed");
            }
            Err(e) => {
                report.files_failed = report.files_failed.saturating_add(1);
                error!(file = %path.display(), lines_read = e.lines_read, error = %e.source, "failed to read log file");
            }
        }
    }

    report.counts = aggregator.into_result();
    Ok(report)
}
