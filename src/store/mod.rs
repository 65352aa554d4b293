//! Durable storage for daily signature counts.
//!
//! [`SummaryStore`] is the seam between the run and its database. Each call
//! acquires one connection from stored connect options, does its work, and
//! releases the connection on every exit path. Writes of a whole run happen
//! in one transaction: all rows commit or none do.

pub mod postgres;
pub mod sqlite;

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Database, Encode, QueryBuilder, Type};

use crate::aggregator::RunRecord;
use crate::config::DatabaseTarget;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

/// Destination table for run counts.
pub const TABLE: &str = "log_table";

/// Upper bound on rows per `INSERT` statement, keeping bind parameters
/// (three per row) under every backend's limit.
pub const MAX_ROWS_PER_STATEMENT: usize = 1000;

/// Schema for [`TABLE`]; portable between PostgreSQL and SQLite.
pub const SCHEMA_SQL: &str = include_str!("../../migrations/001_log_table.sql");

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failures while writing or reading run counts. All are fatal for a run.
#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    /// Could not open a connection.
    #[error("failed to connect to {backend}: {source}")]
    Connect {
        /// Backend label.
        backend: &'static str,
        /// Driver error.
        #[source]
        source: sqlx::Error,
    },
    /// Could not start the transaction.
    #[error("failed to begin transaction: {0}")]
    Begin(#[source] sqlx::Error),
    /// A statement inside the transaction failed; the transaction was rolled back.
    #[error("upsert into log_table failed: {0}")]
    Statement(#[source] sqlx::Error),
    /// The commit itself failed.
    #[error("failed to commit transaction: {0}")]
    Commit(#[source] sqlx::Error),
    /// Schema bootstrap failed.
    #[error("failed to apply log_table schema: {0}")]
    Schema(#[source] sqlx::Error),
    /// Reading counts back failed.
    #[error("failed to query log_table: {0}")]
    Query(#[source] sqlx::Error),
    /// A count does not fit the destination integer column.
    #[error("count {count} for signature {signature:?} exceeds the storable range")]
    CountOverflow {
        /// Offending signature.
        signature: String,
        /// Offending count.
        count: u64,
    },
    /// The write did not finish within the configured bound.
    #[error("database write timed out after {0:?}")]
    Timeout(Duration),
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Storage backend for daily signature counts.
///
/// Implementations hold connect options only; nothing is opened until a
/// method is called.
#[async_trait]
pub trait SummaryStore: Send + Sync {
    /// Upsert `rows` in one transaction, keyed on `(run_date, error_signature)`.
    ///
    /// On conflict the stored count is replaced, not incremented. Returns the
    /// number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if connecting, any statement, or the commit
    /// fails. Nothing is committed in that case.
    async fn upsert_counts(&self, rows: &[RunRecord]) -> Result<u64, PersistError>;

    /// Create [`TABLE`] if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] on connection or DDL failure.
    async fn ensure_schema(&self) -> Result<(), PersistError>;

    /// Stored counts for `run_date`, ordered by descending count.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] on connection or query failure.
    async fn load_counts(&self, run_date: NaiveDate) -> Result<Vec<RunRecord>, PersistError>;

    /// Short backend label for logs.
    fn backend(&self) -> &'static str;
}

/// Build the store for a configured target. Opens nothing.
pub fn open_store(target: &DatabaseTarget) -> Box<dyn SummaryStore> {
    match target {
        DatabaseTarget::Postgres(options) => Box::new(PostgresStore::new(options.clone())),
        DatabaseTarget::Sqlite(options) => Box::new(SqliteStore::new(options.clone())),
    }
}

// ---------------------------------------------------------------------------
// Statement helpers (shared by backends)
// ---------------------------------------------------------------------------

/// A record with its count converted to the column type.
#[derive(Debug, Clone)]
pub(crate) struct StoredRow {
    pub(crate) run_date: NaiveDate,
    pub(crate) signature: String,
    pub(crate) count: i64,
}

/// Convert records to bindable rows, rejecting counts beyond `i64`.
pub(crate) fn prepare_rows(rows: &[RunRecord]) -> Result<Vec<StoredRow>, PersistError> {
    rows.iter()
        .map(|record| {
            let count = i64::try_from(record.count).map_err(|_| PersistError::CountOverflow {
                signature: record.signature.clone(),
                count: record.count,
            })?;
            Ok(StoredRow {
                run_date: record.run_date,
                signature: record.signature.clone(),
                count,
            })
        })
        .collect()
}

/// Map `(run_date, signature, count)` tuples read back from a backend.
///
/// A negative stored count means the table was written outside this tool
/// and is reported as a query failure.
pub(crate) fn rows_to_records(
    rows: Vec<(NaiveDate, String, i64)>,
) -> Result<Vec<RunRecord>, PersistError> {
    rows.into_iter()
        .map(|(run_date, signature, count)| {
            let count = u64::try_from(count).map_err(|_| {
                PersistError::Query(sqlx::Error::Decode(
                    format!("negative error_count {count} for signature {signature:?}").into(),
                ))
            })?;
            Ok(RunRecord {
                run_date,
                signature,
                count,
            })
        })
        .collect()
}

/// Multi-row upsert for one chunk of rows.
///
/// The new count overwrites the stored one: a run is authoritative for its
/// date.
pub(crate) fn upsert_statement<'args, DB>(chunk: &'args [StoredRow]) -> QueryBuilder<'args, DB>
where
    DB: Database,
    NaiveDate: Encode<'args, DB> + Type<DB>,
    &'args str: Encode<'args, DB> + Type<DB>,
    i64: Encode<'args, DB> + Type<DB>,
{
    let mut builder = QueryBuilder::new(format!(
        "INSERT INTO {TABLE} (run_date, error_signature, error_count) "
    ));
    builder.push_values(chunk, |mut row, stored| {
        row.push_bind(stored.run_date)
            .push_bind(stored.signature.as_str())
            .push_bind(stored.count);
    });
    builder.push(
        " ON CONFLICT (run_date, error_signature) DO UPDATE SET error_count = EXCLUDED.error_count",
    );
    builder
}
