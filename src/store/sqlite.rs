//! SQLite backend for local runs and tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Executor, Sqlite, Transaction};
use tracing::{debug, warn};

use super::{
    prepare_rows, upsert_statement, PersistError, StoredRow, SummaryStore,
    MAX_ROWS_PER_STATEMENT, SCHEMA_SQL,
};
use crate::aggregator::RunRecord;

const BACKEND: &str = "sqlite";

/// Store writing to a `log_table` in an SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    options: SqliteConnectOptions,
}

impl SqliteStore {
    /// Create a store from connect options. No connection is opened.
    pub fn new(options: SqliteConnectOptions) -> Self {
        Self { options }
    }

    /// Store for the database file at `path`, created on first connect.
    pub fn at_path(path: &std::path::Path) -> Self {
        Self::new(
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .pragma("trusted_schema", "OFF"),
        )
    }

    async fn connect(&self) -> Result<SqliteConnection, PersistError> {
        SqliteConnection::connect_with(&self.options)
            .await
            .map_err(|source| PersistError::Connect {
                backend: BACKEND,
                source,
            })
    }
}

#[async_trait]
impl SummaryStore for SqliteStore {
    async fn upsert_counts(&self, rows: &[RunRecord]) -> Result<u64, PersistError> {
        let prepared = prepare_rows(rows)?;
        let mut conn = self.connect().await?;
        let outcome = write_in_transaction(&mut conn, &prepared).await;
        release(conn).await;
        outcome
    }

    async fn ensure_schema(&self) -> Result<(), PersistError> {
        let mut conn = self.connect().await?;
        let outcome = Executor::execute(&mut conn, SCHEMA_SQL)
            .await
            .map(|_| ())
            .map_err(PersistError::Schema);
        release(conn).await;
        outcome
    }

    async fn load_counts(&self, run_date: NaiveDate) -> Result<Vec<RunRecord>, PersistError> {
        let mut conn = self.connect().await?;
        let outcome = sqlx::query_as::<_, (NaiveDate, String, i64)>(
            "SELECT run_date, error_signature, CAST(error_count AS BIGINT)
             FROM log_table
             WHERE run_date = ?1
             ORDER BY error_count DESC, error_signature ASC",
        )
        .bind(run_date)
        .fetch_all(&mut conn)
        .await
        .map_err(PersistError::Query);
        release(conn).await;
        outcome.and_then(super::rows_to_records)
    }

    fn backend(&self) -> &'static str {
        BACKEND
    }
}

async fn write_in_transaction(
    conn: &mut SqliteConnection,
    rows: &[StoredRow],
) -> Result<u64, PersistError> {
    let mut tx = conn.begin().await.map_err(PersistError::Begin)?;
    match write_chunks(&mut tx, rows).await {
        Ok(written) => {
            tx.commit().await.map_err(PersistError::Commit)?;
            Ok(written)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                warn!(backend = BACKEND, error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

async fn write_chunks(
    tx: &mut Transaction<'_, Sqlite>,
    rows: &[StoredRow],
) -> Result<u64, PersistError> {
    let mut written: u64 = 0;
    for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
        let mut statement = upsert_statement::<Sqlite>(chunk);
        let result = statement
            .build()
            .execute(&mut **tx)
            .await
            .map_err(PersistError::Statement)?;
        written = written.saturating_add(result.rows_affected());
    }
    Ok(written)
}

async fn release(conn: SqliteConnection) {
    if let Err(e) = conn.close().await {
        debug!(backend = BACKEND, error = %e, "connection close reported an error");
    }
}
