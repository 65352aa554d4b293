//! PostgreSQL backend, the production destination.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{Connection, Executor, Postgres, Transaction};
use tracing::{debug, warn};

use super::{
    prepare_rows, upsert_statement, PersistError, StoredRow, SummaryStore,
    MAX_ROWS_PER_STATEMENT, SCHEMA_SQL,
};
use crate::aggregator::RunRecord;

const BACKEND: &str = "postgres";

/// Store writing to a PostgreSQL `log_table`.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    options: PgConnectOptions,
}

impl PostgresStore {
    /// Create a store from connect options. No connection is opened.
    pub fn new(options: PgConnectOptions) -> Self {
        Self { options }
    }

    async fn connect(&self) -> Result<PgConnection, PersistError> {
        PgConnection::connect_with(&self.options)
            .await
            .map_err(|source| PersistError::Connect {
                backend: BACKEND,
                source,
            })
    }
}

#[async_trait]
impl SummaryStore for PostgresStore {
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
             WHERE run_date = $1
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

/// Run every chunk in one transaction; roll back on the first failure.
async fn write_in_transaction(
    conn: &mut PgConnection,
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
    tx: &mut Transaction<'_, Postgres>,
    rows: &[StoredRow],
) -> Result<u64, PersistError> {
    let mut written: u64 = 0;
    for chunk in rows.chunks(MAX_ROWS_PER_STATEMENT) {
        let mut statement = upsert_statement::<Postgres>(chunk);
        let result = statement
            .build()
            .execute(&mut **tx)
            .await
            .map_err(PersistError::Statement)?;
        written = written.saturating_add(result.rows_affected());
    }
    Ok(written)
}

async fn release(conn: PgConnection) {
    if let Err(e) = conn.close().await {
        debug!(backend = BACKEND, error = %e, "connection close reported an error");
    }
}
