//! Idempotent persistence of one run's counts.
//!
//! [`Persister::upsert`] turns a finished [`SignatureCounts`] into rows for
//! the run date and hands them to a [`SummaryStore`] under a timeout. An
//! empty mapping short-circuits before the store is touched.

use std::time::Duration;

use chrono::NaiveDate;
use tracing::{error, info};

use crate::aggregator::SignatureCounts;
use crate::store::{PersistError, SummaryStore};

/// Writes run counts through a store.
pub struct Persister {
    store: Box<dyn SummaryStore>,
    timeout: Duration,
}

impl Persister {
    /// Create a persister bounding each write by `timeout`.
    pub fn new(store: Box<dyn SummaryStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// The underlying store.
    pub fn store(&self) -> &dyn SummaryStore {
        self.store.as_ref()
    }

    /// Upsert `counts` for `run_date`, returning the rows written.
    ///
    /// Empty `counts` succeed with zero rows and never open a connection.
    /// Re-running with the same input leaves the stored rows unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`PersistError`] if the write fails or exceeds the timeout.
    /// The transaction is rolled back and the connection released first.
    pub async fn upsert(
        &self,
        counts: &SignatureCounts,
        run_date: NaiveDate,
    ) -> Result<u64, PersistError> {
        if counts.is_empty() {
            info!("no errors found; nothing to insert");
            return Ok(0);
        }

        let records = counts.to_records(run_date);
        let written = tokio::time::timeout(self.timeout, self.store.upsert_counts(&records))
            .await
            .map_err(|_| PersistError::Timeout(self.timeout))
            .and_then(|result| result)
            .inspect_err(|e| {
                error!(backend = self.store.backend(), %run_date, error = %e, "failed to insert into database");
            })?;

        info!(rows = written, %run_date, "inserted rows into log_table");
        Ok(written)
    }
}
