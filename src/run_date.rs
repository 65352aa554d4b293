//! Run-date parsing with fallback to the invocation date.

use chrono::NaiveDate;
use tracing::warn;

/// Accepted run-date format (ISO-8601 calendar date).
pub const RUN_DATE_FORMAT: &str = "%Y-%m-%d";

/// A run-date override that could not be parsed.
#[derive(Debug, thiserror::Error)]
#[error("invalid run date {input:?}: {source}")]
pub struct RunDateError {
    /// Raw input.
    pub input: String,
    /// Parse failure.
    #[source]
    pub source: chrono::ParseError,
}

/// Parse `input` as a `YYYY-MM-DD` date.
///
/// # Errors
///
/// Returns [`RunDateError`] if `input` is not a valid calendar date.
pub fn parse_run_date(input: &str) -> Result<NaiveDate, RunDateError> {
    NaiveDate::parse_from_str(input.trim(), RUN_DATE_FORMAT).map_err(|source| RunDateError {
        input: input.to_owned(),
        source,
    })
}

/// The date a run's counts are attributed to.
///
/// Uses `override_date` when it parses; otherwise logs a warning and falls
/// back to `today`. Never fails.
pub fn resolve_run_date(override_date: Option<&str>, today: NaiveDate) -> NaiveDate {
    match override_date.filter(|raw| !raw.trim().is_empty()) {
        None => today,
        Some(raw) => match parse_run_date(raw) {
            Ok(date) => date,
            Err(e) => {
                warn!(error = %e, fallback = %today, "invalid RUN_DATE, using today's date");
                today
            }
        },
    }
}

/// Today's date in local time.
pub fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
