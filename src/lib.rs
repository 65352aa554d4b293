//! Logsift: daily error-signature aggregation.
//!
//! Scans a directory of plain-text `.log` files, keeps the error lines,
//! collapses each into a signature with its variable parts masked, counts
//! signatures, and upserts the counts for a run date so that re-running a
//! date overwrites rather than duplicates.
//!
//! See `DESIGN.md` for the architecture notes.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod aggregator;
pub mod config;
pub mod logging;
pub mod normalizer;
pub mod persister;
pub mod pipeline;
pub mod run_date;
pub mod scanner;
pub mod store;
