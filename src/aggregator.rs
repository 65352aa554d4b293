//! Signature counting over streams of raw log lines.
//!
//! [`Aggregator`] owns the counts for one run. Lines are filtered to error
//! lines, normalized, and tallied. Partial counts computed independently
//! (one per file, say) combine with [`SignatureCounts::merge`].

use std::collections::BTreeMap;
use std::io::{self, BufRead};

use chrono::NaiveDate;
use serde::Serialize;

use crate::normalizer::normalize;

/// Substring that marks a line as an error line (matched case-insensitively).
pub const ERROR_TOKEN: &str = "ERROR";

/// Per-signature occurrence counts.
///
/// Keys are unique and every stored count is at least one. Iteration is
/// in signature order so output derived from it is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct SignatureCounts {
    counts: BTreeMap<String, u64>,
}

impl SignatureCounts {
    /// Create an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence of `signature`.
    pub fn increment(&mut self, signature: String) {
        self.add(signature, 1);
    }

    /// Add `count` occurrences of `signature`. A zero count is ignored.
    pub fn add(&mut self, signature: String, count: u64) {
        if count == 0 {
            return;
        }
        let slot = self.counts.entry(signature).or_insert(0);
        *slot = slot.saturating_add(count);
    }

    /// Fold another mapping into this one, summing counts of equal keys.
    ///
    /// Commutative and associative, so partial results can be merged in any
    /// order.
    pub fn merge(&mut self, other: SignatureCounts) {
        for (signature, count) in other.counts {
            self.add(signature, count);
        }
    }

    /// Count recorded for `signature`, if any.
    pub fn get(&self, signature: &str) -> Option<u64> {
        self.counts.get(signature).copied()
    }

    /// Number of distinct signatures.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    /// Whether no signature has been counted.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts
            .values()
            .fold(0_u64, |acc, count| acc.saturating_add(*count))
    }

    /// Pairs sorted by descending count, ties broken by signature.
    pub fn ranked(&self) -> Vec<(&str, u64)> {
        let mut ranked: Vec<(&str, u64)> = self
            .counts
            .iter()
            .map(|(signature, count)| (signature.as_str(), *count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
    }

    /// Attribute every signature to `run_date`, producing persistence rows.
    pub fn to_records(&self, run_date: NaiveDate) -> Vec<RunRecord> {
        self.counts
            .iter()
            .map(|(signature, count)| RunRecord {
                run_date,
                signature: signature.clone(),
                count: *count,
            })
            .collect()
    }
}

/// One persisted row: the count of a signature on a run date.
///
/// `(run_date, signature)` is the natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRecord {
    /// Date the counts are attributed to.
    pub run_date: NaiveDate,
    /// Normalized error signature.
    pub signature: String,
    /// Occurrences of the signature in the run.
    pub count: u64,
}

/// Whether `line` is an error line.
pub fn is_error_line(line: &str) -> bool {
    line.to_uppercase().contains(ERROR_TOKEN)
}

/// Accumulates signature counts for one run.
#[derive(Debug, Default)]
pub struct Aggregator {
    counts: SignatureCounts,
    lines_seen: u64,
}

impl Aggregator {
    /// Create an aggregator with empty counts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count `line` if it is an error line; ignore it otherwise.
    pub fn ingest_line(&mut self, line: &str) {
        self.lines_seen = self.lines_seen.saturating_add(1);
        if is_error_line(line) {
            self.counts.increment(normalize(line));
        }
    }

    /// Ingest every line of an in-memory sequence.
    pub fn ingest_lines<I, S>(&mut self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for line in lines {
            self.ingest_line(line.as_ref());
        }
    }

    /// Ingest a byte stream line by line, decoding each line leniently.
    ///
    /// Lines end at `\n`, `\r\n` or a lone `\r`. Invalid UTF-8 sequences
    /// are replaced rather than rejected. Returns the number of lines read.
    /// On a read failure the lines already ingested stay counted and the
    /// error is returned with that count attached.
    ///
    /// # Errors
    ///
    /// Returns [`PartialRead`] if the underlying reader fails mid-stream.
    pub fn ingest_reader<R: BufRead>(&mut self, mut reader: R) -> Result<u64, PartialRead> {
        let mut lines_read: u64 = 0;
        let mut line = Vec::new();
        while next_line(&mut reader, &mut line)
            .map_err(|source| PartialRead { lines_read, source })?
        {
            self.ingest_line(&String::from_utf8_lossy(&line));
            lines_read = lines_read.saturating_add(1);
        }
        Ok(lines_read)
    }

    /// Fold counts produced elsewhere (e.g. another file) into this run.
    pub fn absorb(&mut self, partial: SignatureCounts) {
        self.counts.merge(partial);
    }

    /// Total lines offered to this aggregator, error or not.
    pub fn lines_seen(&self) -> u64 {
        self.lines_seen
    }

    /// Snapshot of the counts accumulated so far.
    pub fn result(&self) -> SignatureCounts {
        self.counts.clone()
    }

    /// Consume the aggregator and return its counts.
    pub fn into_result(self) -> SignatureCounts {
        self.counts
    }
}

/// Read the next line into `line` without its terminator.
///
/// Returns `false` at end of input. A terminator at the very end does not
/// produce a trailing empty line.
fn next_line<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> io::Result<bool> {
    line.clear();
    let mut read_any = false;
    loop {
        let available = match reader.fill_buf() {
            Ok(buf) => buf,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if available.is_empty() {
            return Ok(read_any);
        }
        read_any = true;
        match available.iter().position(|b| *b == b'\n' || *b == b'\r') {
            Some(at) => {
                let carriage_return = available[at] == b'\r';
                line.extend_from_slice(&available[..at]);
                reader.consume(at.saturating_add(1));
                if carriage_return {
                    skip_line_feed(reader)?;
                }
                return Ok(true);
            }
            None => {
                let taken = available.len();
                line.extend_from_slice(available);
                reader.consume(taken);
            }
        }
    }
}

/// Consume a `\n` that completes a `\r\n` pair, if one follows.
fn skip_line_feed<R: BufRead>(reader: &mut R) -> io::Result<()> {
    loop {
        match reader.fill_buf() {
            Ok(buf) => {
                if buf.first() == Some(&b'\n') {
                    reader.consume(1);
                }
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
}

/// A reader failed after some lines were already ingested.
#[derive(Debug, thiserror::Error)]
#[error("read failed after {lines_read} lines: {source}")]
pub struct PartialRead {
    /// Lines successfully ingested before the failure.
    pub lines_read: u64,
    /// Underlying I/O error.
    #[source]
    pub source: io::Error,
}
