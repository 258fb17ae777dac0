//! History source trait, fetched record types and structured errors.
//!
//! The `HistorySource` trait abstracts over the ISS endpoint so the pipeline
//! can be driven by a mock in tests.

use super::window::Window;
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// One daily history record, mapped from the ISS payload by column name.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRow {
    /// Security that was requested for this pairing.
    pub security: String,
    pub trade_date: NaiveDate,
    /// Security id as reported by the server; this is the pivot column key.
    pub secid: String,
    pub board_id: Option<String>,
    /// Closing price, `None` when the server reports no close for the day.
    pub close: Option<f64>,
}

/// Rows returned for one (security, window) pairing.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryTable {
    pub security: String,
    pub window: Window,
    pub rows: Vec<HistoryRow>,
}

impl HistoryTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One (security, window) combination driving a single request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub security: String,
    pub window: Window,
}

impl fmt::Display for Pairing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.security, self.window)
    }
}

/// Structured error types for the download pipeline.
///
/// Only `HttpStatus` is recoverable: the pairing is dropped and the run goes on.
/// Every other variant ends the run.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("HTTP {status} for {security} over {}..{}", .window.start, .window.end)]
    HttpStatus {
        security: String,
        window: Window,
        status: u16,
    },

    #[error("network error: {0}")]
    Network(String),

    #[error("response schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("no data fetched: every request failed or returned no rows")]
    NoDataFetched,

    #[error("duplicate observation for {secid} on {date}")]
    DuplicateObservation { date: NaiveDate, secid: String },

    #[error("failed to write {}: {reason}", .path.display())]
    WriteFailure { path: PathBuf, reason: String },

    #[error("failed to read {}: {reason}", .path.display())]
    ReadFailure { path: PathBuf, reason: String },
}

impl DataError {
    /// True when the pairing can be dropped without ending the run.
    pub fn is_skippable(&self) -> bool {
        matches!(self, DataError::HttpStatus { .. })
    }
}

/// Source of daily history for a single security and window.
pub trait HistorySource {
    /// Human-readable name of this source.
    fn name(&self) -> &str;

    /// Fetch history for `security` over `window` with one request.
    fn fetch(&self, security: &str, window: &Window) -> Result<HistoryTable, DataError>;
}

/// Progress callback for the sequential pairing loop.
pub trait FetchProgress {
    /// Called before a pairing is requested.
    fn on_start(&self, pairing: &Pairing, index: usize, total: usize);

    /// Called after a pairing finishes; `Ok` carries the row count.
    fn on_complete(
        &self,
        pairing: &Pairing,
        index: usize,
        total: usize,
        result: &Result<usize, DataError>,
    );

    /// Called once every pairing has been attempted.
    fn on_batch_complete(&self, succeeded: usize, skipped: usize, total: usize);
}

/// Progress reporter that emits `tracing` events.
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_start(&self, pairing: &Pairing, index: usize, total: usize) {
        tracing::debug!("[{}/{}] fetching {pairing}", index + 1, total);
    }

    fn on_complete(
        &self,
        pairing: &Pairing,
        index: usize,
        total: usize,
        result: &Result<usize, DataError>,
    ) {
        match result {
            Ok(rows) => tracing::info!("[{}/{}] {pairing}: {rows} rows", index + 1, total),
            Err(e) => tracing::warn!(security = %pairing.security, "failed to fetch: {e}"),
        }
    }

    fn on_batch_complete(&self, succeeded: usize, skipped: usize, total: usize) {
        tracing::info!("fetch complete: {succeeded}/{total} succeeded, {skipped} skipped");
    }
}
