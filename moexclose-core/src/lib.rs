//! moexclose core: daily close history from the MOEX ISS API.
//!
//! This crate contains the whole download pipeline:
//! - Loader configuration (TOML + validation)
//! - Window planning over a date range
//! - ISS history fetching behind the `HistorySource` trait
//! - Long-to-wide pivot of closing prices
//! - Delimited export and re-import of the wide table

pub mod config;
pub mod data;
pub mod pipeline;

pub use config::{check_delimiter, ConfigError, LoaderConfig, MAX_WINDOW_DAYS};
pub use data::{
    plan_windows, read_wide_csv, write_wide_csv, DataError, FetchProgress, HistoryRow,
    HistorySource, HistoryTable, IssClient, LogProgress, LongTable, Pairing, WideRow, WideTable,
    Window,
};
pub use pipeline::{fetch_all, run_pipeline, FetchReport, RunSummary};
