//! Download pipeline: plan windows, fetch every pairing, pivot, write.
//!
//! Pairings run strictly one after another, security-major then window-minor.
//! A non-200 response drops that pairing; any other error ends the run before
//! the output file is touched.

use crate::config::LoaderConfig;
use crate::data::{
    write_wide_csv, DataError, FetchProgress, HistorySource, HistoryTable, LongTable, Pairing,
};
use std::path::PathBuf;

/// Outcome of the fetch stage.
#[derive(Debug)]
pub struct FetchReport {
    /// Tables from successful pairings, in fetch order.
    pub tables: Vec<HistoryTable>,
    /// Pairings dropped after a non-200 response.
    pub skipped: Vec<(Pairing, DataError)>,
    pub windows: usize,
    pub pairings: usize,
}

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub windows: usize,
    pub pairings: usize,
    pub succeeded: usize,
    pub skipped: usize,
    /// Rows in the long table.
    pub rows: usize,
    /// Distinct dates, i.e. rows in the wide table.
    pub dates: usize,
    /// Distinct securities, i.e. price columns in the wide table.
    pub securities: usize,
    pub output: PathBuf,
}

/// Fetch every (security, window) pairing from `source`.
///
/// Skippable failures are reported through `progress` and collected;
/// the first fatal error is returned immediately.
pub fn fetch_all(
    config: &LoaderConfig,
    source: &dyn HistorySource,
    progress: &dyn FetchProgress,
) -> Result<FetchReport, DataError> {
    let windows = config.windows();
    let total = config.securities.len() * windows.len();

    tracing::info!(
        source = source.name(),
        "fetching {} securities over {} windows ({total} requests)",
        config.securities.len(),
        windows.len()
    );

    let mut tables = Vec::new();
    let mut skipped = Vec::new();
    let mut index = 0;

    for security in &config.securities {
        for window in &windows {
            let pairing = Pairing {
                security: security.clone(),
                window: *window,
            };
            progress.on_start(&pairing, index, total);

            match source.fetch(security, window) {
                Ok(table) => {
                    progress.on_complete(&pairing, index, total, &Ok(table.len()));
                    tables.push(table);
                }
                Err(e) if e.is_skippable() => {
                    let failed = Err(e);
                    progress.on_complete(&pairing, index, total, &failed);
                    if let Err(e) = failed {
                        skipped.push((pairing, e));
                    }
                }
                Err(e) => return Err(e),
            }
            index += 1;
        }
    }

    progress.on_batch_complete(tables.len(), skipped.len(), total);

    Ok(FetchReport {
        tables,
        skipped,
        windows: windows.len(),
        pairings: total,
    })
}

/// Run the whole pipeline and write the wide table to `config.output`.
pub fn run_pipeline(
    config: &LoaderConfig,
    source: &dyn HistorySource,
    progress: &dyn FetchProgress,
) -> Result<RunSummary, DataError> {
    let report = fetch_all(config, source, progress)?;
    let succeeded = report.tables.len();

    let long = LongTable::concat(report.tables)?;
    let wide = long.pivot()?;

    write_wide_csv(&wide, &config.output, config.delimiter_byte())?;
    tracing::info!("data saved to {}", config.output.display());

    Ok(RunSummary {
        windows: report.windows,
        pairings: report.pairings,
        succeeded,
        skipped: report.skipped.len(),
        rows: long.len(),
        dates: wide.rows.len(),
        securities: wide.securities.len(),
        output: config.output.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{HistoryRow, Window};
    use chrono::NaiveDate;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Mock source: canned rows per security, or an HTTP status.
    struct MockSource {
        responses: HashMap<String, Result<Vec<(&'static str, f64)>, u16>>,
        calls: RefCell<Vec<(String, Window)>>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                responses: HashMap::new(),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn ok(mut self, security: &str, rows: Vec<(&'static str, f64)>) -> Self {
            self.responses.insert(security.to_string(), Ok(rows));
            self
        }

        fn status(mut self, security: &str, status: u16) -> Self {
            self.responses.insert(security.to_string(), Err(status));
            self
        }
    }

    impl HistorySource for MockSource {
        fn name(&self) -> &str {
            "mock"
        }

        fn fetch(&self, security: &str, window: &Window) -> Result<HistoryTable, DataError> {
            self.calls
                .borrow_mut()
                .push((security.to_string(), *window));
            match self.responses.get(security) {
                Some(Ok(rows)) => Ok(HistoryTable {
                    security: security.to_string(),
                    window: *window,
                    rows: rows
                        .iter()
                        .filter_map(|(date, close)| {
                            let trade_date =
                                NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap();
                            window.contains(trade_date).then(|| HistoryRow {
                                security: security.to_string(),
                                trade_date,
                                secid: security.to_string(),
                                board_id: None,
                                close: Some(*close),
                            })
                        })
                        .collect(),
                }),
                Some(Err(status)) => Err(DataError::HttpStatus {
                    security: security.to_string(),
                    window: *window,
                    status: *status,
                }),
                None => Err(DataError::Network("connection refused".into())),
            }
        }
    }

    #[derive(Default)]
    struct RecordingProgress {
        failures: RefCell<Vec<String>>,
        completed: RefCell<usize>,
        batch: RefCell<Option<(usize, usize, usize)>>,
    }

    impl FetchProgress for RecordingProgress {
        fn on_start(&self, _pairing: &Pairing, _index: usize, _total: usize) {}

        fn on_complete(
            &self,
            pairing: &Pairing,
            _index: usize,
            _total: usize,
            result: &Result<usize, DataError>,
        ) {
            *self.completed.borrow_mut() += 1;
            if let Err(e) = result {
                self.failures.borrow_mut().push(format!("{pairing}: {e}"));
            }
        }

        fn on_batch_complete(&self, succeeded: usize, skipped: usize, total: usize) {
            *self.batch.borrow_mut() = Some((succeeded, skipped, total));
        }
    }

    fn config(securities: &[&str], output: PathBuf) -> LoaderConfig {
        LoaderConfig {
            securities: securities.iter().map(|s| s.to_string()).collect(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            window_days: 10,
            output,
            ..LoaderConfig::default()
        }
    }

    #[test]
    fn one_success_one_not_found() {
        let source = MockSource::new()
            .ok("AAA", vec![("2024-01-02", 10.5)])
            .status("BBB", 404);
        let progress = RecordingProgress::default();
        let cfg = config(&["AAA", "BBB"], PathBuf::from("unused.csv"));

        let report = fetch_all(&cfg, &source, &progress).unwrap();

        assert_eq!(report.tables.len(), 1);
        assert_eq!(report.tables[0].security, "AAA");
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].0.security, "BBB");

        let failures = progress.failures.borrow();
        assert_eq!(failures.len(), 1);
        assert!(failures[0].contains("404"), "{}", failures[0]);
        assert!(failures[0].contains("2024-01-01"), "{}", failures[0]);
        assert_eq!(*progress.completed.borrow(), 2);
        assert_eq!(*progress.batch.borrow(), Some((1, 1, 2)));
    }

    #[test]
    fn pairings_run_security_major() {
        let source = MockSource::new().ok("AAA", vec![]).ok("BBB", vec![]);
        let mut cfg = config(&["AAA", "BBB"], PathBuf::from("unused.csv"));
        cfg.window_days = 5;

        fetch_all(&cfg, &source, &RecordingProgress::default()).unwrap();

        let calls: Vec<_> = source
            .calls
            .borrow()
            .iter()
            .map(|(s, w)| format!("{s} {w}"))
            .collect();
        assert_eq!(
            calls,
            [
                "AAA 2024-01-01..2024-01-05",
                "AAA 2024-01-06..2024-01-10",
                "BBB 2024-01-01..2024-01-05",
                "BBB 2024-01-06..2024-01-10",
            ]
        );
    }

    #[test]
    fn network_error_aborts_run() {
        // CCC has no canned response, so the mock reports a network failure
        let source = MockSource::new().ok("AAA", vec![("2024-01-02", 1.0)]);
        let cfg = config(&["AAA", "CCC"], PathBuf::from("unused.csv"));

        let err = fetch_all(&cfg, &source, &RecordingProgress::default()).unwrap_err();
        assert!(matches!(err, DataError::Network(_)));
    }

    #[test]
    fn all_failed_is_fatal_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("close.csv");
        let source = MockSource::new().status("AAA", 500).status("BBB", 404);
        let cfg = config(&["AAA", "BBB"], out.clone());

        let err = run_pipeline(&cfg, &source, &RecordingProgress::default()).unwrap_err();
        assert!(matches!(err, DataError::NoDataFetched));
        assert!(!out.exists());
    }

    #[test]
    fn full_run_writes_wide_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("close.csv");
        let source = MockSource::new()
            .ok("BBB", vec![("2024-01-02", 20.0)])
            .ok("AAA", vec![("2024-01-02", 10.5), ("2024-01-03", 11.0)]);
        let cfg = config(&["BBB", "AAA"], out.clone());

        let summary = run_pipeline(&cfg, &source, &RecordingProgress::default()).unwrap();

        assert_eq!(summary.pairings, 2);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.dates, 2);
        assert_eq!(summary.securities, 2);
        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "DATE;AAA;BBB\n2024-01-02;10.5;20.0\n2024-01-03;11.0;\n"
        );
    }
}
