//! Window planning, fetching, pivoting and export

pub mod export;
pub mod iss;
pub mod pivot;
pub mod provider;
pub mod window;

pub use export::{read_wide_csv, write_wide_csv};
pub use iss::IssClient;
pub use pivot::{LongTable, WideRow, WideTable, DATE_COLUMN};
pub use provider::{
    DataError, FetchProgress, HistoryRow, HistorySource, HistoryTable, LogProgress, Pairing,
};
pub use window::{plan_windows, Window};

/// Collects formatted `tracing` output emitted while a closure runs.
#[cfg(test)]
pub(crate) fn capture_logs(f: impl FnOnce()) -> String {
    use std::io;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap().clone();
    String::from_utf8(bytes).unwrap()
}
