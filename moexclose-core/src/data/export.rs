//! Delimited export of the wide table.
//!
//! Layout: `DATE;<sec1>;<sec2>;...` header, one row per date, no index column.
//! Empty cells are written as the empty string. Prices use the shortest
//! representation that parses back to the same `f64`, always with a decimal
//! point.
//!
//! Writes are atomic: write to `{path}.tmp`, then rename over `path`, so a
//! failed run leaves any earlier output in place.

use super::pivot::{WideRow, WideTable, DATE_COLUMN};
use super::provider::DataError;
use chrono::NaiveDate;
use std::fs;
use std::path::{Path, PathBuf};

/// Write `table` to `path` with the given field delimiter, replacing any existing file.
pub fn write_wide_csv(table: &WideTable, path: &Path, delimiter: u8) -> Result<(), DataError> {
    let fail = |reason: String| DataError::WriteFailure {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| fail(format!("failed to create dir: {e}")))?;
    }

    let tmp_path = tmp_path_for(path);
    let written = write_rows(table, &tmp_path, delimiter);
    if let Err(reason) = written {
        let _ = fs::remove_file(&tmp_path);
        return Err(fail(reason));
    }

    fs::rename(&tmp_path, path).map_err(|e| {
        let _ = fs::remove_file(&tmp_path);
        fail(format!("atomic rename failed: {e}"))
    })
}

fn write_rows(table: &WideTable, path: &Path, delimiter: u8) -> Result<(), String> {
    let mut wtr = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| e.to_string())?;

    wtr.write_record(table.column_names())
        .map_err(|e| e.to_string())?;

    for row in &table.rows {
        let mut record = Vec::with_capacity(row.prices.len() + 1);
        record.push(row.date.format("%Y-%m-%d").to_string());
        record.extend(row.prices.iter().map(|p| p.map(format_price).unwrap_or_default()));
        wtr.write_record(&record).map_err(|e| e.to_string())?;
    }

    wtr.flush().map_err(|e| e.to_string())
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

/// Format a price so that `20` is written as `20.0` and `10.5` as `10.5`.
pub fn format_price(price: f64) -> String {
    let s = price.to_string();
    if price.is_finite() && !s.contains('.') {
        format!("{s}.0")
    } else {
        s
    }
}

/// Read a wide table previously written by `write_wide_csv`.
pub fn read_wide_csv(path: &Path, delimiter: u8) -> Result<WideTable, DataError> {
    let fail = |reason: String| DataError::ReadFailure {
        path: path.to_path_buf(),
        reason,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .from_path(path)
        .map_err(|e| fail(e.to_string()))?;

    let headers = rdr.headers().map_err(|e| fail(e.to_string()))?.clone();
    match headers.get(0) {
        Some(DATE_COLUMN) => {}
        other => {
            return Err(fail(format!(
                "first column must be {DATE_COLUMN}, found {other:?}"
            )))
        }
    }
    let securities: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows = Vec::new();
    for (line, record) in rdr.records().enumerate() {
        let record = record.map_err(|e| fail(e.to_string()))?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d")
            .map_err(|e| fail(format!("row {}: bad date {raw_date:?}: {e}", line + 1)))?;

        let prices = record
            .iter()
            .skip(1)
            .map(|cell| {
                if cell.is_empty() {
                    Ok(None)
                } else {
                    cell.parse::<f64>()
                        .map(Some)
                        .map_err(|e| fail(format!("row {}: bad price {cell:?}: {e}", line + 1)))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        rows.push(WideRow { date, prices });
    }

    Ok(WideTable { securities, rows })
}
