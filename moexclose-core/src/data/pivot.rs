//! Long-to-wide reshaping of fetched history.
//!
//! The long table is every fetched row in fetch order. The wide table puts
//! one row per distinct trade date and one column per distinct security id.
//! Missing (date, security) combinations stay empty; nothing is forward-filled.

use super::provider::{DataError, HistoryRow, HistoryTable};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// Label of the leading date column in the wide table.
pub const DATE_COLUMN: &str = "DATE";

/// Concatenation of all successfully fetched tables.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LongTable {
    pub rows: Vec<HistoryRow>,
}

impl LongTable {
    /// Concatenate per-pairing tables, preserving order.
    ///
    /// An empty sequence means every pairing failed, which is fatal.
    pub fn concat(tables: Vec<HistoryTable>) -> Result<Self, DataError> {
        if tables.is_empty() {
            return Err(DataError::NoDataFetched);
        }
        let rows = tables.into_iter().flat_map(|t| t.rows).collect();
        Ok(Self { rows })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pivot to date × security with the closing price as the cell value.
    ///
    /// Dates are sorted ascending and securities lexicographically.
    /// Two rows for the same date and security make the cell ambiguous and
    /// fail with `DuplicateObservation`.
    pub fn pivot(&self) -> Result<WideTable, DataError> {
        if self.rows.is_empty() {
            return Err(DataError::NoDataFetched);
        }

        let securities: Vec<String> = self
            .rows
            .iter()
            .map(|r| r.secid.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let column_of: BTreeMap<&str, usize> = securities
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();

        let mut cells: BTreeMap<NaiveDate, Vec<Option<Option<f64>>>> = BTreeMap::new();
        for row in &self.rows {
            let col = column_of[row.secid.as_str()];
            let slots = cells
                .entry(row.trade_date)
                .or_insert_with(|| vec![None; securities.len()]);
            if slots[col].is_some() {
                return Err(DataError::DuplicateObservation {
                    date: row.trade_date,
                    secid: row.secid.clone(),
                });
            }
            slots[col] = Some(row.close);
        }

        let rows = cells
            .into_iter()
            .map(|(date, slots)| WideRow {
                date,
                prices: slots.into_iter().map(Option::flatten).collect(),
            })
            .collect();

        Ok(WideTable { securities, rows })
    }
}

/// One date's closing prices, aligned with `WideTable::securities`.
#[derive(Debug, Clone, PartialEq)]
pub struct WideRow {
    pub date: NaiveDate,
    pub prices: Vec<Option<f64>>,
}

/// Date-indexed, security-columned closing prices.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WideTable {
    /// Column order, sorted lexicographically.
    pub securities: Vec<String>,
    /// Rows sorted by date ascending.
    pub rows: Vec<WideRow>,
}

impl WideTable {
    /// Header row: `DATE` followed by the securities.
    pub fn column_names(&self) -> Vec<&str> {
        std::iter::once(DATE_COLUMN)
            .chain(self.securities.iter().map(String::as_str))
            .collect()
    }

    pub fn get(&self, date: NaiveDate, security: &str) -> Option<f64> {
        let col = self.securities.iter().position(|s| s == security)?;
        let row = self.rows.iter().find(|r| r.date == date)?;
        row.prices[col]
    }

    /// Number of non-empty cells per security, in column order.
    pub fn coverage(&self) -> Vec<(&str, usize)> {
        self.securities
            .iter()
            .enumerate()
            .map(|(col, sec)| {
                let filled = self
                    .rows
                    .iter()
                    .filter(|r| r.prices[col].is_some())
                    .count();
                (sec.as_str(), filled)
            })
            .collect()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }
}
