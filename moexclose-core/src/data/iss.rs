//! MOEX ISS history provider.
//!
//! Fetches daily history rows from
//! `/iss/history/engines/{engine}/markets/{market}/boards/{board}/securities/{secid}.json`.
//! The payload is a table: a `columns` name list and a `data` list of rows.
//! Fields are located by column name, so a reordering upstream is harmless and
//! a missing column fails with `SchemaMismatch`.
//!
//! One request per call. No retries and no backoff.

use super::provider::{DataError, HistoryRow, HistorySource, HistoryTable};
use super::window::Window;
use crate::config::LoaderConfig;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

const COL_TRADEDATE: &str = "TRADEDATE";
const COL_SECID: &str = "SECID";
const COL_CLOSE: &str = "CLOSE";
const COL_BOARDID: &str = "BOARDID";

/// ISS history response: the `history` table plus an optional paging cursor.
#[derive(Debug, Deserialize)]
struct HistoryResponse {
    history: IssTable,
    #[serde(rename = "history.cursor")]
    cursor: Option<IssTable>,
}

#[derive(Debug, Deserialize)]
struct IssTable {
    columns: Vec<String>,
    data: Vec<Vec<Value>>,
}

impl IssTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    fn require_column(&self, name: &str) -> Result<usize, DataError> {
        self.column(name).ok_or_else(|| {
            DataError::SchemaMismatch(format!(
                "column {name} missing from history block (got: {})",
                self.columns.join(", ")
            ))
        })
    }
}

/// Blocking client for the ISS history endpoint.
pub struct IssClient {
    client: reqwest::blocking::Client,
    base_url: String,
    engine: String,
    market: String,
    board: String,
    interval: String,
}

impl IssClient {
    /// Build a client from the loader configuration.
    ///
    /// A request timeout is only set when `timeout_secs` is configured;
    /// otherwise the HTTP client default applies.
    pub fn new(config: &LoaderConfig) -> Result<Self, DataError> {
        let mut builder = reqwest::blocking::Client::builder()
            .user_agent(concat!("moexclose/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder
            .build()
            .map_err(|e| DataError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            engine: config.engine.clone(),
            market: config.market.clone(),
            board: config.board.clone(),
            interval: config.interval.clone(),
        })
    }

    /// Build the history URL for a security and window.
    pub fn history_url(&self, security: &str, window: &Window) -> String {
        format!(
            "{base}/iss/history/engines/{engine}/markets/{market}/boards/{board}\
             /securities/{security}.json?from={from}&till={till}&interval={interval}",
            base = self.base_url,
            engine = self.engine,
            market = self.market,
            board = self.board,
            from = window.start.format("%Y-%m-%d"),
            till = window.end.format("%Y-%m-%d"),
            interval = self.interval,
        )
    }
}

impl HistorySource for IssClient {
    fn name(&self) -> &str {
        "moex_iss"
    }

    fn fetch(&self, security: &str, window: &Window) -> Result<HistoryTable, DataError> {
        let url = self.history_url(security, window);
        tracing::debug!(%url, "GET");

        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| DataError::Network(e.to_string()))?;

        let status = resp.status();
        if status != reqwest::StatusCode::OK {
            return Err(DataError::HttpStatus {
                security: security.to_string(),
                window: *window,
                status: status.as_u16(),
            });
        }

        let body = resp.text().map_err(|e| DataError::Network(e.to_string()))?;
        parse_history(security, window, &body)
    }
}

/// Parse an ISS history JSON body into a tagged history table.
pub fn parse_history(
    security: &str,
    window: &Window,
    body: &str,
) -> Result<HistoryTable, DataError> {
    let resp: HistoryResponse = serde_json::from_str(body).map_err(|e| {
        DataError::SchemaMismatch(format!("malformed response for {security} {window}: {e}"))
    })?;

    if let Some(cursor) = &resp.cursor {
        warn_if_truncated(security, window, cursor);
    }

    let table = resp.history;
    let date_idx = table.require_column(COL_TRADEDATE)?;
    let secid_idx = table.require_column(COL_SECID)?;
    let close_idx = table.require_column(COL_CLOSE)?;
    let board_idx = table.column(COL_BOARDID);

    let mut rows = Vec::with_capacity(table.data.len());
    for (i, raw) in table.data.iter().enumerate() {
        let cell = |idx: usize, name: &str| {
            raw.get(idx).ok_or_else(|| {
                DataError::SchemaMismatch(format!(
                    "row {i} for {security} has {} fields, {name} expected at {idx}",
                    raw.len()
                ))
            })
        };

        let trade_date = parse_date(cell(date_idx, COL_TRADEDATE)?)
            .ok_or_else(|| bad_cell(security, i, COL_TRADEDATE, &raw[date_idx]))?;
        let secid = cell(secid_idx, COL_SECID)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| bad_cell(security, i, COL_SECID, &raw[secid_idx]))?;
        let close = parse_price(cell(close_idx, COL_CLOSE)?)
            .ok_or_else(|| bad_cell(security, i, COL_CLOSE, &raw[close_idx]))?;
        let board_id = board_idx
            .and_then(|idx| raw.get(idx))
            .and_then(Value::as_str)
            .map(str::to_string);

        rows.push(HistoryRow {
            security: security.to_string(),
            trade_date,
            secid,
            board_id,
            close,
        });
    }

    Ok(HistoryTable {
        security: security.to_string(),
        window: *window,
        rows,
    })
}

fn parse_date(v: &Value) -> Option<NaiveDate> {
    v.as_str()
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

/// `Some(None)` for a JSON null, `Some(Some(x))` for a number, `None` otherwise.
fn parse_price(v: &Value) -> Option<Option<f64>> {
    match v {
        Value::Null => Some(None),
        Value::Number(n) => n.as_f64().map(Some),
        _ => None,
    }
}

fn bad_cell(security: &str, row: usize, column: &str, value: &Value) -> DataError {
    DataError::SchemaMismatch(format!(
        "row {row} for {security}: unexpected {column} value {value}"
    ))
}

// ISS pages history at 100 rows; a window that exceeds it is silently cut.
fn warn_if_truncated(security: &str, window: &Window, cursor: &IssTable) {
    if let Some((page_size, total)) = truncated_page(cursor) {
        tracing::warn!(
            "{security} {window}: server returned {page_size} of {total} rows; \
             reduce window_days to avoid truncation"
        );
    }
}

/// `(page_size, total)` when the cursor reports rows beyond the first page.
fn truncated_page(cursor: &IssTable) -> Option<(u64, u64)> {
    let index_idx = cursor.column("INDEX")?;
    let total_idx = cursor.column("TOTAL")?;
    let size_idx = cursor.column("PAGESIZE")?;
    let row = cursor.data.first()?;
    let field = |idx: usize| row.get(idx).and_then(Value::as_u64);

    let (index, total, page_size) = (field(index_idx)?, field(total_idx)?, field(size_idx)?);
    (total > index + page_size).then_some((page_size, total))
}
