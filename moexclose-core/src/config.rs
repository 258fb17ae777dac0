//! Loader configuration.
//!
//! Stored as TOML; every key is optional and falls back to the defaults below.
//!
//! ```toml
//! securities = ["LQDT", "TGLD"]
//! start_date = "2024-01-01"
//! end_date = "2024-12-31"
//! window_days = 100
//! board = "TQTF"
//! output = "close_data.csv"
//! ```

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Exchange-traded funds on the TQTF board fetched by default.
pub const DEFAULT_SECURITIES: [&str; 20] = [
    "LQDT", "TGLD", "TRUR", "AKMM", "SBMX", "TMOS", "EQMX", "GOLD", "SBMM", "AKME", "AKMB",
    "RCMX", "AMRE", "AKGD", "SBHI", "OPNR", "DIVD", "MKBD", "SBRI", "GROD",
];

/// Longest accepted request window, about ten years.
pub const MAX_WINDOW_DAYS: u32 = 3660;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Everything needed to reproduce one download run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Securities to fetch, one request per security and window.
    pub securities: Vec<String>,

    /// First date requested (inclusive).
    pub start_date: NaiveDate,

    /// Last date requested (inclusive). The final window may extend past it.
    pub end_date: NaiveDate,

    /// Interval code passed through to the history endpoint.
    pub interval: String,

    /// Calendar days per request window.
    pub window_days: u32,

    pub base_url: String,
    pub engine: String,
    pub market: String,
    pub board: String,

    /// Output file, overwritten on success.
    pub output: PathBuf,

    /// Field delimiter for the output file.
    pub delimiter: char,

    /// Per-request timeout; the HTTP client default applies when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            securities: DEFAULT_SECURITIES.iter().map(|s| s.to_string()).collect(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default(),
            end_date: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
            interval: "1day".into(),
            window_days: 100,
            base_url: "https://iss.moex.com".into(),
            engine: "stock".into(),
            market: "shares".into(),
            board: "TQTF".into(),
            output: PathBuf::from("close_data.csv"),
            delimiter: ';',
            timeout_secs: None,
        }
    }
}

impl LoaderConfig {
    /// Load and validate a config from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a config from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config = Self::parse_toml(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config file without validating it, for callers that apply
    /// overrides first.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_toml(&content)
    }

    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check the invariants the pipeline relies on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.securities.is_empty() {
            return Err(ConfigError::Invalid("securities must not be empty".into()));
        }
        let mut seen = HashSet::new();
        for sec in &self.securities {
            if sec.trim().is_empty() {
                return Err(ConfigError::Invalid("blank security identifier".into()));
            }
            if !seen.insert(sec.as_str()) {
                return Err(ConfigError::Invalid(format!("duplicate security {sec}")));
            }
        }

        if self.start_date > self.end_date {
            return Err(ConfigError::Invalid(format!(
                "start_date {} is after end_date {}",
                self.start_date, self.end_date
            )));
        }
        if self.window_days == 0 || self.window_days > MAX_WINDOW_DAYS {
            return Err(ConfigError::Invalid(format!(
                "window_days must be between 1 and {MAX_WINDOW_DAYS}, got {}",
                self.window_days
            )));
        }

        for (key, value) in [
            ("interval", &self.interval),
            ("base_url", &self.base_url),
            ("engine", &self.engine),
            ("market", &self.market),
            ("board", &self.board),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }

        check_delimiter(self.delimiter)?;

        Ok(())
    }

    /// Delimiter as a byte; `validate` guarantees it is ASCII.
    pub fn delimiter_byte(&self) -> u8 {
        self.delimiter as u8
    }

    /// Number of (security, window) pairings this config will request.
    pub fn pairing_count(&self) -> usize {
        self.securities.len() * self.windows().len()
    }

    pub fn windows(&self) -> Vec<crate::data::Window> {
        crate::data::plan_windows(self.start_date, self.end_date, self.window_days)
    }
}

/// Convert a field delimiter to the byte the csv crate expects.
///
/// Quotes and line terminators would break the round-trip through the reader.
pub fn check_delimiter(delimiter: char) -> Result<u8, ConfigError> {
    if !delimiter.is_ascii() || matches!(delimiter, '"' | '\n' | '\r') {
        return Err(ConfigError::Invalid(format!(
            "delimiter {delimiter:?} must be a single ASCII character other than quote, \
             CR or LF"
        )));
    }
    Ok(delimiter as u8)
}
