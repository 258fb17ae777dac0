//! Date-range partitioning into fixed-length request windows.
//!
//! ISS returns at most one page of history per request, so the requested
//! range is split into consecutive windows of `length_days` calendar days.
//! The last window is never clamped to the range end: it may run past it and
//! the server simply returns whatever is available.

use chrono::{Days, NaiveDate};
use std::fmt;

/// One request's history range, both ends inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Window {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl Window {
    /// Number of calendar days covered, including both ends.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

/// Split `[start, end]` into contiguous windows of `length_days` days.
///
/// The first window starts at `start`; each next one starts the day after the
/// previous end. Planning stops once a window would start after `end`.
/// A zero length produces no windows.
pub fn plan_windows(start: NaiveDate, end: NaiveDate, length_days: u32) -> Vec<Window> {
    let mut windows = Vec::new();
    if length_days == 0 {
        return windows;
    }

    let span = Days::new(u64::from(length_days) - 1);
    let mut current = start;
    while current <= end {
        let Some(window_end) = current.checked_add_days(span) else {
            break;
        };
        windows.push(Window {
            start: current,
            end: window_end,
        });
        match window_end.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }

    windows
}
