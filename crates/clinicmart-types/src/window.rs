//! Half-open date window bounding an incremental run.

use std::fmt;

use chrono::{Days, NaiveDate};

/// Closed-open date interval `[start, end)`.
///
/// One value is computed per run and handed by value to both extraction
/// (source filter) and load (delete predicate), so the two can never skew.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeltaWindow {
    start: NaiveDate,
    end: NaiveDate,
}

impl DeltaWindow {
    /// Returns `None` when `start` is after `end`.
    #[must_use]
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    /// Window ending at `end` and reaching back `days` days.
    #[must_use]
    pub fn trailing(end: NaiveDate, days: u32) -> Self {
        let start = end
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end }
    }

    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date < self.end
    }

    #[must_use]
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DeltaWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
