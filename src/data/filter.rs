use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Measurement, ReadingSet};
use crate::error::{DataError, Result};

// ---------------------------------------------------------------------------
// Date range
// ---------------------------------------------------------------------------

/// An inclusive calendar-date range in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// A range covering a single day.
    pub fn day(day: NaiveDate) -> Self {
        DateRange::new(day, day)
    }

    /// The range spanning the first and last reading of `set`, the default
    /// selection when a dataset is opened. `None` for an empty set.
    pub fn covering(set: &ReadingSet) -> Option<Self> {
        Some(DateRange::new(
            set.first_timestamp()?.date_naive(),
            set.last_timestamp()?.date_naive(),
        ))
    }

    /// Midnight UTC at the start of `start`.
    pub fn lower_bound(&self) -> DateTime<Utc> {
        self.start.and_time(NaiveTime::MIN).and_utc()
    }

    /// Midnight UTC at the start of the day after `end` (exclusive). `None`
    /// when `end` is the last representable date.
    pub fn upper_bound(&self) -> Option<DateTime<Utc>> {
        self.end
            .checked_add_days(Days::new(1))
            .map(|d| d.and_time(NaiveTime::MIN).and_utc())
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        ts >= self.lower_bound() && self.upper_bound().map_or(true, |upper| ts < upper)
    }
}

/// Parse a `YYYY-MM-DD` date.
pub fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").map_err(|_| DataError::InvalidDate(s.into()))
}

/// Return the readings of `set` falling inside `range`, order preserved.
///
/// The end date counts in full: a reading at `end 23:59:59.999` is kept, one
/// at the following midnight is not. An inverted range yields an empty set.
pub fn filter_by_date(set: &ReadingSet, range: &DateRange) -> ReadingSet {
    let mut out = set.empty_like();
    if range.start > range.end {
        return out;
    }

    // Readings are sorted, so both bounds are binary searches.
    let lower = range.lower_bound();
    let from = set.readings.partition_point(|r| r.timestamp < lower);
    let to = match range.upper_bound() {
        Some(upper) => set.readings.partition_point(|r| r.timestamp < upper),
        None => set.readings.len(),
    };
    if from < to {
        out.readings.extend_from_slice(&set.readings[from..to]);
    }
    out
}

// ---------------------------------------------------------------------------
// Series selection
// ---------------------------------------------------------------------------

/// Fields offered for selection: the requested candidates the set carries.
pub fn available_fields(set: &ReadingSet, candidates: &[Measurement]) -> Vec<Measurement> {
    set.present_fields(candidates)
}

/// Keep the requested fields that are present, request order, no repeats.
///
/// An empty result is the "nothing selected" state, not an error.
pub fn select_fields(available: &[Measurement], requested: &[Measurement]) -> Vec<Measurement> {
    let mut selected = Vec::with_capacity(requested.len());
    for field in requested {
        if available.contains(field) && !selected.contains(field) {
            selected.push(*field);
        }
    }
    selected
}
