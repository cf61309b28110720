use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::model::{Measurement, Reading, ReadingSet};
use super::stats::FieldMeans;
use crate::error::DataError;

// ---------------------------------------------------------------------------
// ResampleRule
// ---------------------------------------------------------------------------

/// How to re-bucket a reading set before charting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResampleRule {
    /// Pass readings through unchanged.
    #[default]
    Raw,
    /// Average into epoch-aligned buckets of this width.
    Every(BucketWidth),
}

/// A positive bucket width in whole seconds.
///
/// Only built through validating constructors, so every width has an exact
/// shorthand form and buckets are never silently truncated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BucketWidth {
    seconds: i64,
}

impl BucketWidth {
    /// `None` unless `seconds` is positive and representable as a duration.
    pub fn from_seconds(seconds: i64) -> Option<Self> {
        (seconds > 0 && Duration::try_seconds(seconds).is_some())
            .then_some(BucketWidth { seconds })
    }

    pub fn seconds(&self) -> i64 {
        self.seconds
    }

    pub fn duration(&self) -> Duration {
        Duration::seconds(self.seconds)
    }
}

impl TryFrom<Duration> for BucketWidth {
    type Error = DataError;

    /// Rejects zero, negative and sub-second widths.
    fn try_from(width: Duration) -> Result<Self, Self::Error> {
        let seconds = width.num_seconds();
        if width != Duration::seconds(seconds) {
            return Err(DataError::InvalidResampleRule(format!("{width}")));
        }
        BucketWidth::from_seconds(seconds)
            .ok_or_else(|| DataError::InvalidResampleRule(format!("{width}")))
    }
}

/// Format a width in the largest shorthand unit that divides it.
impl fmt::Display for BucketWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let secs = self.seconds;
        if secs % 86_400 == 0 {
            write!(f, "{}D", secs / 86_400)
        } else if secs % 3_600 == 0 {
            write!(f, "{}h", secs / 3_600)
        } else if secs % 60 == 0 {
            write!(f, "{}min", secs / 60)
        } else {
            write!(f, "{secs}s")
        }
    }
}

/// Suffix to seconds multiplier (order matters: longer suffixes first)
const UNITS: &[(&str, i64)] = &[
    ("min", 60),
    ("m", 60),
    ("s", 1),
    ("h", 3_600),
    ("H", 3_600),
    ("d", 86_400),
    ("D", 86_400),
];

impl ResampleRule {
    /// The interval choices offered by the dashboard.
    pub const PRESETS: [&'static str; 6] = ["raw", "30min", "1h", "2h", "6h", "1D"];

    /// Bucket into `width`, which must be a positive whole number of seconds.
    pub fn every(width: Duration) -> Result<Self, DataError> {
        BucketWidth::try_from(width).map(ResampleRule::Every)
    }

    pub fn width(&self) -> Option<Duration> {
        match self {
            ResampleRule::Raw => None,
            ResampleRule::Every(w) => Some(w.duration()),
        }
    }
}

/// Parse rules like "raw", "90s", "30min", "1h", "6H", "1D".
impl FromStr for ResampleRule {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("raw") || s.eq_ignore_ascii_case("none") {
            return Ok(ResampleRule::Raw);
        }

        for (suffix, seconds) in UNITS {
            if let Some(count) = s.strip_suffix(suffix) {
                let count: i64 = count
                    .trim()
                    .parse()
                    .map_err(|_| DataError::InvalidResampleRule(s.into()))?;
                return count
                    .checked_mul(*seconds)
                    .and_then(BucketWidth::from_seconds)
                    .map(ResampleRule::Every)
                    .ok_or_else(|| DataError::InvalidResampleRule(s.into()));
            }
        }

        Err(DataError::InvalidResampleRule(s.into()))
    }
}

/// Format a rule in the same shorthand [`FromStr`] accepts.
impl fmt::Display for ResampleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResampleRule::Raw => f.write_str("raw"),
            ResampleRule::Every(w) => fmt::Display::fmt(w, f),
        }
    }
}

impl Serialize for ResampleRule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResampleRule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Resampling
// ---------------------------------------------------------------------------

/// Start of the epoch-aligned bucket of width `width_ms` holding `ts`.
fn bucket_start(ts: DateTime<Utc>, width_ms: i64) -> Option<DateTime<Utc>> {
    let ms = ts.timestamp_millis();
    DateTime::from_timestamp_millis(ms.div_euclid(width_ms) * width_ms)
}

/// Average `fields` into fixed-width buckets.
///
/// Buckets are left-closed and anchored at the Unix epoch, so boundaries do
/// not depend on the first reading. Only occupied buckets are emitted, one
/// reading per bucket stamped with the bucket start. A field with no present
/// values in a bucket is missing there. Passthrough columns are dropped.
///
/// [`ResampleRule::Raw`] returns a copy of the input.
pub fn resample(set: &ReadingSet, rule: ResampleRule, fields: &[Measurement]) -> ReadingSet {
    let width = match rule {
        ResampleRule::Raw => return set.clone(),
        ResampleRule::Every(width) => width,
    };

    let fields = set.present_fields(fields);
    let mut out = ReadingSet::new(Vec::new(), fields.clone(), Vec::new());
    let width_ms = width.seconds() * 1_000;

    // Input is sorted, so each bucket is one contiguous run.
    let mut current: Option<(DateTime<Utc>, FieldMeans)> = None;
    for reading in &set.readings {
        let Some(start) = bucket_start(reading.timestamp, width_ms) else {
            continue;
        };
        if let Some((bucket, means)) = current.as_mut() {
            if *bucket == start {
                means.add(reading);
                continue;
            }
        }
        if let Some((bucket, means)) = current.take() {
            out.readings.push(bucket_reading(bucket, &fields, &means));
        }
        let mut means = FieldMeans::new(&fields);
        means.add(reading);
        current = Some((start, means));
    }
    if let Some((bucket, means)) = current {
        out.readings.push(bucket_reading(bucket, &fields, &means));
    }

    debug!(
        "resampled {} readings into {} buckets of {rule}",
        set.len(),
        out.len()
    );
    out
}

fn bucket_reading(start: DateTime<Utc>, fields: &[Measurement], means: &FieldMeans) -> Reading {
    let mut reading = Reading::new(start);
    for (&field, mean) in fields.iter().zip(means.means()) {
        reading.set(field, mean);
    }
    reading
}
