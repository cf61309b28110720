use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DataError;

/// Name of the column holding the sample instant.
pub const TIMESTAMP_COLUMN: &str = "timestamp";

// ---------------------------------------------------------------------------
// Measurement – the fixed set of known sensor fields
// ---------------------------------------------------------------------------

/// A known measurement column. Any subset may be present in a given dataset.
///
/// Serialized by its source column name, so query files can list columns
/// exactly as they appear in the CSV header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Measurement {
    #[serde(rename = "temperatura_C")]
    Temperature,
    #[serde(rename = "humedad_relativa_pct")]
    Humidity,
    #[serde(rename = "CO2_ppm")]
    Co2,
    #[serde(rename = "PM1_ug_m3")]
    Pm1,
    #[serde(rename = "PM2_5_ug_m3")]
    Pm2_5,
    #[serde(rename = "PM4_ug_m3")]
    Pm4,
    #[serde(rename = "PM10_ug_m3")]
    Pm10,
}

impl Measurement {
    pub const COUNT: usize = 7;

    /// All fields in canonical (column) order.
    pub const ALL: [Measurement; Self::COUNT] = [
        Measurement::Temperature,
        Measurement::Humidity,
        Measurement::Co2,
        Measurement::Pm1,
        Measurement::Pm2_5,
        Measurement::Pm4,
        Measurement::Pm10,
    ];

    /// The particulate fractions, the default chart selection.
    pub fn particulates() -> Vec<Measurement> {
        vec![
            Measurement::Pm1,
            Measurement::Pm2_5,
            Measurement::Pm4,
            Measurement::Pm10,
        ]
    }

    /// Position in [`Reading::values`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Column name in the source file.
    pub fn column(self) -> &'static str {
        match self {
            Measurement::Temperature => "temperatura_C",
            Measurement::Humidity => "humedad_relativa_pct",
            Measurement::Co2 => "CO2_ppm",
            Measurement::Pm1 => "PM1_ug_m3",
            Measurement::Pm2_5 => "PM2_5_ug_m3",
            Measurement::Pm4 => "PM4_ug_m3",
            Measurement::Pm10 => "PM10_ug_m3",
        }
    }

    /// Human-readable name for legends and tables.
    pub fn label(self) -> &'static str {
        match self {
            Measurement::Temperature => "Temperature",
            Measurement::Humidity => "Relative humidity",
            Measurement::Co2 => "CO₂",
            Measurement::Pm1 => "PM1",
            Measurement::Pm2_5 => "PM2.5",
            Measurement::Pm4 => "PM4",
            Measurement::Pm10 => "PM10",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Measurement::Temperature => "°C",
            Measurement::Humidity => "%",
            Measurement::Co2 => "ppm",
            Measurement::Pm1 | Measurement::Pm2_5 | Measurement::Pm4 | Measurement::Pm10 => {
                "µg/m³"
            }
        }
    }

    /// Look up a field by its source column name.
    pub fn from_column(name: &str) -> Option<Measurement> {
        Self::ALL.into_iter().find(|m| m.column() == name)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

impl FromStr for Measurement {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Measurement::from_column(s.trim()).ok_or_else(|| DataError::UnknownField(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Reading – one row of the source table
// ---------------------------------------------------------------------------

/// A single sensor sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reading {
    pub timestamp: DateTime<Utc>,
    /// One slot per [`Measurement`], indexed by [`Measurement::index`].
    /// `None` means missing: absent column, empty cell or unparseable text.
    pub values: [Option<f64>; Measurement::COUNT],
    /// Passthrough columns: column_name → cell text. Empty cells are omitted.
    pub extra: BTreeMap<String, String>,
}

impl Reading {
    /// A reading with every measurement missing and no passthrough data.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Reading {
            timestamp,
            values: [None; Measurement::COUNT],
            extra: BTreeMap::new(),
        }
    }

    pub fn get(&self, field: Measurement) -> Option<f64> {
        self.values[field.index()]
    }

    pub fn set(&mut self, field: Measurement, value: Option<f64>) {
        self.values[field.index()] = value;
    }

    /// Builder-style [`Reading::set`], handy for fixtures.
    pub fn with(mut self, field: Measurement, value: f64) -> Self {
        self.set(field, Some(value));
        self
    }
}

// ---------------------------------------------------------------------------
// ReadingSet – a normalized, time-ordered collection of readings
// ---------------------------------------------------------------------------

/// A set of readings sorted ascending by timestamp.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadingSet {
    pub readings: Vec<Reading>,
    /// Measurement fields present as columns in the source, canonical order.
    pub fields: Vec<Measurement>,
    /// Passthrough column names, source order.
    pub extra_columns: Vec<String>,
}

impl ReadingSet {
    /// Build a set, sorting readings by timestamp. The sort is stable so rows
    /// sharing an instant keep their source order.
    pub fn new(
        mut readings: Vec<Reading>,
        mut fields: Vec<Measurement>,
        extra_columns: Vec<String>,
    ) -> Self {
        readings.sort_by_key(|r| r.timestamp);
        fields.sort();
        fields.dedup();
        ReadingSet {
            readings,
            fields,
            extra_columns,
        }
    }

    /// An empty set with the same schema.
    pub fn empty_like(&self) -> Self {
        ReadingSet {
            readings: Vec::new(),
            fields: self.fields.clone(),
            extra_columns: self.extra_columns.clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn has_field(&self, field: Measurement) -> bool {
        self.fields.contains(&field)
    }

    /// The requested fields that this set actually carries, request order.
    pub fn present_fields(&self, requested: &[Measurement]) -> Vec<Measurement> {
        let mut out = Vec::with_capacity(requested.len());
        for &f in requested {
            if self.has_field(f) && !out.contains(&f) {
                out.push(f);
            }
        }
        out
    }

    pub fn first_timestamp(&self) -> Option<DateTime<Utc>> {
        self.readings.first().map(|r| r.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.readings.last().map(|r| r.timestamp)
    }

    /// Present values of one field, in time order.
    pub fn values(&self, field: Measurement) -> impl Iterator<Item = f64> + '_ {
        self.readings.iter().filter_map(move |r| r.get(field))
    }

    /// Melt the set into long format: one point per present value, grouped
    /// by field (request order) and ordered by time within a field.
    pub fn series(&self, fields: &[Measurement]) -> Vec<SeriesPoint> {
        let fields = self.present_fields(fields);
        let mut points = Vec::new();
        for field in fields {
            points.extend(self.readings.iter().filter_map(|r| {
                r.get(field).map(|value| SeriesPoint {
                    timestamp: r.timestamp,
                    field,
                    value,
                })
            }));
        }
        points
    }
}

/// One point of a long-format series, the shape line charts consume.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub timestamp: DateTime<Utc>,
    pub field: Measurement,
    pub value: f64,
}
