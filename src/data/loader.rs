use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use arrow::array::{Array, AsArray};
use arrow::compute::cast;
use arrow::datatypes::DataType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{info, warn};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::model::{Measurement, Reading, ReadingSet, TIMESTAMP_COLUMN};
use crate::error::{DataError, Result};

// ---------------------------------------------------------------------------
// Load options
// ---------------------------------------------------------------------------

/// Which measurement columns to coerce to numbers. Columns not listed here
/// are kept as passthrough text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LoadOptions {
    pub fields: Vec<Measurement>,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            fields: Measurement::ALL.to_vec(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Load and normalize a dataset from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.csv`     – header row, one reading per line (recommended)
/// * `.json`    – `[{ "timestamp": "...", "CO2_ppm": 812, ... }, ...]`
/// * `.parquet` – any column types Arrow can render as text
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<ReadingSet> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let raw = match ext.as_str() {
        "csv" => {
            let file = std::fs::File::open(path).map_err(|e| DataError::io(path, e))?;
            read_csv_table(file)?
        }
        "json" => {
            let text = std::fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
            read_json_table(&text)?
        }
        "parquet" | "pq" => {
            let file = std::fs::File::open(path).map_err(|e| DataError::io(path, e))?;
            read_parquet_table(file)?
        }
        other => return Err(DataError::UnsupportedExtension(other.to_string())),
    };

    let set = normalize(raw, options)?;
    info!("loaded {} readings from {}", set.len(), path.display());
    Ok(set)
}

/// Load and normalize CSV from any byte stream.
pub fn load_csv_reader<R: Read>(reader: R, options: &LoadOptions) -> Result<ReadingSet> {
    normalize(read_csv_table(reader)?, options)
}

// ---------------------------------------------------------------------------
// RawTable – undecoded cells shared by every format
// ---------------------------------------------------------------------------

/// Header names plus rows of optional cell text. Every loader produces one of
/// these; [`normalize`] turns it into a [`ReadingSet`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    /// Each row has at most `headers.len()` cells; missing cells are `None`.
    pub rows: Vec<Vec<Option<String>>>,
}

/// Parse timestamps, coerce measurements, drop undated rows and sort.
pub fn normalize(raw: RawTable, options: &LoadOptions) -> Result<ReadingSet> {
    let ts_idx = raw
        .headers
        .iter()
        .position(|h| h == TIMESTAMP_COLUMN)
        .ok_or(DataError::MissingTimestampColumn(TIMESTAMP_COLUMN))?;

    // Column index → role, resolved once per table.
    let mut measurement_cols: Vec<(usize, Measurement)> = Vec::new();
    let mut extra_cols: Vec<(usize, String)> = Vec::new();
    for (idx, name) in raw.headers.iter().enumerate() {
        if idx == ts_idx {
            continue;
        }
        match Measurement::from_column(name) {
            Some(m) if options.fields.contains(&m) => measurement_cols.push((idx, m)),
            _ => extra_cols.push((idx, name.clone())),
        }
    }

    let total = raw.rows.len();
    let mut readings = Vec::with_capacity(total);
    for row in raw.rows {
        let Some(timestamp) = cell(&row, ts_idx).and_then(parse_timestamp) else {
            continue;
        };

        let mut reading = Reading::new(timestamp);
        for &(idx, field) in &measurement_cols {
            reading.set(field, cell(&row, idx).and_then(parse_number));
        }
        for (idx, name) in &extra_cols {
            if let Some(text) = cell(&row, *idx).filter(|t| !t.is_empty()) {
                reading.extra.insert(name.clone(), text.to_string());
            }
        }
        readings.push(reading);
    }

    let dropped = total - readings.len();
    if dropped > 0 {
        warn!("dropped {dropped} of {total} rows with unparseable timestamps");
    }

    Ok(ReadingSet::new(
        readings,
        measurement_cols.into_iter().map(|(_, m)| m).collect(),
        extra_cols.into_iter().map(|(_, name)| name).collect(),
    ))
}

fn cell(row: &[Option<String>], idx: usize) -> Option<&str> {
    row.get(idx).and_then(|c| c.as_deref())
}

// ---------------------------------------------------------------------------
// Cell parsing
// ---------------------------------------------------------------------------

/// Offset-aware layouts, tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f%z", "%Y-%m-%dT%H:%M%z"];

/// Offset-less layouts, interpreted as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Parse an ISO-8601-ish timestamp into UTC. Returns `None` for anything
/// unparseable; callers drop such rows.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    // Accept "2024-01-01 08:00:00" as well as "2024-01-01T08:00:00".
    let owned;
    let s = if s.len() > 10 && s.as_bytes()[10] == b' ' {
        owned = format!("{}T{}", &s[..10], s[11..].trim_start());
        owned.as_str()
    } else {
        s
    };

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    // Trailing "Z" without seconds, e.g. "2024-01-01T08:00Z".
    let naive_part = s.strip_suffix('Z').unwrap_or(s);
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(naive_part, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Coerce a cell to a finite number. Empty, textual, `NaN` and infinite
/// content all map to missing.
pub fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

// ---------------------------------------------------------------------------
// CSV reader
// ---------------------------------------------------------------------------

/// CSV layout: header row with column names, one reading per record.
/// Short records are tolerated; their missing cells are missing values.
fn read_csv_table<R: Read>(reader: R) -> Result<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(DataError::MissingHeader);
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result?;
        let row = (0..headers.len())
            .map(|i| record.get(i).map(|v| v.to_string()))
            .collect();
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

// ---------------------------------------------------------------------------
// JSON reader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, the default `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "timestamp": "2024-01-01T08:00:00Z", "CO2_ppm": 812, "evento": "ventana" },
///   ...
/// ]
/// ```
fn read_json_table(text: &str) -> Result<RawTable> {
    let root: JsonValue = serde_json::from_str(text)?;
    let records = root
        .as_array()
        .ok_or_else(|| DataError::JsonLayout("expected top-level array".into()))?;

    let mut headers: Vec<String> = Vec::new();
    let mut column_of: BTreeMap<String, usize> = BTreeMap::new();
    let mut sparse_rows: Vec<Vec<(usize, Option<String>)>> = Vec::with_capacity(records.len());

    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| DataError::JsonLayout(format!("row {i} is not an object")))?;

        let mut row = Vec::with_capacity(obj.len());
        for (key, val) in obj {
            let idx = *column_of.entry(key.clone()).or_insert_with(|| {
                headers.push(key.clone());
                headers.len() - 1
            });
            row.push((idx, json_to_cell(val)));
        }
        sparse_rows.push(row);
    }

    if !records.is_empty() && !column_of.contains_key(TIMESTAMP_COLUMN) {
        return Err(DataError::MissingTimestampColumn(TIMESTAMP_COLUMN));
    }
    if records.is_empty() {
        // No rows means no inferable schema; a timestamp-only header keeps
        // normalization happy and yields an empty set.
        headers.push(TIMESTAMP_COLUMN.to_string());
    }

    let rows = sparse_rows
        .into_iter()
        .map(|sparse| {
            let mut row = vec![None; headers.len()];
            for (idx, value) in sparse {
                row[idx] = value;
            }
            row
        })
        .collect();

    Ok(RawTable { headers, rows })
}

fn json_to_cell(val: &JsonValue) -> Option<String> {
    match val {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Parquet reader
// ---------------------------------------------------------------------------

/// Load a Parquet file by rendering every column as text through Arrow.
///
/// Native `Timestamp` columns render as ISO-8601 (with offset when the column
/// carries a time zone), numeric columns as plain decimals, so both flow
/// through the same normalization as CSV. Works with files written by both
/// **Pandas** (`df.to_parquet()`) and **Polars** (`df.write_parquet()`).
fn read_parquet_table(file: std::fs::File) -> Result<RawTable> {
    let builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let reader = builder.build()?;

    let mut rows = Vec::new();
    for batch_result in reader {
        let batch = batch_result?;

        let mut columns = Vec::with_capacity(batch.num_columns());
        for col in batch.columns() {
            columns.push(cast(col, &DataType::Utf8)?);
        }
        let text_columns = columns
            .iter()
            .map(|c| {
                c.as_string_opt::<i32>().ok_or_else(|| {
                    DataError::Arrow(arrow::error::ArrowError::CastError(format!(
                        "column of type {:?} did not cast to Utf8",
                        c.data_type()
                    )))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        for row in 0..batch.num_rows() {
            rows.push(
                text_columns
                    .iter()
                    .map(|col| (!col.is_null(row)).then(|| col.value(row).to_string()))
                    .collect(),
            );
        }
    }

    Ok(RawTable { headers, rows })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    fn load_str(csv: &str) -> Result<ReadingSet> {
        load_csv_reader(csv.as_bytes(), &LoadOptions::default())
    }

    #[test]
    fn test_parse_timestamp_variants() {
        let expected = utc(2024, 1, 1, 8, 0, 0);
        assert_eq!(parse_timestamp("2024-01-01T08:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T08:00:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 08:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T09:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01 09:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T09:00:00+0100"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-01T08:00Z"), Some(expected));
        assert_eq!(
            parse_timestamp("2024-01-01"),
            Some(utc(2024, 1, 1, 0, 0, 0))
        );
        assert_eq!(
            parse_timestamp("2024-01-01T08:00:00.250Z").map(|t| t.timestamp_millis()),
            Some(expected.timestamp_millis() + 250)
        );
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("   "), None);
        assert_eq!(parse_timestamp("not a date"), None);
        assert_eq!(parse_timestamp("2024-13-01T00:00:00"), None);
        assert_eq!(parse_timestamp("2024-02-30"), None);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("12.5"), Some(12.5));
        assert_eq!(parse_number(" 7 "), Some(7.0));
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("NaN"), None);
        assert_eq!(parse_number("inf"), None);
    }

    #[test]
    fn test_load_csv_sorts_and_drops_bad_timestamps() {
        let csv = "\
timestamp,CO2_ppm,PM2_5_ug_m3,evento
2024-01-01T10:00:00Z,900,12,
garbage,1,1,x
2024-01-01T08:00:00Z,800,abc,ventana
,5,5,
2024-01-01T09:00:00Z,850,10,
";
        let set = load_str(csv).unwrap();
        assert_eq!(set.len(), 3);
        assert_eq!(set.fields, vec![Measurement::Co2, Measurement::Pm2_5]);
        assert_eq!(set.extra_columns, vec!["evento".to_string()]);

        let times: Vec<_> = set.readings.iter().map(|r| r.timestamp).collect();
        assert_eq!(
            times,
            vec![
                utc(2024, 1, 1, 8, 0, 0),
                utc(2024, 1, 1, 9, 0, 0),
                utc(2024, 1, 1, 10, 0, 0)
            ]
        );

        let first = &set.readings[0];
        assert_eq!(first.get(Measurement::Co2), Some(800.0));
        assert_eq!(first.get(Measurement::Pm2_5), None);
        assert_eq!(first.extra.get("evento").map(String::as_str), Some("ventana"));
        assert!(set.readings[1].extra.is_empty());
    }

    #[test]
    fn test_load_csv_keeps_relative_order_of_equal_timestamps() {
        let csv = "\
timestamp,CO2_ppm
2024-01-01T08:00:00Z,1
bad,2
2024-01-01T08:00:00Z,3
2024-01-01T07:00:00Z,4
";
        let set = load_str(csv).unwrap();
        let co2: Vec<f64> = set.values(Measurement::Co2).collect();
        assert_eq!(co2, vec![4.0, 1.0, 3.0]);
        assert!(set
            .readings
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_load_csv_converts_offsets_to_utc() {
        let csv = "timestamp,temperatura_C\n2024-06-01T02:30:00+02:00,21.5\n";
        let set = load_str(csv).unwrap();
        assert_eq!(set.readings[0].timestamp, utc(2024, 6, 1, 0, 30, 0));
        assert_eq!(set.readings[0].get(Measurement::Temperature), Some(21.5));
    }

    #[test]
    fn test_load_csv_ragged_rows() {
        let csv = "timestamp,CO2_ppm,PM10_ug_m3\n2024-01-01T08:00:00Z,700\n";
        let set = load_str(csv).unwrap();
        assert_eq!(set.readings[0].get(Measurement::Co2), Some(700.0));
        assert_eq!(set.readings[0].get(Measurement::Pm10), None);
    }

    #[test]
    fn test_unexpected_fields_become_passthrough() {
        let csv = "timestamp,CO2_ppm,PM1_ug_m3\n2024-01-01T08:00:00Z,700,3\n";
        let options = LoadOptions {
            fields: vec![Measurement::Co2],
        };
        let set = load_csv_reader(csv.as_bytes(), &options).unwrap();
        assert_eq!(set.fields, vec![Measurement::Co2]);
        assert_eq!(set.extra_columns, vec!["PM1_ug_m3".to_string()]);
        assert_eq!(set.readings[0].get(Measurement::Pm1), None);
    }

    #[test]
    fn test_missing_timestamp_column_is_fatal() {
        let err = load_str("time,CO2_ppm\n2024-01-01,1\n").unwrap_err();
        assert!(matches!(err, DataError::MissingTimestampColumn(_)));
    }

    #[test]
    fn test_empty_source_is_fatal() {
        let err = load_str("").unwrap_err();
        assert!(matches!(
            err,
            DataError::MissingHeader | DataError::MissingTimestampColumn(_)
        ));
    }

    #[test]
    fn test_header_only_is_empty_set() {
        let set = load_str("timestamp,CO2_ppm\n").unwrap();
        assert!(set.is_empty());
        assert_eq!(set.fields, vec![Measurement::Co2]);
    }

    #[test]
    fn test_load_file_missing_is_io_error() {
        let err = load_file(Path::new("/nonexistent/readings.csv"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, DataError::Io { .. }));
    }

    #[test]
    fn test_load_file_unsupported_extension() {
        let err = load_file(Path::new("readings.xlsx"), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, DataError::UnsupportedExtension(ext) if ext == "xlsx"));
    }

    #[test]
    fn test_load_file_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "timestamp,humedad_relativa_pct").unwrap();
        writeln!(file, "2024-01-02 12:00:00,45").unwrap();
        writeln!(file, "2024-01-01 12:00:00,40").unwrap();
        file.flush().unwrap();

        let set = load_file(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.readings[0].get(Measurement::Humidity), Some(40.0));
    }

    #[test]
    fn test_load_file_json() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"[
                {{"timestamp": "2024-01-01T09:00:00Z", "CO2_ppm": 900, "evento": "puerta"}},
                {{"timestamp": "2024-01-01T08:00:00Z", "CO2_ppm": null, "PM4_ug_m3": "7.5"}},
                {{"timestamp": "nope", "CO2_ppm": 1}}
            ]"#
        )
        .unwrap();
        file.flush().unwrap();

        let set = load_file(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.fields, vec![Measurement::Co2, Measurement::Pm4]);
        assert_eq!(set.readings[0].get(Measurement::Co2), None);
        assert_eq!(set.readings[0].get(Measurement::Pm4), Some(7.5));
        assert_eq!(set.readings[1].get(Measurement::Co2), Some(900.0));
        assert_eq!(
            set.readings[1].extra.get("evento").map(String::as_str),
            Some("puerta")
        );
    }

    #[test]
    fn test_load_json_rejects_non_array() {
        let err = read_json_table(r#"{"timestamp": "2024-01-01"}"#).unwrap_err();
        assert!(matches!(err, DataError::JsonLayout(_)));
    }

    #[test]
    fn test_load_json_empty_array() {
        let set = normalize(read_json_table("[]").unwrap(), &LoadOptions::default()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_load_file_parquet() {
        use std::sync::Arc;

        use arrow::array::{Float64Array, StringArray, TimestampMillisecondArray};
        use arrow::datatypes::{Field, Schema, TimeUnit};
        use arrow::record_batch::RecordBatch;
        use parquet::arrow::ArrowWriter;

        let t0 = utc(2024, 1, 1, 8, 0, 0).timestamp_millis();
        let schema = Arc::new(Schema::new(vec![
            Field::new(
                "timestamp",
                DataType::Timestamp(TimeUnit::Millisecond, Some("UTC".into())),
                true,
            ),
            Field::new("PM2_5_ug_m3", DataType::Float64, true),
            Field::new("evento", DataType::Utf8, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(
                    TimestampMillisecondArray::from(vec![Some(t0 + 600_000), None, Some(t0)])
                        .with_timezone("UTC"),
                ),
                Arc::new(Float64Array::from(vec![Some(20.0), Some(1.0), None])),
                Arc::new(StringArray::from(vec![None, None, Some("limpieza")])),
            ],
        )
        .unwrap();

        let file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        let mut writer = ArrowWriter::try_new(file.reopen().unwrap(), schema, None).unwrap();
        writer.write(&batch).unwrap();
        writer.close().unwrap();

        let set = load_file(file.path(), &LoadOptions::default()).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.readings[0].timestamp, utc(2024, 1, 1, 8, 0, 0));
        assert_eq!(set.readings[0].get(Measurement::Pm2_5), None);
        assert_eq!(
            set.readings[0].extra.get("evento").map(String::as_str),
            Some("limpieza")
        );
        assert_eq!(set.readings[1].get(Measurement::Pm2_5), Some(20.0));
    }

    #[test]
    fn test_load_file_corrupt_parquet() {
        let mut file = tempfile::Builder::new().suffix(".parquet").tempfile().unwrap();
        writeln!(file, "definitely not parquet").unwrap();
        file.flush().unwrap();
        let err = load_file(file.path(), &LoadOptions::default()).unwrap_err();
        assert!(matches!(err, DataError::Parquet(_)));
    }
}
