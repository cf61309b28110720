use std::io::Write;
use std::path::Path;

use super::filter::DateRange;
use super::model::{ReadingSet, TIMESTAMP_COLUMN};
use crate::error::{DataError, Result};

/// Layout of the exported timestamp column. Fractional seconds are written
/// only when present.
pub const EXPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// Write `set` as CSV: timestamp, present measurement columns, passthrough
/// columns. Missing values are empty cells.
pub fn write_csv<W: Write>(set: &ReadingSet, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);

    let mut header: Vec<&str> = Vec::with_capacity(1 + set.fields.len() + set.extra_columns.len());
    header.push(TIMESTAMP_COLUMN);
    header.extend(set.fields.iter().map(|f| f.column()));
    header.extend(set.extra_columns.iter().map(String::as_str));
    wtr.write_record(&header)?;

    let mut record: Vec<String> = Vec::with_capacity(header.len());
    for reading in &set.readings {
        record.clear();
        record.push(reading.timestamp.format(EXPORT_TIMESTAMP_FORMAT).to_string());
        for &field in &set.fields {
            record.push(reading.get(field).map(|v| v.to_string()).unwrap_or_default());
        }
        for col in &set.extra_columns {
            record.push(reading.extra.get(col).cloned().unwrap_or_default());
        }
        wtr.write_record(&record)?;
    }

    wtr.flush().map_err(|e| DataError::io("<csv writer>", e))?;
    Ok(())
}

/// Write `set` as CSV to `path`, creating or truncating it.
pub fn export_to_path(set: &ReadingSet, path: &Path) -> Result<()> {
    let file = std::fs::File::create(path).map_err(|e| DataError::io(path, e))?;
    write_csv(set, std::io::BufWriter::new(file))
}

/// Download name for an export of `range`, e.g.
/// `air_quality_2024-01-01_2024-01-31.csv`.
pub fn export_file_name(range: &DateRange) -> String {
    format!("air_quality_{}_{}.csv", range.start, range.end)
}
