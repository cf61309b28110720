//! Error types for loading and querying air-quality data.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by the data layer.
///
/// Only whole-source failures end up here. Row-level problems (a bad
/// timestamp, a non-numeric cell) are absorbed during normalization.
#[derive(Debug, Error)]
pub enum DataError {
    /// The source could not be opened or read.
    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed CSV (bad UTF-8, unterminated quote, ...).
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Malformed JSON document.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow conversion failure while decoding Parquet columns.
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// Malformed Parquet file.
    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("unsupported file extension: .{0}")]
    UnsupportedExtension(String),

    /// The source has no header row at all.
    #[error("source has no header row")]
    MissingHeader,

    #[error("source has no '{0}' column")]
    MissingTimestampColumn(&'static str),

    /// JSON parsed fine but is not an array of objects.
    #[error("invalid JSON layout: {0}")]
    JsonLayout(String),

    #[error("invalid resample rule '{0}'")]
    InvalidResampleRule(String),

    #[error("invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("unknown measurement column '{0}'")]
    UnknownField(String),
}

impl DataError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DataError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
