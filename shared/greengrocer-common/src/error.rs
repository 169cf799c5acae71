//! Error types for the GreenGrocer pipeline

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quality::DataQualityReport;

/// Pipeline run errors
///
/// Any of these aborts the run before snapshots are replaced, so the previous
/// good output stays in place.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Filesystem error (input directories, snapshot files)
    #[error("I/O error: {0}")]
    IoError(String),

    /// CSV reader error that is not tied to a single row
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Arrow record batch construction error
    #[error("Arrow error: {0}")]
    ArrowError(String),

    /// Parquet snapshot write/read error
    #[error("Parquet error: {0}")]
    ParquetError(String),

    /// DuckDB warehouse error
    #[error("DuckDB error: {0}")]
    DuckDBError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Serialization error (quality report)
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Strict mode rejected the run because record errors were collected
    #[error("Data quality check failed: {} record errors", .0.errors.len())]
    DataQuality(Box<DataQualityReport>),

    /// Background task failure
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Per-record failure kinds
///
/// These never abort a run on their own; they are collected into the
/// [`DataQualityReport`] and the offending record is excluded.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecordErrorKind {
    /// The natural key or the tie-break timestamp is missing
    #[error("missing required key field `{field}`")]
    MissingKey { field: String },

    /// A field failed type coercion
    #[error("cannot parse `{field}` from {value:?}: {reason}")]
    Parse {
        field: String,
        value: String,
        reason: String,
    },

    /// The CSV row itself could not be read
    #[error("malformed row: {reason}")]
    MalformedRow { reason: String },
}

impl RecordErrorKind {
    /// Build a parse failure for `field`
    pub fn parse(field: &str, value: &str, reason: impl Into<String>) -> Self {
        RecordErrorKind::Parse {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Build a missing key failure for `field`
    pub fn missing_key(field: &str) -> Self {
        RecordErrorKind::MissingKey {
            field: field.to_string(),
        }
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::IoError(err.to_string())
    }
}

impl From<csv::Error> for PipelineError {
    fn from(err: csv::Error) -> Self {
        PipelineError::CsvError(err.to_string())
    }
}

impl From<arrow::error::ArrowError> for PipelineError {
    fn from(err: arrow::error::ArrowError) -> Self {
        PipelineError::ArrowError(err.to_string())
    }
}

impl From<parquet::errors::ParquetError> for PipelineError {
    fn from(err: parquet::errors::ParquetError) -> Self {
        PipelineError::ParquetError(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::SerializationError(err.to_string())
    }
}
