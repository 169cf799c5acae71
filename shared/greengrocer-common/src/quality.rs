//! Batch-level data quality report
//!
//! Per-record failures are collected here instead of aborting the run. The
//! report is written next to the snapshots as `quality_report.json`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RecordErrorKind;
use crate::types::{Dataset, SourceLocation};

/// A single rejected record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordError {
    pub dataset: Dataset,
    /// Natural key, when the record had one
    pub natural_key: Option<String>,
    pub source: Option<SourceLocation>,
    #[serde(flatten)]
    pub kind: RecordErrorKind,
}

impl RecordError {
    pub fn new(dataset: Dataset, kind: RecordErrorKind) -> Self {
        Self {
            dataset,
            natural_key: None,
            source: None,
            kind,
        }
    }

    pub fn with_natural_key(mut self, key: Option<&str>) -> Self {
        self.natural_key = key.map(str::to_string);
        self
    }

    pub fn with_source(mut self, source: Option<&SourceLocation>) -> Self {
        self.source = source.cloned();
        self
    }
}

/// Counters for one dataset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetStats {
    /// Rows read from the CSV exports
    pub rows_read: u64,
    /// Rows rejected with a record error
    pub rows_rejected: u64,
    /// Well-formed rows discarded as duplicates of a surviving natural key
    pub duplicates_dropped: u64,
    /// Rows in the cleaned output
    pub rows_cleaned: u64,
    /// Cleaned rows with no product dimension match
    pub reference_misses: u64,
}

/// Data quality report for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataQualityReport {
    pub run_id: String,
    pub stats: BTreeMap<Dataset, DatasetStats>,
    pub errors: Vec<RecordError>,
}

impl DataQualityReport {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            ..Default::default()
        }
    }

    /// Record a rejected row
    pub fn record(&mut self, error: RecordError) {
        self.stats_mut(error.dataset).rows_rejected += 1;
        self.errors.push(error);
    }

    /// Record several rejected rows
    pub fn extend(&mut self, errors: impl IntoIterator<Item = RecordError>) {
        for error in errors {
            self.record(error);
        }
    }

    /// Mutable counters for a dataset, created on first use
    pub fn stats_mut(&mut self, dataset: Dataset) -> &mut DatasetStats {
        self.stats.entry(dataset).or_default()
    }

    /// Counters for a dataset (zeroed if never touched)
    pub fn stats(&self, dataset: Dataset) -> DatasetStats {
        self.stats.get(&dataset).cloned().unwrap_or_default()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Errors for one dataset
    pub fn errors_for(&self, dataset: Dataset) -> impl Iterator<Item = &RecordError> {
        self.errors.iter().filter(move |e| e.dataset == dataset)
    }
}
