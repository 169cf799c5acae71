//! CSV intake for the raw exports (bronze layer)
//!
//! Every `*.csv` under a dataset directory is read in sorted path order so the
//! input order, and therefore duplicate tie-breaking, is stable across runs.
//! Headers go through a column map first to absorb schema drift between store
//! software versions; all cells stay untyped text.

use csv::{ReaderBuilder, StringRecord};
use greengrocer_common::{
    Dataset, PipelineError, RawRecord, RecordError, RecordErrorKind, Result, SourceLocation,
};
use std::collections::HashSet;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Sales header aliases seen across store exports, mapped to canonical names
pub const SALES_COLUMN_ALIASES: &[(&str, &str)] = &[
    ("qty", "quantity"),
    ("quant", "quantity"),
    ("count", "quantity"),
    ("price", "unit_price"),
    ("cost", "unit_price"),
    ("tx_id", "transaction_id"),
    ("txn_id", "transaction_id"),
    ("prod_id", "product_id"),
    ("item_id", "product_id"),
    ("total", "total_amount"),
    ("amount", "total_amount"),
    ("date", "transaction_timestamp"),
    ("timestamp", "transaction_timestamp"),
    ("sale_date", "transaction_timestamp"),
    ("date_of_sale", "transaction_timestamp"),
];

/// Inventory exports have a stable header
pub const INVENTORY_COLUMN_ALIASES: &[(&str, &str)] = &[("status", "delivery_status")];

/// Header aliases for a dataset
pub fn column_aliases(dataset: Dataset) -> &'static [(&'static str, &'static str)] {
    match dataset {
        Dataset::Sales => SALES_COLUMN_ALIASES,
        Dataset::Inventory => INVENTORY_COLUMN_ALIASES,
    }
}

/// Records read from one dataset directory
#[derive(Debug)]
pub struct Ingested<T> {
    pub records: Vec<T>,
    /// Rows that could not be read at all
    pub errors: Vec<RecordError>,
    pub files_read: usize,
    /// Data rows seen, including malformed ones
    pub rows_read: u64,
}

impl<T> Default for Ingested<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            errors: Vec::new(),
            files_read: 0,
            rows_read: 0,
        }
    }
}

/// Normalize a header row through the alias map
///
/// Names are trimmed and lower-cased. When two headers resolve to the same
/// canonical name the first keeps it and later ones are renamed out of the way
/// so they are ignored.
pub fn normalize_headers(headers: &StringRecord, aliases: &[(&str, &str)]) -> StringRecord {
    let mut seen = HashSet::new();
    let mut normalized = StringRecord::new();

    for (idx, header) in headers.iter().enumerate() {
        let lowered = header.trim().to_ascii_lowercase();
        let canonical = aliases
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(_, canonical)| (*canonical).to_string())
            .unwrap_or(lowered);

        if seen.insert(canonical.clone()) {
            normalized.push_field(&canonical);
        } else {
            normalized.push_field(&format!("__shadowed_{}_{}", idx, canonical));
        }
    }

    normalized
}

/// List `*.csv` files in a directory, sorted by path
pub fn list_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        PipelineError::IoError(format!("cannot read directory {}: {}", dir.display(), e))
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if is_csv && path.is_file() {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

/// Read every CSV export of a dataset directory
#[instrument(skip_all, fields(dataset = %T::DATASET, dir = %dir.display()))]
pub fn read_dataset<T: RawRecord>(dir: &Path) -> Result<Ingested<T>> {
    let files = list_csv_files(dir)?;
    if files.is_empty() {
        warn!("No CSV files found in {}", dir.display());
    }

    let mut ingested = Ingested::default();
    for path in &files {
        let file = fs::File::open(path).map_err(|e| {
            PipelineError::IoError(format!("cannot open {}: {}", path.display(), e))
        })?;
        read_csv::<T, _>(file, &path.display().to_string(), &mut ingested)?;
        ingested.files_read += 1;
    }

    info!(
        "Read {} {} rows from {} files ({} malformed)",
        ingested.rows_read,
        T::DATASET,
        ingested.files_read,
        ingested.errors.len()
    );
    Ok(ingested)
}

/// Read one CSV stream into `ingested`
///
/// An unreadable header fails the whole read; an unreadable row is recorded
/// as a `MalformedRow` error and skipped.
pub fn read_csv<T: RawRecord, R: Read>(
    reader: R,
    source_name: &str,
    ingested: &mut Ingested<T>,
) -> Result<()> {
    let mut csv_reader = ReaderBuilder::new().has_headers(true).from_reader(reader);

    let raw_headers = csv_reader
        .headers()
        .map_err(|e| PipelineError::CsvError(format!("{}: bad header: {}", source_name, e)))?
        .clone();
    let headers = normalize_headers(&raw_headers, column_aliases(T::DATASET));
    debug!("{} headers {:?} -> {:?}", source_name, raw_headers, headers);

    for result in csv_reader.records() {
        ingested.rows_read += 1;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                warn!("{}:{} skipped malformed row: {}", source_name, line, e);
                ingested.errors.push(
                    RecordError::new(
                        T::DATASET,
                        RecordErrorKind::MalformedRow {
                            reason: e.to_string(),
                        },
                    )
                    .with_source(Some(&SourceLocation::new(source_name, line))),
                );
                continue;
            }
        };

        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let location = SourceLocation::new(source_name, line);
        match record.deserialize::<T>(Some(&headers)) {
            Ok(mut raw) => {
                raw.set_source(location);
                ingested.records.push(raw);
            }
            Err(e) => {
                warn!("{} skipped undecodable row: {}", location, e);
                ingested.errors.push(
                    RecordError::new(
                        T::DATASET,
                        RecordErrorKind::MalformedRow {
                            reason: e.to_string(),
                        },
                    )
                    .with_source(Some(&location)),
                );
            }
        }
    }

    Ok(())
}
