//! Parquet snapshots of the derived tables
//!
//! Each run replaces the previous snapshot of every table. All files are
//! first written next to their targets under temporary names and only renamed
//! into place on [`SnapshotWriter::commit`]; a writer dropped before commit
//! removes its temporary files, so a failed run leaves the old snapshot intact.
//! A commit that fails partway restores every table it already replaced.

use arrow::array::{
    ArrayRef, Date32Array, Decimal128Array, Int64Array, StringArray, TimestampMicrosecondArray,
};
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate, NaiveDateTime};
use greengrocer_common::{
    dim_products_schema, mart_inventory_schema, mart_sales_schema, stg_inventory_schema,
    stg_sales_schema, CleanedDelivery, CleanedSale, DataQualityReport, EnrichedDelivery,
    EnrichedSale, PipelineConfig, PipelineError, ProductDimension, Result, DIM_PRODUCTS_TABLE,
    MART_INVENTORY_TABLE, MART_SALES_TABLE, MONEY_PRECISION, MONEY_SCALE, STG_INVENTORY_TABLE,
    STG_SALES_TABLE,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::properties::WriterProperties;
use rust_decimal::{Decimal, RoundingStrategy};
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Days from 0001-01-01 (CE) to 1970-01-01
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Rows that can be written as a snapshot table
pub trait SnapshotTable: Sized {
    /// Target table name
    const TABLE: &'static str;

    /// Build a record batch matching the table's Arrow schema
    fn record_batch(rows: &[Self]) -> Result<RecordBatch>;
}

fn micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

fn days(date: NaiveDate) -> i32 {
    date.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE
}

/// Unscaled DECIMAL(12, 2) value
fn money_units(value: Decimal) -> i128 {
    let scale = MONEY_SCALE as u32;
    let mut scaled = value.round_dp_with_strategy(scale, RoundingStrategy::MidpointAwayFromZero);
    scaled.rescale(scale);
    scaled.mantissa()
}

fn money_array(values: impl Iterator<Item = Decimal>) -> Result<ArrayRef> {
    let array = Decimal128Array::from(values.map(money_units).collect::<Vec<_>>())
        .with_precision_and_scale(MONEY_PRECISION, MONEY_SCALE)?;
    Ok(Arc::new(array))
}

fn text_array<'a>(values: impl Iterator<Item = &'a str>) -> ArrayRef {
    Arc::new(StringArray::from_iter_values(values))
}

fn nullable_text_array<'a>(values: impl Iterator<Item = Option<&'a str>>) -> ArrayRef {
    Arc::new(values.collect::<StringArray>())
}

fn timestamp_array(values: impl Iterator<Item = NaiveDateTime>) -> ArrayRef {
    Arc::new(TimestampMicrosecondArray::from(
        values.map(micros).collect::<Vec<_>>(),
    ))
}

fn date_array(values: impl Iterator<Item = NaiveDate>) -> ArrayRef {
    Arc::new(Date32Array::from(values.map(days).collect::<Vec<_>>()))
}

fn int_array(values: impl Iterator<Item = i64>) -> ArrayRef {
    Arc::new(Int64Array::from(values.collect::<Vec<_>>()))
}

impl SnapshotTable for CleanedSale {
    const TABLE: &'static str = STG_SALES_TABLE;

    fn record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns = vec![
            text_array(rows.iter().map(|r| r.transaction_id.as_str())),
            nullable_text_array(rows.iter().map(|r| r.store_id.as_deref())),
            timestamp_array(rows.iter().map(|r| r.transaction_timestamp)),
            text_array(rows.iter().map(|r| r.product_id.as_str())),
            nullable_text_array(rows.iter().map(|r| r.product_name.as_deref())),
            int_array(rows.iter().map(|r| r.quantity)),
            money_array(rows.iter().map(|r| r.unit_price))?,
            money_array(rows.iter().map(|r| r.total_amount))?,
        ];
        Ok(RecordBatch::try_new(stg_sales_schema(), columns)?)
    }
}

impl SnapshotTable for CleanedDelivery {
    const TABLE: &'static str = STG_INVENTORY_TABLE;

    fn record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns = vec![
            text_array(rows.iter().map(|r| r.delivery_id.as_str())),
            date_array(rows.iter().map(|r| r.delivery_date)),
            text_array(rows.iter().map(|r| r.store_id.as_str())),
            text_array(rows.iter().map(|r| r.product_id.as_str())),
            int_array(rows.iter().map(|r| r.quantity_delivered)),
            nullable_text_array(rows.iter().map(|r| r.delivery_status.as_deref())),
        ];
        Ok(RecordBatch::try_new(stg_inventory_schema(), columns)?)
    }
}

impl SnapshotTable for ProductDimension {
    const TABLE: &'static str = DIM_PRODUCTS_TABLE;

    fn record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns = vec![
            text_array(rows.iter().map(|r| r.product_id.as_str())),
            nullable_text_array(rows.iter().map(|r| r.product_name.as_deref())),
            money_array(rows.iter().map(|r| r.current_price))?,
            timestamp_array(rows.iter().map(|r| r.price_observed_at)),
        ];
        Ok(RecordBatch::try_new(dim_products_schema(), columns)?)
    }
}

impl SnapshotTable for EnrichedSale {
    const TABLE: &'static str = MART_SALES_TABLE;

    fn record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns = vec![
            text_array(rows.iter().map(|r| r.sale.transaction_id.as_str())),
            nullable_text_array(rows.iter().map(|r| r.sale.store_id.as_deref())),
            timestamp_array(rows.iter().map(|r| r.sale.transaction_timestamp)),
            text_array(rows.iter().map(|r| r.sale.product_id.as_str())),
            nullable_text_array(rows.iter().map(|r| r.product_name.as_deref())),
            nullable_text_array(rows.iter().map(|r| r.sale.product_name.as_deref())),
            int_array(rows.iter().map(|r| r.sale.quantity)),
            money_array(rows.iter().map(|r| r.sale.unit_price))?,
            money_array(rows.iter().map(|r| r.sale.total_amount))?,
        ];
        Ok(RecordBatch::try_new(mart_sales_schema(), columns)?)
    }
}

impl SnapshotTable for EnrichedDelivery {
    const TABLE: &'static str = MART_INVENTORY_TABLE;

    fn record_batch(rows: &[Self]) -> Result<RecordBatch> {
        let columns = vec![
            text_array(rows.iter().map(|r| r.delivery.delivery_id.as_str())),
            date_array(rows.iter().map(|r| r.delivery.delivery_date)),
            text_array(rows.iter().map(|r| r.delivery.store_id.as_str())),
            text_array(rows.iter().map(|r| r.delivery.product_id.as_str())),
            nullable_text_array(rows.iter().map(|r| r.product_name.as_deref())),
            int_array(rows.iter().map(|r| r.delivery.quantity_delivered)),
            nullable_text_array(rows.iter().map(|r| r.delivery.delivery_status.as_deref())),
        ];
        Ok(RecordBatch::try_new(mart_inventory_schema(), columns)?)
    }
}

/// A table written to its temporary file, waiting for commit
#[derive(Debug, Clone)]
pub struct StagedSnapshot {
    pub table: String,
    pub rows: usize,
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
}

/// Snapshot written into place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedSnapshot {
    pub table: String,
    pub rows: usize,
    pub path: PathBuf,
}

/// Two-phase snapshot writer
pub struct SnapshotWriter {
    config: PipelineConfig,
    staged: Vec<StagedSnapshot>,
    report: Option<StagedSnapshot>,
}

const REPORT_NAME: &str = "quality_report";

fn sidecar_path(path: &Path, suffix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}", name, suffix))
}

fn temp_path_for(path: &Path) -> PathBuf {
    sidecar_path(path, "tmp")
}

fn backup_path_for(path: &Path) -> PathBuf {
    sidecar_path(path, "bak")
}

fn writer_properties() -> Result<WriterProperties> {
    Ok(WriterProperties::builder()
        .set_compression(Compression::ZSTD(ZstdLevel::try_new(3)?))
        .build())
}

impl SnapshotWriter {
    /// Create a writer; the output directory is created if missing
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        fs::create_dir_all(&config.output_dir).map_err(|e| {
            PipelineError::IoError(format!(
                "cannot create output directory {}: {}",
                config.output_dir.display(),
                e
            ))
        })?;
        Ok(Self {
            config: config.clone(),
            staged: Vec::new(),
            report: None,
        })
    }

    /// Write `rows` to the table's temporary file
    #[instrument(skip_all, fields(table = T::TABLE, rows = rows.len()))]
    pub fn stage<T: SnapshotTable>(&mut self, rows: &[T]) -> Result<()> {
        let batch = T::record_batch(rows)?;
        self.stage_batch(T::TABLE, &batch)
    }

    /// Write an already built batch to the table's temporary file
    pub fn stage_batch(&mut self, table: &str, batch: &RecordBatch) -> Result<()> {
        let final_path = self.config.snapshot_path(table);
        let temp_path = temp_path_for(&final_path);

        let file = fs::File::create(&temp_path).map_err(|e| {
            PipelineError::IoError(format!("cannot create {}: {}", temp_path.display(), e))
        })?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(writer_properties()?))?;
        writer.write(batch)?;
        writer.close()?;

        debug!(
            "Staged {} rows for {} at {}",
            batch.num_rows(),
            table,
            temp_path.display()
        );
        self.staged.push(StagedSnapshot {
            table: table.to_string(),
            rows: batch.num_rows(),
            temp_path,
            final_path,
        });
        Ok(())
    }

    /// Write the quality report to its temporary file
    pub fn stage_report(&mut self, report: &DataQualityReport) -> Result<()> {
        let final_path = self.config.quality_report_path();
        let temp_path = temp_path_for(&final_path);

        let file = fs::File::create(&temp_path).map_err(|e| {
            PipelineError::IoError(format!("cannot create {}: {}", temp_path.display(), e))
        })?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, report)?;
        writer.flush()?;

        self.report = Some(StagedSnapshot {
            table: REPORT_NAME.to_string(),
            rows: report.error_count(),
            temp_path,
            final_path,
        });
        Ok(())
    }

    /// Move every staged file into place
    ///
    /// Existing snapshots are first moved aside to `.<name>.bak`. If any file
    /// cannot be installed, the ones already installed are removed and the
    /// previous snapshots are restored, so the output directory holds either
    /// the whole previous run or the whole new one.
    #[instrument(skip(self), fields(tables = self.staged.len()))]
    pub fn commit(mut self) -> Result<Vec<CommittedSnapshot>> {
        let pending: Vec<StagedSnapshot> = self
            .staged
            .iter()
            .chain(self.report.iter())
            .cloned()
            .collect();

        for snapshot in &pending {
            let target = &snapshot.final_path;
            if target.exists() && !target.is_file() {
                return Err(PipelineError::IoError(format!(
                    "cannot replace {}: not a regular file",
                    target.display()
                )));
            }
        }

        let mut swap = Swap::default();
        if let Err(e) = swap.install(&pending) {
            warn!("Snapshot commit failed, restoring previous snapshot: {}", e);
            swap.rollback();
            return Err(e);
        }
        swap.discard_backups();

        // Nothing left for Drop to clean up
        self.staged.clear();
        self.report = None;

        let committed = pending
            .into_iter()
            .filter(|snapshot| snapshot.table != REPORT_NAME)
            .map(|snapshot| {
                info!(
                    "Replaced {} snapshot ({} rows) at {}",
                    snapshot.table,
                    snapshot.rows,
                    snapshot.final_path.display()
                );
                CommittedSnapshot {
                    table: snapshot.table,
                    rows: snapshot.rows,
                    path: snapshot.final_path,
                }
            })
            .collect();
        Ok(committed)
    }
}

/// Renames done by one commit, so they can be undone
#[derive(Default)]
struct Swap {
    /// (target, backup) for every snapshot moved aside
    backups: Vec<(PathBuf, PathBuf)>,
    installed: Vec<PathBuf>,
}

impl Swap {
    fn install(&mut self, pending: &[StagedSnapshot]) -> Result<()> {
        for snapshot in pending {
            let target = &snapshot.final_path;
            if target.exists() {
                let backup = backup_path_for(target);
                fs::rename(target, &backup).map_err(|e| {
                    PipelineError::IoError(format!(
                        "cannot move aside {}: {}",
                        target.display(),
                        e
                    ))
                })?;
                self.backups.push((target.clone(), backup));
            }
        }

        for snapshot in pending {
            fs::rename(&snapshot.temp_path, &snapshot.final_path).map_err(|e| {
                PipelineError::IoError(format!(
                    "cannot replace {}: {}",
                    snapshot.final_path.display(),
                    e
                ))
            })?;
            self.installed.push(snapshot.final_path.clone());
            debug!("Installed {}", snapshot.final_path.display());
        }
        Ok(())
    }

    fn rollback(&self) {
        for path in &self.installed {
            if let Err(e) = fs::remove_file(path) {
                warn!("Could not remove partial {}: {}", path.display(), e);
            }
        }
        for (target, backup) in &self.backups {
            if let Err(e) = fs::rename(backup, target) {
                warn!(
                    "Could not restore {} from {}: {}",
                    target.display(),
                    backup.display(),
                    e
                );
            }
        }
    }

    fn discard_backups(&self) {
        for (_, backup) in &self.backups {
            if let Err(e) = fs::remove_file(backup) {
                warn!("Could not remove {}: {}", backup.display(), e);
            }
        }
    }
}

impl Drop for SnapshotWriter {
    fn drop(&mut self) {
        for snapshot in self.staged.iter().chain(self.report.iter()) {
            match fs::remove_file(&snapshot.temp_path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(
                    "Could not remove uncommitted {}: {}",
                    snapshot.temp_path.display(),
                    e
                ),
            }
        }
    }
}

/// Read a snapshot back into record batches
pub fn read_snapshot(path: &Path) -> Result<Vec<RecordBatch>> {
    let file = fs::File::open(path)
        .map_err(|e| PipelineError::IoError(format!("cannot open {}: {}", path.display(), e)))?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
    let batches = reader.collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(batches)
}
