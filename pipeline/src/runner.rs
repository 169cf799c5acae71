//! Pipeline runner
//!
//! Composes one run: read both datasets, type and deduplicate them, derive the
//! product dimension, build the marts, then replace every snapshot together.
//! Blocking file and DuckDB work runs on the blocking thread pool; the sales
//! and inventory branches are independent and run concurrently.

use greengrocer_common::{
    CleanedDelivery, CleanedSale, DataQualityReport, Dataset, EnrichedDelivery, EnrichedSale,
    ErrorPolicy, PipelineConfig, PipelineError, ProductDimension, RawDelivery, RawSale,
    RecencyPolicy, Result,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::dimension::{derive_products, ProductReference};
use crate::ingest::{read_dataset, Ingested};
use crate::marts::{enrich_deliveries, enrich_sales};
use crate::snapshot::{CommittedSnapshot, SnapshotWriter};
use crate::staging::{stage_deliveries, stage_sales, type_deliveries, type_sales, Staged};
use crate::warehouse::WarehouseLoader;

/// Outcome of a successful run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: String,
    pub tables: Vec<CommittedSnapshot>,
    pub report: DataQualityReport,
    /// DuckDB file the snapshots were loaded into, if configured
    pub warehouse: Option<PathBuf>,
}

impl RunSummary {
    /// Rows written for a table
    pub fn rows(&self, table: &str) -> Option<usize> {
        self.tables
            .iter()
            .find(|snapshot| snapshot.table == table)
            .map(|snapshot| snapshot.rows)
    }
}

/// Cleaned sales plus the dimension derived from them
struct SalesBranch {
    rows_read: u64,
    staged: Staged<CleanedSale>,
    products: Vec<ProductDimension>,
}

struct InventoryBranch {
    rows_read: u64,
    staged: Staged<CleanedDelivery>,
}

fn clean_sales_branch(ingested: Ingested<RawSale>, policy: RecencyPolicy) -> SalesBranch {
    let mut typed = type_sales(&ingested.records);
    // The dimension sees every well-formed sale, duplicates included
    let products = derive_products(&typed.rows, policy);

    let mut errors = ingested.errors;
    errors.append(&mut typed.errors);
    typed.errors = errors;

    SalesBranch {
        rows_read: ingested.rows_read,
        staged: stage_sales(typed, policy),
        products,
    }
}

fn clean_inventory_branch(
    ingested: Ingested<RawDelivery>,
    policy: RecencyPolicy,
) -> InventoryBranch {
    let mut typed = type_deliveries(&ingested.records);

    let mut errors = ingested.errors;
    errors.append(&mut typed.errors);
    typed.errors = errors;

    InventoryBranch {
        rows_read: ingested.rows_read,
        staged: stage_deliveries(typed, policy),
    }
}

fn record_staging<T>(
    report: &mut DataQualityReport,
    dataset: Dataset,
    rows_read: u64,
    staged: &mut Staged<T>,
) {
    report.extend(std::mem::take(&mut staged.errors));
    let stats = report.stats_mut(dataset);
    stats.rows_read = rows_read;
    stats.duplicates_dropped = staged.duplicates_dropped as u64;
    stats.rows_cleaned = staged.rows.len() as u64;
}

/// Run a blocking closure on the blocking pool
async fn blocking<T, F>(task: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::InternalError(format!("{} task failed: {}", task, e)))?
}

/// Every table produced by one run, in memory
pub struct Tables {
    pub stg_sales: Vec<CleanedSale>,
    pub stg_inventory: Vec<CleanedDelivery>,
    pub dim_products: Vec<ProductDimension>,
    pub mart_sales: Vec<EnrichedSale>,
    pub mart_inventory: Vec<EnrichedDelivery>,
}

/// Write every table and the report, replacing the previous snapshot
pub fn write_snapshots(
    config: &PipelineConfig,
    tables: &Tables,
    report: &DataQualityReport,
) -> Result<Vec<CommittedSnapshot>> {
    let mut writer = SnapshotWriter::new(config)?;
    writer.stage(&tables.stg_sales)?;
    writer.stage(&tables.stg_inventory)?;
    writer.stage(&tables.dim_products)?;
    writer.stage(&tables.mart_sales)?;
    writer.stage(&tables.mart_inventory)?;
    writer.stage_report(report)?;
    writer.commit()
}

/// Runs the transform described by a [`PipelineConfig`]
pub struct PipelineRunner {
    config: Arc<PipelineConfig>,
}

impl PipelineRunner {
    /// Create a runner; the configuration is validated first
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute one full run
    #[instrument(skip(self), fields(
        sales_dir = %self.config.sales_dir.display(),
        inventory_dir = %self.config.inventory_dir.display(),
        output_dir = %self.config.output_dir.display(),
    ))]
    pub async fn run(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let policy = self.config.recency_policy;
        info!(
            "Starting run {} (recency={}, errors={})",
            run_id, policy, self.config.error_policy
        );

        // Bronze intake
        let sales_dir = self.config.sales_dir.clone();
        let inventory_dir = self.config.inventory_dir.clone();
        let (sales, inventory) = tokio::try_join!(
            blocking("read sales", move || read_dataset::<RawSale>(&sales_dir)),
            blocking("read inventory", move || {
                read_dataset::<RawDelivery>(&inventory_dir)
            }),
        )?;

        // Staging and dimension
        let (mut sales, mut inventory) = tokio::try_join!(
            blocking("clean sales", move || Ok(clean_sales_branch(sales, policy))),
            blocking("clean inventory", move || {
                Ok(clean_inventory_branch(inventory, policy))
            }),
        )?;

        let mut report = DataQualityReport::new(run_id.clone());
        record_staging(&mut report, Dataset::Sales, sales.rows_read, &mut sales.staged);
        record_staging(
            &mut report,
            Dataset::Inventory,
            inventory.rows_read,
            &mut inventory.staged,
        );

        if report.has_errors() {
            warn!("Run {} collected {} record errors", run_id, report.error_count());
            if self.config.error_policy == ErrorPolicy::Strict {
                return Err(PipelineError::DataQuality(Box::new(report)));
            }
        }

        // Marts
        let reference = Arc::new(ProductReference::new(&sales.products));
        let stg_sales = sales.staged.rows;
        let stg_inventory = inventory.staged.rows;
        let (mart_sales, mart_inventory) = tokio::try_join!(
            blocking("enrich sales", {
                let reference = Arc::clone(&reference);
                let rows = stg_sales.clone();
                move || Ok(enrich_sales(rows, &reference))
            }),
            blocking("enrich inventory", {
                let reference = Arc::clone(&reference);
                let rows = stg_inventory.clone();
                move || Ok(enrich_deliveries(rows, &reference))
            }),
        )?;
        report.stats_mut(Dataset::Sales).reference_misses = mart_sales.reference_misses as u64;
        report.stats_mut(Dataset::Inventory).reference_misses =
            mart_inventory.reference_misses as u64;

        let tables = Tables {
            stg_sales,
            stg_inventory,
            dim_products: sales.products,
            mart_sales: mart_sales.rows,
            mart_inventory: mart_inventory.rows,
        };

        // Snapshot replace
        let config = Arc::clone(&self.config);
        let report_for_writer = report.clone();
        let tables_written = blocking("write snapshots", move || {
            write_snapshots(&config, &tables, &report_for_writer)
        })
        .await?;

        // Warehouse
        let warehouse = match self.config.duckdb_path.clone() {
            Some(path) => {
                let snapshots = tables_written.clone();
                let db_path = path.clone();
                blocking("warehouse load", move || {
                    WarehouseLoader::open(&db_path)?.load(&snapshots)
                })
                .await?;
                Some(path)
            }
            None => None,
        };

        info!(
            "Run {} complete: {} tables written, {} record errors",
            run_id,
            tables_written.len(),
            report.error_count()
        );

        Ok(RunSummary {
            run_id,
            tables: tables_written,
            report,
            warehouse,
        })
    }
}
