//! GreenGrocer Pipeline
//!
//! Batch transform over the raw store exports:
//! - Reads sales and inventory CSV exports as untyped text (bronze)
//! - Types and deduplicates them into `stg_sales` / `stg_inventory`
//! - Derives the `dim_products` reference from the sales stream
//! - Left-joins both staging tables against it into `mart_sales` / `mart_inventory`
//! - Replaces the Parquet snapshots (and optionally a DuckDB warehouse) per run
//!
//! Configuration via environment variables:
//! - GREENGROCER_SALES_DIR / GREENGROCER_INVENTORY_DIR: input directories
//! - GREENGROCER_OUTPUT_DIR: snapshot directory
//! - GREENGROCER_DUCKDB_PATH: optional warehouse file
//! - GREENGROCER_RECENCY_POLICY / GREENGROCER_ERROR_POLICY

pub mod coerce;
pub mod dimension;
pub mod ingest;
pub mod marts;
pub mod runner;
pub mod snapshot;
pub mod staging;
pub mod warehouse;

pub use dimension::{derive_products, ProductReference};
pub use ingest::{read_csv, read_dataset, Ingested};
pub use marts::{enrich_deliveries, enrich_sales, Enriched};
pub use runner::{write_snapshots, PipelineRunner, RunSummary, Tables};
pub use snapshot::{read_snapshot, CommittedSnapshot, SnapshotTable, SnapshotWriter};
pub use staging::{clean_deliveries, clean_sales, reduce_by_key, Reduced, Staged, Typed};
pub use warehouse::WarehouseLoader;

// Re-export common types
pub use greengrocer_common::{
    config::{ErrorPolicy, PipelineConfig},
    error::{PipelineError, RecordErrorKind},
    quality::{DataQualityReport, DatasetStats, RecordError},
    schemas::{get_all_table_names, get_schema_for_table},
    types::{Dataset, RecencyPolicy, DEFAULT_RECENCY_POLICY},
    Result,
};
