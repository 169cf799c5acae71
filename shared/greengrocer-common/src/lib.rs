//! GreenGrocer Common Library
//!
//! Shared record types, Arrow schemas, configuration, and error types for the
//! GreenGrocer transform pipeline. Raw sales and inventory exports are read as
//! untyped text (bronze), cleaned into typed staging tables, and joined against
//! a derived product dimension to produce the reporting marts.

pub mod config;
pub mod ddl;
pub mod error;
pub mod quality;
pub mod schemas;
pub mod types;

// Re-export commonly used types
pub use config::{ErrorPolicy, PipelineConfig};
pub use ddl::{
    arrow_type_to_duckdb, field_to_column_def, generate_create_table_ddl, generate_drop_table_ddl,
    generate_load_from_parquet,
};
pub use error::{PipelineError, RecordErrorKind};
pub use quality::{DataQualityReport, DatasetStats, RecordError};
pub use schemas::{
    dim_products_schema, get_all_table_names, get_natural_key_for_table, get_schema_for_table,
    mart_inventory_schema, mart_sales_schema, stg_inventory_schema, stg_sales_schema,
    DIM_PRODUCTS_TABLE, MART_INVENTORY_TABLE, MART_SALES_TABLE, MONEY_PRECISION, MONEY_SCALE,
    STG_INVENTORY_TABLE, STG_SALES_TABLE,
};
pub use types::*;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;
