//! Optional DuckDB warehouse load
//!
//! Committed snapshots are loaded into a DuckDB database file so the marts
//! can be queried directly. Every table is dropped and recreated from its
//! Arrow schema inside a single transaction: readers see either the previous
//! load or the new one.

use duckdb::Connection;
use greengrocer_common::{
    generate_create_table_ddl, generate_drop_table_ddl, generate_load_from_parquet,
    get_natural_key_for_table, get_schema_for_table, PipelineError, Result,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

use crate::snapshot::CommittedSnapshot;

/// Loads committed snapshots into a DuckDB database
pub struct WarehouseLoader {
    path: PathBuf,
    conn: Connection,
}

impl WarehouseLoader {
    /// Open (or create) the database file
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path).map_err(|e| {
            warn!("Failed to open DuckDB database {}: {}", path.display(), e);
            PipelineError::DuckDBError(format!("Failed to open {}: {}", path.display(), e))
        })?;
        info!("Opened DuckDB warehouse at {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    /// Replace every snapshot's table in one transaction
    #[instrument(skip_all, fields(db = %self.path.display(), tables = snapshots.len()))]
    pub fn load(&self, snapshots: &[CommittedSnapshot]) -> Result<()> {
        let mut sql = String::from("BEGIN TRANSACTION;\n");
        for snapshot in snapshots {
            let schema = get_schema_for_table(&snapshot.table).ok_or_else(|| {
                PipelineError::InternalError(format!("no schema for table {}", snapshot.table))
            })?;
            let parquet_path = snapshot.path.to_string_lossy();

            sql.push_str(&generate_drop_table_ddl(&snapshot.table));
            sql.push('\n');
            sql.push_str(&generate_create_table_ddl(
                &snapshot.table,
                &schema,
                get_natural_key_for_table(&snapshot.table),
            ));
            sql.push('\n');
            sql.push_str(&generate_load_from_parquet(
                &snapshot.table,
                &schema,
                &parquet_path,
            ));
            sql.push('\n');
        }
        sql.push_str("COMMIT;");

        debug!("Warehouse load SQL:\n{}", sql);
        if let Err(e) = self.conn.execute_batch(&sql) {
            warn!("Warehouse load failed, rolling back: {}", e);
            // The batch stops at the failing statement, leaving the transaction open
            let _ = self.conn.execute_batch("ROLLBACK;");
            return Err(PipelineError::DuckDBError(format!(
                "Failed to load snapshots into {}: {}",
                self.path.display(),
                e
            )));
        }

        info!(
            "Loaded {} tables into {}",
            snapshots.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Row count of a loaded table
    pub fn row_count(&self, table: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM \"{}\";", table.replace('"', "\"\""));
        let count: i64 = self.conn.query_row(&sql, [], |row| row.get(0)).map_err(|e| {
            PipelineError::DuckDBError(format!("Failed to count rows in {}: {}", table, e))
        })?;
        Ok(count as u64)
    }

    /// Underlying connection, for ad-hoc queries
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::SnapshotWriter;
    use chrono::NaiveDate;
    use greengrocer_common::{PipelineConfig, ProductDimension, DIM_PRODUCTS_TABLE};
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn product(id: &str, price: &str) -> ProductDimension {
        ProductDimension {
            product_id: id.to_string(),
            product_name: Some(format!("Product {}", id)),
            current_price: Decimal::from_str(price).unwrap(),
            price_observed_at: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(8, 30, 0)
                .unwrap(),
        }
    }

    fn write_products(
        config: &PipelineConfig,
        rows: &[ProductDimension],
    ) -> Vec<CommittedSnapshot> {
        let mut writer = SnapshotWriter::new(config).unwrap();
        writer.stage(rows).unwrap();
        writer.commit().unwrap()
    }

    #[test]
    fn test_load_replaces_table() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().join("marts"),
            ..Default::default()
        };
        let loader = WarehouseLoader::open(&dir.path().join("warehouse.duckdb")).unwrap();

        let committed = write_products(&config, &[product("P1", "1.10"), product("P2", "2.20")]);
        loader.load(&committed).unwrap();
        assert_eq!(loader.row_count(DIM_PRODUCTS_TABLE).unwrap(), 2);

        let committed = write_products(&config, &[product("P3", "3.30")]);
        loader.load(&committed).unwrap();
        assert_eq!(loader.row_count(DIM_PRODUCTS_TABLE).unwrap(), 1);

        let price: String = loader
            .connection()
            .query_row(
                "SELECT CAST(current_price AS VARCHAR) FROM dim_products WHERE product_id = 'P3'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(price, "3.30");
    }

    #[test]
    fn test_failed_load_keeps_previous_tables() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().join("marts"),
            ..Default::default()
        };
        let loader = WarehouseLoader::open(&dir.path().join("warehouse.duckdb")).unwrap();
        let committed = write_products(&config, &[product("P1", "1.10")]);
        loader.load(&committed).unwrap();

        let missing = vec![CommittedSnapshot {
            table: DIM_PRODUCTS_TABLE.to_string(),
            rows: 0,
            path: dir.path().join("does-not-exist.parquet"),
        }];
        assert!(loader.load(&missing).is_err());
        assert_eq!(loader.row_count(DIM_PRODUCTS_TABLE).unwrap(), 1);
    }
}
