//! End-to-end runs over CSV fixtures written to a temporary directory

use arrow::array::{Array, Decimal128Array, Int64Array, StringArray};
use arrow::record_batch::RecordBatch;
use greengrocer_common::{
    DIM_PRODUCTS_TABLE, MART_INVENTORY_TABLE, MART_SALES_TABLE, STG_INVENTORY_TABLE,
    STG_SALES_TABLE,
};
use greengrocer_pipeline::{
    get_all_table_names, read_snapshot, Dataset, ErrorPolicy, PipelineConfig, PipelineError,
    PipelineRunner, RecencyPolicy, Result, RunSummary, WarehouseLoader,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const SALES_JANUARY: &str = "\
transaction_id,store_id,transaction_timestamp,product_id,product_name,quantity,unit_price,total_amount
T1,STORE_001,2024-01-01 09:00:00,P1,Lait Entier,2,1.20,2.40
T2,STORE_001,2024-01-01 10:00:00,P2,Pain,1,3.5,3.50
T1,STORE_001,2024-01-02 09:00:00,P1,Lait,3,1.30,3.90
T3,STORE_002,2024-01-02 11:00:00,P2,Pain,12.5,3.50,43.75
";

// Older export layout with renamed columns and one truncated row
const SALES_LEGACY: &str = "\
tx_id,store_id,date,prod_id,product_name,qty,price,total
T4,STORE_002,2024-01-03,P3,Pommes,12.0,0.80,9.60
T5,STORE_002,2024-01-03,P1,Lait,1,1.30
";

const DELIVERIES: &str = "\
delivery_id,delivery_date,store_id,product_id,product_name,quantity_delivered,status
D1,2024-01-01,STORE_001,P1,Lait,40,Received
D2,2024-01-02,STORE_001,P9,Mystery,10,Pending
D1,2024-01-03,STORE_001,P1,Lait,45,Received
";

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("raw_sales")).unwrap();
        fs::create_dir_all(dir.path().join("inventory")).unwrap();
        Self { dir }
    }

    fn standard() -> Self {
        let fixture = Self::new();
        fixture.sales_file("sales_2024_01.csv", SALES_JANUARY);
        fixture.sales_file("sales_legacy.csv", SALES_LEGACY);
        fixture.inventory_file("deliveries.csv", DELIVERIES);
        fixture
    }

    fn sales_file(&self, name: &str, contents: &str) {
        fs::write(self.dir.path().join("raw_sales").join(name), contents).unwrap();
    }

    fn inventory_file(&self, name: &str, contents: &str) {
        fs::write(self.dir.path().join("inventory").join(name), contents).unwrap();
    }

    fn config(&self) -> PipelineConfig {
        PipelineConfig {
            sales_dir: self.dir.path().join("raw_sales"),
            inventory_dir: self.dir.path().join("inventory"),
            output_dir: self.dir.path().join("marts"),
            ..Default::default()
        }
    }

    fn table(&self, table: &str) -> RecordBatch {
        let path = self.config().snapshot_path(table);
        let batches = read_snapshot(&path).unwrap();
        arrow::compute::concat_batches(&batches[0].schema(), &batches).unwrap()
    }
}

fn strings(batch: &RecordBatch, column: &str) -> Vec<Option<String>> {
    let array = batch
        .column_by_name(column)
        .unwrap()
        .as_any()
        .downcast_ref::<StringArray>()
        .unwrap();
    (0..array.len())
        .map(|i| (!array.is_null(i)).then(|| array.value(i).to_string()))
        .collect()
}

fn ints(batch: &RecordBatch, column: &str) -> Vec<i64> {
    let array = batch
        .column_by_name(column)
        .unwrap()
        .as_any()
        .downcast_ref::<Int64Array>()
        .unwrap();
    array.values().to_vec()
}

fn money(batch: &RecordBatch, column: &str) -> Vec<String> {
    let array = batch
        .column_by_name(column)
        .unwrap()
        .as_any()
        .downcast_ref::<Decimal128Array>()
        .unwrap();
    (0..array.len()).map(|i| array.value_as_string(i)).collect()
}

fn some(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|v| Some(v.to_string())).collect()
}

async fn run(config: PipelineConfig) -> Result<RunSummary> {
    PipelineRunner::new(config)?.run().await
}

#[tokio::test]
async fn test_end_to_end_tables() {
    let fixture = Fixture::standard();

    let summary = run(fixture.config()).await.unwrap();

    assert_eq!(summary.rows(STG_SALES_TABLE), Some(3));
    assert_eq!(summary.rows(STG_INVENTORY_TABLE), Some(2));
    assert_eq!(summary.rows(DIM_PRODUCTS_TABLE), Some(3));
    assert_eq!(summary.rows(MART_SALES_TABLE), Some(3));
    assert_eq!(summary.rows(MART_INVENTORY_TABLE), Some(2));

    let stg_sales = fixture.table(STG_SALES_TABLE);
    assert_eq!(strings(&stg_sales, "transaction_id"), some(&["T1", "T2", "T4"]));
    // Latest T1 resubmission wins
    assert_eq!(ints(&stg_sales, "quantity"), vec![3, 1, 12]);
    assert_eq!(money(&stg_sales, "unit_price"), vec!["1.30", "3.50", "0.80"]);

    let products = fixture.table(DIM_PRODUCTS_TABLE);
    assert_eq!(strings(&products, "product_id"), some(&["P1", "P2", "P3"]));
    assert_eq!(strings(&products, "product_name"), some(&["Lait", "Pain", "Pommes"]));
    assert_eq!(money(&products, "current_price"), vec!["1.30", "3.50", "0.80"]);

    let stg_inventory = fixture.table(STG_INVENTORY_TABLE);
    assert_eq!(strings(&stg_inventory, "delivery_id"), some(&["D1", "D2"]));
    assert_eq!(ints(&stg_inventory, "quantity_delivered"), vec![45, 10]);
    assert_eq!(
        strings(&stg_inventory, "delivery_status"),
        some(&["Received", "Pending"])
    );
}

#[tokio::test]
async fn test_marts_keep_every_cleaned_row() {
    let fixture = Fixture::standard();

    run(fixture.config()).await.unwrap();

    let stg_sales = fixture.table(STG_SALES_TABLE);
    let mart_sales = fixture.table(MART_SALES_TABLE);
    assert_eq!(mart_sales.num_rows(), stg_sales.num_rows());
    assert_eq!(
        strings(&mart_sales, "transaction_id"),
        strings(&stg_sales, "transaction_id")
    );
    assert_eq!(strings(&mart_sales, "product_name"), some(&["Lait", "Pain", "Pommes"]));
    assert_eq!(
        strings(&mart_sales, "sold_product_name"),
        some(&["Lait", "Pain", "Pommes"])
    );

    let mart_inventory = fixture.table(MART_INVENTORY_TABLE);
    assert_eq!(mart_inventory.num_rows(), 2);
    // P9 was never sold: no dimension row, delivery kept with a null name
    assert_eq!(
        strings(&mart_inventory, "product_name"),
        vec![Some("Lait".to_string()), None]
    );
    assert_eq!(strings(&mart_inventory, "product_id"), some(&["P1", "P9"]));
}

#[tokio::test]
async fn test_quality_report_counts() {
    let fixture = Fixture::standard();

    let summary = run(fixture.config()).await.unwrap();

    let sales = summary.report.stats(Dataset::Sales);
    assert_eq!(sales.rows_read, 6);
    assert_eq!(sales.rows_rejected, 2);
    assert_eq!(sales.duplicates_dropped, 1);
    assert_eq!(sales.rows_cleaned, 3);
    assert_eq!(sales.reference_misses, 0);

    let inventory = summary.report.stats(Dataset::Inventory);
    assert_eq!(inventory.rows_read, 3);
    assert_eq!(inventory.rows_rejected, 0);
    assert_eq!(inventory.duplicates_dropped, 1);
    assert_eq!(inventory.rows_cleaned, 2);
    assert_eq!(inventory.reference_misses, 1);

    let written = fs::read_to_string(fixture.config().quality_report_path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&written).unwrap();
    assert_eq!(json["run_id"], summary.run_id.as_str());
    let kinds: HashSet<String> = json["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["kind"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        kinds,
        ["parse", "malformed_row"]
            .iter()
            .map(|k| k.to_string())
            .collect::<HashSet<_>>()
    );
    let parse = json["errors"]
        .as_array()
        .unwrap()
        .iter()
        .find(|e| e["kind"] == "parse")
        .unwrap();
    assert_eq!(parse["natural_key"], "T3");
    assert_eq!(parse["field"], "quantity");
    assert_eq!(parse["value"], "12.5");
}

#[tokio::test]
async fn test_rerun_is_byte_identical() {
    let fixture = Fixture::standard();
    let config = fixture.config();

    run(config.clone()).await.unwrap();
    let first: Vec<Vec<u8>> = get_all_table_names()
        .into_iter()
        .map(|table| fs::read(config.snapshot_path(table)).unwrap())
        .collect();

    run(config.clone()).await.unwrap();
    let second: Vec<Vec<u8>> = get_all_table_names()
        .into_iter()
        .map(|table| fs::read(config.snapshot_path(table)).unwrap())
        .collect();

    assert_eq!(first, second);
}

#[tokio::test]
async fn test_earliest_policy_keeps_first_submission() {
    let fixture = Fixture::standard();
    let config = PipelineConfig {
        recency_policy: RecencyPolicy::EarliestWins,
        ..fixture.config()
    };

    run(config).await.unwrap();

    let stg_sales = fixture.table(STG_SALES_TABLE);
    assert_eq!(ints(&stg_sales, "quantity"), vec![2, 1, 12]);
    let products = fixture.table(DIM_PRODUCTS_TABLE);
    assert_eq!(
        strings(&products, "product_name"),
        some(&["Lait Entier", "Pain", "Pommes"])
    );
    let stg_inventory = fixture.table(STG_INVENTORY_TABLE);
    assert_eq!(ints(&stg_inventory, "quantity_delivered"), vec![40, 10]);
}

#[tokio::test]
async fn test_strict_mode_leaves_previous_snapshot() {
    let fixture = Fixture::new();
    fixture.sales_file(
        "sales.csv",
        "transaction_id,store_id,transaction_timestamp,product_id,product_name,quantity,unit_price,total_amount\n\
         T1,STORE_001,2024-01-01,P1,Lait,1,1.20,1.20\n",
    );
    fixture.inventory_file("deliveries.csv", DELIVERIES);
    let config = PipelineConfig {
        error_policy: ErrorPolicy::Strict,
        ..fixture.config()
    };

    run(config.clone()).await.unwrap();
    let snapshot_before = fs::read(config.snapshot_path(STG_SALES_TABLE)).unwrap();
    let report_before = fs::read(config.quality_report_path()).unwrap();

    fixture.sales_file("sales_bad.csv", SALES_JANUARY);
    let err = run(config.clone()).await.unwrap_err();

    match err {
        PipelineError::DataQuality(report) => {
            assert_eq!(report.error_count(), 1);
            assert_eq!(report.errors[0].natural_key.as_deref(), Some("T3"));
        }
        other => panic!("expected a data quality failure, got {}", other),
    }
    assert_eq!(
        fs::read(config.snapshot_path(STG_SALES_TABLE)).unwrap(),
        snapshot_before
    );
    assert_eq!(fs::read(config.quality_report_path()).unwrap(), report_before);
}

#[tokio::test]
async fn test_blocked_snapshot_target_keeps_previous_run() {
    let fixture = Fixture::standard();
    let config = fixture.config();
    run(config.clone()).await.unwrap();
    let before: Vec<Vec<u8>> = [STG_SALES_TABLE, MART_SALES_TABLE]
        .iter()
        .map(|table| fs::read(config.snapshot_path(table)).unwrap())
        .collect();

    let blocked = config.snapshot_path(DIM_PRODUCTS_TABLE);
    fs::remove_file(&blocked).unwrap();
    fs::create_dir(&blocked).unwrap();
    fs::write(blocked.join("keep"), b"x").unwrap();
    fixture.sales_file(
        "sales_2024_02.csv",
        "transaction_id,store_id,transaction_timestamp,product_id,product_name,quantity,unit_price,total_amount\n\
         T9,STORE_003,2024-02-01,P4,Oeufs,6,0.30,1.80\n",
    );

    let err = run(config.clone()).await.unwrap_err();
    assert!(matches!(err, PipelineError::IoError(_)), "{}", err);

    let after: Vec<Vec<u8>> = [STG_SALES_TABLE, MART_SALES_TABLE]
        .iter()
        .map(|table| fs::read(config.snapshot_path(table)).unwrap())
        .collect();
    assert_eq!(before, after);
    let leftovers: Vec<String> = fs::read_dir(&config.output_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".tmp") || name.ends_with(".bak"))
        .collect();
    assert!(leftovers.is_empty(), "{:?}", leftovers);
}

#[tokio::test]
async fn test_empty_exports_write_empty_tables() {
    let fixture = Fixture::new();

    let summary = run(fixture.config()).await.unwrap();

    for table in get_all_table_names() {
        assert_eq!(summary.rows(table), Some(0), "table {}", table);
        assert!(fixture.config().snapshot_path(table).exists());
    }
}

#[tokio::test]
async fn test_missing_input_directory_fails() {
    let fixture = Fixture::new();
    let config = PipelineConfig {
        sales_dir: fixture.dir.path().join("nope"),
        ..fixture.config()
    };

    let err = run(config.clone()).await.unwrap_err();

    assert!(matches!(err, PipelineError::IoError(_)), "{}", err);
    assert!(!Path::new(&config.output_dir).join("stg_sales.parquet").exists());
}

#[tokio::test]
async fn test_warehouse_load() {
    let fixture = Fixture::standard();
    let db_path = fixture.dir.path().join("warehouse").join("greengrocer.duckdb");
    let config = PipelineConfig {
        duckdb_path: Some(db_path.clone()),
        ..fixture.config()
    };

    let summary = run(config).await.unwrap();
    assert_eq!(summary.warehouse.as_deref(), Some(db_path.as_path()));

    let loader = WarehouseLoader::open(&db_path).unwrap();
    assert_eq!(loader.row_count(STG_SALES_TABLE).unwrap(), 3);
    assert_eq!(loader.row_count(DIM_PRODUCTS_TABLE).unwrap(), 3);
    assert_eq!(loader.row_count(MART_INVENTORY_TABLE).unwrap(), 2);

    let misses: i64 = loader
        .connection()
        .query_row(
            "SELECT COUNT(*) FROM mart_inventory WHERE product_name IS NULL",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(misses, 1);
}
