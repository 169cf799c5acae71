//! Arrow schemas for the snapshot tables
//!
//! Staging tables hold cleaned records, `dim_products` the derived product
//! reference, and the marts the enriched records consumed by reporting.
//! Money is fixed-point `DECIMAL(12, 2)`, timestamps are microsecond precision
//! without time zone, dates are `Date32`.

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use std::sync::Arc;

/// Cleaned sales, one row per transaction_id
pub const STG_SALES_TABLE: &str = "stg_sales";
/// Cleaned deliveries, one row per delivery_id
pub const STG_INVENTORY_TABLE: &str = "stg_inventory";
/// Product reference, one row per product_id
pub const DIM_PRODUCTS_TABLE: &str = "dim_products";
/// Cleaned sales enriched with the dimension name
pub const MART_SALES_TABLE: &str = "mart_sales";
/// Cleaned deliveries enriched with the dimension name
pub const MART_INVENTORY_TABLE: &str = "mart_inventory";

/// Decimal precision for money columns
pub const MONEY_PRECISION: u8 = 12;
/// Fractional digits for money columns
pub const MONEY_SCALE: i8 = 2;

fn money() -> DataType {
    DataType::Decimal128(MONEY_PRECISION, MONEY_SCALE)
}

fn timestamp() -> DataType {
    DataType::Timestamp(TimeUnit::Microsecond, None)
}

fn sale_fields() -> Vec<Field> {
    vec![
        Field::new("transaction_id", DataType::Utf8, false),
        Field::new("store_id", DataType::Utf8, true),
        Field::new("transaction_timestamp", timestamp(), false),
        Field::new("product_id", DataType::Utf8, false),
        Field::new("quantity", DataType::Int64, false),
        Field::new("unit_price", money(), false),
        Field::new("total_amount", money(), false),
    ]
}

fn delivery_fields() -> Vec<Field> {
    vec![
        Field::new("delivery_id", DataType::Utf8, false),
        Field::new("delivery_date", DataType::Date32, false),
        Field::new("store_id", DataType::Utf8, false),
        Field::new("product_id", DataType::Utf8, false),
        Field::new("quantity_delivered", DataType::Int64, false),
        Field::new("delivery_status", DataType::Utf8, true),
    ]
}

/// Arrow schema for `stg_sales`
pub fn stg_sales_schema() -> Arc<Schema> {
    let mut fields = sale_fields();
    // Name as printed on the receipt, kept next to product_id
    fields.insert(4, Field::new("product_name", DataType::Utf8, true));
    Arc::new(Schema::new(fields))
}

/// Arrow schema for `stg_inventory`
pub fn stg_inventory_schema() -> Arc<Schema> {
    Arc::new(Schema::new(delivery_fields()))
}

/// Arrow schema for `dim_products`
pub fn dim_products_schema() -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("product_id", DataType::Utf8, false),
        Field::new("product_name", DataType::Utf8, true),
        Field::new("current_price", money(), false),
        Field::new("price_observed_at", timestamp(), false),
    ]))
}

/// Arrow schema for `mart_sales`
///
/// `product_name` comes from the dimension and is null on a reference miss;
/// `sold_product_name` is the name printed on the transaction.
pub fn mart_sales_schema() -> Arc<Schema> {
    let mut fields = sale_fields();
    fields.insert(4, Field::new("product_name", DataType::Utf8, true));
    fields.insert(5, Field::new("sold_product_name", DataType::Utf8, true));
    Arc::new(Schema::new(fields))
}

/// Arrow schema for `mart_inventory`
pub fn mart_inventory_schema() -> Arc<Schema> {
    let mut fields = delivery_fields();
    fields.insert(4, Field::new("product_name", DataType::Utf8, true));
    Arc::new(Schema::new(fields))
}

/// All snapshot tables in dependency order
pub fn get_all_table_names() -> Vec<&'static str> {
    vec![
        STG_SALES_TABLE,
        STG_INVENTORY_TABLE,
        DIM_PRODUCTS_TABLE,
        MART_SALES_TABLE,
        MART_INVENTORY_TABLE,
    ]
}

/// Get schema for a table by name
pub fn get_schema_for_table(table: &str) -> Option<Arc<Schema>> {
    match table {
        STG_SALES_TABLE => Some(stg_sales_schema()),
        STG_INVENTORY_TABLE => Some(stg_inventory_schema()),
        DIM_PRODUCTS_TABLE => Some(dim_products_schema()),
        MART_SALES_TABLE => Some(mart_sales_schema()),
        MART_INVENTORY_TABLE => Some(mart_inventory_schema()),
        _ => None,
    }
}

/// Natural key column for a table
pub fn get_natural_key_for_table(table: &str) -> Option<&'static str> {
    match table {
        STG_SALES_TABLE | MART_SALES_TABLE => Some("transaction_id"),
        STG_INVENTORY_TABLE | MART_INVENTORY_TABLE => Some("delivery_id"),
        DIM_PRODUCTS_TABLE => Some("product_id"),
        _ => None,
    }
}
