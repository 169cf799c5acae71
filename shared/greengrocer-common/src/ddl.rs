//! Arrow schema to DuckDB DDL conversion
//!
//! Warehouse tables are generated from the same Arrow schemas the snapshots
//! are written with, so the two cannot drift apart.

use arrow_schema::{DataType, Field, Schema, TimeUnit};

/// Convert Arrow DataType to DuckDB SQL type string
pub fn arrow_type_to_duckdb(data_type: &DataType) -> String {
    match data_type {
        DataType::Utf8 | DataType::LargeUtf8 => "VARCHAR".to_string(),

        DataType::Int32 => "INTEGER".to_string(),
        DataType::Int64 => "BIGINT".to_string(),

        DataType::Date32 | DataType::Date64 => "DATE".to_string(),
        DataType::Timestamp(unit, tz) => {
            let base = match unit {
                TimeUnit::Second => "TIMESTAMP_S",
                TimeUnit::Millisecond => "TIMESTAMP_MS",
                TimeUnit::Microsecond => "TIMESTAMP",
                TimeUnit::Nanosecond => "TIMESTAMP_NS",
            };
            if tz.is_some() {
                format!("{} WITH TIME ZONE", base)
            } else {
                base.to_string()
            }
        }

        DataType::Decimal128(precision, scale) => {
            format!("DECIMAL({}, {})", precision, scale)
        }

        // Fallback for other types
        _ => "VARCHAR".to_string(),
    }
}

/// Quote an identifier for DuckDB
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal for DuckDB
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Convert Arrow Field to DuckDB column definition
pub fn field_to_column_def(field: &Field) -> String {
    let sql_type = arrow_type_to_duckdb(field.data_type());
    let nullable = if field.is_nullable() { "" } else { " NOT NULL" };
    format!("{} {}{}", quote_identifier(field.name()), sql_type, nullable)
}

/// Generate CREATE TABLE DDL from Arrow schema
///
/// `primary_key` adds a PRIMARY KEY constraint on that column, which DuckDB
/// enforces on insert.
pub fn generate_create_table_ddl(
    table_name: &str,
    schema: &Schema,
    primary_key: Option<&str>,
) -> String {
    let mut columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| field_to_column_def(f.as_ref()))
        .collect();

    if let Some(key) = primary_key {
        columns.push(format!("PRIMARY KEY ({})", quote_identifier(key)));
    }

    format!(
        "CREATE TABLE {} (\n    {}\n);",
        quote_identifier(table_name),
        columns.join(",\n    ")
    )
}

/// Generate DROP TABLE DDL
pub fn generate_drop_table_ddl(table_name: &str) -> String {
    format!("DROP TABLE IF EXISTS {};", quote_identifier(table_name))
}

/// Generate an INSERT that loads a parquet snapshot, columns in schema order
pub fn generate_load_from_parquet(table_name: &str, schema: &Schema, parquet_path: &str) -> String {
    let columns: Vec<String> = schema
        .fields()
        .iter()
        .map(|f| quote_identifier(f.name()))
        .collect();
    let columns = columns.join(", ");

    format!(
        "INSERT INTO {} ({}) SELECT {} FROM read_parquet({});",
        quote_identifier(table_name),
        columns,
        columns,
        quote_literal(parquet_path)
    )
}
