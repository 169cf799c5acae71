//! Configuration for the GreenGrocer pipeline
//!
//! Loaded from environment variables (a `.env` file is honored when present)
//! or from a properties map using the lower-case key variants.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::debug;

use crate::error::PipelineError;
use crate::types::{RecencyPolicy, DEFAULT_RECENCY_POLICY};

/// What to do when record errors are collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Exclude bad records, report them, and finish the run
    #[default]
    Collect,
    /// Fail the run if any record error was collected
    Strict,
}

impl fmt::Display for ErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorPolicy::Collect => f.write_str("collect"),
            ErrorPolicy::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for ErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "collect" | "report" => Ok(ErrorPolicy::Collect),
            "strict" | "fail" => Ok(ErrorPolicy::Strict),
            other => Err(format!("unknown error policy: {}", other)),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    /// Directory holding raw sales CSV exports
    pub sales_dir: PathBuf,
    /// Directory holding raw inventory delivery CSV exports
    pub inventory_dir: PathBuf,
    /// Directory the snapshot tables and quality report are written to
    pub output_dir: PathBuf,
    /// DuckDB database file to load snapshots into (skipped when unset)
    pub duckdb_path: Option<PathBuf>,
    /// Which duplicate survives in staging and the product dimension
    pub recency_policy: RecencyPolicy,
    /// Record error handling
    pub error_policy: ErrorPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sales_dir: PathBuf::from("data/raw_sales"),
            inventory_dir: PathBuf::from("data/inventory"),
            output_dir: PathBuf::from("data/marts"),
            duckdb_path: None,
            recency_policy: DEFAULT_RECENCY_POLICY,
            error_policy: ErrorPolicy::Collect,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables
    ///
    /// - GREENGROCER_SALES_DIR, GREENGROCER_INVENTORY_DIR, GREENGROCER_OUTPUT_DIR
    /// - GREENGROCER_DUCKDB_PATH
    /// - GREENGROCER_RECENCY_POLICY (`latest` | `earliest`)
    /// - GREENGROCER_ERROR_POLICY (`collect` | `strict`)
    pub fn from_env() -> Result<Self, PipelineError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        let props: HashMap<String, String> = env::vars()
            .filter(|(key, _)| key.starts_with("GREENGROCER_"))
            .collect();
        debug!(
            "Loaded {} GREENGROCER_* variables: {:?}",
            props.len(),
            props.keys().collect::<Vec<_>>()
        );
        Self::from_properties(&props)
    }

    /// Load configuration from a properties map
    ///
    /// Accepts both `greengrocer_sales_dir` and `GREENGROCER_SALES_DIR` style keys.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self, PipelineError> {
        fn lookup<'a>(props: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
            props
                .get(key)
                .or_else(|| props.get(&key.to_ascii_uppercase()))
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        }

        let defaults = Self::default();

        let recency_policy = match lookup(props, "greengrocer_recency_policy") {
            Some(value) => value.parse().map_err(PipelineError::ConfigError)?,
            None => defaults.recency_policy,
        };
        let error_policy = match lookup(props, "greengrocer_error_policy") {
            Some(value) => value.parse().map_err(PipelineError::ConfigError)?,
            None => defaults.error_policy,
        };

        let config = Self {
            sales_dir: lookup(props, "greengrocer_sales_dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.sales_dir),
            inventory_dir: lookup(props, "greengrocer_inventory_dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.inventory_dir),
            output_dir: lookup(props, "greengrocer_output_dir")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            duckdb_path: lookup(props, "greengrocer_duckdb_path").map(PathBuf::from),
            recency_policy,
            error_policy,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (name, dir) in [
            ("sales_dir", &self.sales_dir),
            ("inventory_dir", &self.inventory_dir),
            ("output_dir", &self.output_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(PipelineError::ConfigError(format!(
                    "{} cannot be empty",
                    name
                )));
            }
        }

        if self.output_dir == self.sales_dir || self.output_dir == self.inventory_dir {
            return Err(PipelineError::ConfigError(format!(
                "output_dir {} must differ from the input directories",
                self.output_dir.display()
            )));
        }

        Ok(())
    }

    /// Path of the parquet snapshot for a table
    pub fn snapshot_path(&self, table: &str) -> PathBuf {
        self.output_dir.join(format!("{}.parquet", table))
    }

    /// Path of the quality report
    pub fn quality_report_path(&self) -> PathBuf {
        self.output_dir.join("quality_report.json")
    }
}
