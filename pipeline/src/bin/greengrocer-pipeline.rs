//! GreenGrocer pipeline binary entry point
//!
//! Runs one transform over the configured export directories and exits.
//! Configuration comes from GREENGROCER_* environment variables (or `.env`).

use anyhow::{Context, Result};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use greengrocer_pipeline::{Dataset, PipelineConfig, PipelineError, PipelineRunner};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("greengrocer_pipeline=info".parse()?)
                .add_directive("greengrocer_common=info".parse()?)
                .add_directive("duckdb=warn".parse()?),
        )
        .init();

    info!("GreenGrocer pipeline v{}", env!("CARGO_PKG_VERSION"));

    let config = PipelineConfig::from_env().context("Failed to load pipeline configuration")?;
    info!(
        "[MAIN] sales={} inventory={} output={} warehouse={} recency={} errors={}",
        config.sales_dir.display(),
        config.inventory_dir.display(),
        config.output_dir.display(),
        config
            .duckdb_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string()),
        config.recency_policy,
        config.error_policy
    );

    let runner = PipelineRunner::new(config).context("Invalid pipeline configuration")?;

    let summary = match runner.run().await {
        Ok(summary) => summary,
        Err(PipelineError::DataQuality(report)) => {
            for issue in report.errors.iter().take(20) {
                warn!("[MAIN] {}", serde_json::to_string(issue)?);
            }
            error!(
                "[MAIN] Strict mode: {} record errors, snapshots left unchanged",
                report.error_count()
            );
            return Err(PipelineError::DataQuality(report)).context("Pipeline run rejected");
        }
        Err(e) => return Err(e).context("Pipeline run failed"),
    };

    for table in &summary.tables {
        info!(
            "[MAIN] {:<15} {:>8} rows  {}",
            table.table,
            table.rows,
            table.path.display()
        );
    }
    for dataset in [Dataset::Sales, Dataset::Inventory] {
        let stats = summary.report.stats(dataset);
        info!(
            "[MAIN] {}: read={} rejected={} duplicates={} cleaned={} reference_misses={}",
            dataset,
            stats.rows_read,
            stats.rows_rejected,
            stats.duplicates_dropped,
            stats.rows_cleaned,
            stats.reference_misses
        );
    }
    if let Some(path) = &summary.warehouse {
        info!("[MAIN] Warehouse loaded at {}", path.display());
    }
    info!("[MAIN] Run {} complete", summary.run_id);
    Ok(())
}
