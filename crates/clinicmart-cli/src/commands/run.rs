use std::path::Path;

use anyhow::Result;
use chrono::Utc;
use clinicmart_engine::{run_all, ClinicmartConfig, RunReport};
use clinicmart_sources::SourceRegistry;
use clinicmart_warehouse::{MemoryWarehouse, PostgresWarehouse, Warehouse};

use super::{load_config, Status};

/// Execute the `run` command: parse, validate, and run the pipelines.
pub async fn execute(config_path: &Path, only: Option<&str>, dry_run: bool) -> Result<Status> {
    let config = load_config(config_path)?;
    let registry = SourceRegistry::from_configs(&config.sources);

    let reports = if dry_run {
        let warehouse = MemoryWarehouse::new();
        let reports = run_with(&config, &registry, &warehouse, only).await?;
        print_dry_run(&warehouse)?;
        reports
    } else {
        let warehouse = PostgresWarehouse::new(config.warehouse.clone());
        run_with(&config, &registry, &warehouse, only).await?
    };

    for report in &reports {
        print_report(report);
    }

    if reports.iter().any(RunReport::is_degraded) {
        Ok(Status::Degraded)
    } else {
        Ok(Status::Clean)
    }
}

async fn run_with(
    config: &ClinicmartConfig,
    registry: &SourceRegistry,
    warehouse: &dyn Warehouse,
    only: Option<&str>,
) -> Result<Vec<RunReport>> {
    Ok(run_all(config, registry, warehouse, Utc::now(), only).await?)
}

fn print_report(report: &RunReport) {
    let state = if report.is_degraded() {
        "completed with degraded inputs"
    } else {
        "completed successfully"
    };
    println!("Pipeline '{}' {state}.", report.pipeline);
    if let Some(window) = report.window {
        println!("  Window:          {window}");
    }
    println!("  Fact rows:       {}", report.fact_rows);
    for source in &report.sources {
        match source.status.error() {
            None => println!("  Source {:18} {} rows", format!("{}:", source.step), source.rows),
            Some(e) => println!(
                "  Source {:18} {} ({e})",
                format!("{}:", source.step),
                source.status.label().to_uppercase()
            ),
        }
    }
    for lookup in &report.lookups {
        println!(
            "  Lookup {:18} {} keys, {} failed, {} null",
            format!("{}:", lookup.source),
            lookup.distinct_keys,
            lookup.failed_keys,
            lookup.null_keys
        );
    }
    for load in &report.loads {
        println!(
            "  Load {:20} {} written, {} deleted ({})",
            format!("{}:", load.table),
            load.rows_written,
            load.rows_deleted,
            load.policy
        );
    }
    if report.dimension_skipped {
        println!("  Dimension:       skipped, previous snapshot kept");
    }
    if report.nulled_dates > 0 {
        println!("  Nulled dates:    {}", report.nulled_dates);
    }
    println!("  Duration:        {:.2}s", report.duration_secs);
}

fn print_dry_run(warehouse: &MemoryWarehouse) -> Result<()> {
    println!("Dry run: nothing was written to the warehouse.");
    for table in warehouse.table_names()? {
        let rows = warehouse.snapshot(&table)?;
        println!("  {table}: {} rows", rows.len());
        for row in rows.iter().take(5) {
            println!("    {}", row.to_json());
        }
    }
    Ok(())
}
