use std::path::Path;

use anyhow::Result;
use clinicmart_sources::SourceRegistry;
use clinicmart_warehouse::{PostgresWarehouse, Warehouse};

use super::{load_config, Status};

/// Execute the `check` command: validate the config and probe every source
/// and the warehouse.
pub async fn execute(config_path: &Path) -> Result<Status> {
    let config = load_config(config_path)?;
    println!("Config structure:  OK");

    let registry = SourceRegistry::from_configs(&config.sources);
    let mut all_ok = true;
    for name in registry.names() {
        let Some(adapter) = registry.get(name) else {
            continue;
        };
        let label = format!("Source {name} ({}):", adapter.kind());
        match adapter.check().await {
            Ok(()) => println!("{label:32} OK"),
            Err(e) => {
                all_ok = false;
                println!("{label:32} FAILED\n  {e}");
            }
        }
    }

    let warehouse = PostgresWarehouse::new(config.warehouse.clone());
    match warehouse.check().await {
        Ok(()) => println!("{:32} OK", "Warehouse:"),
        Err(e) => {
            all_ok = false;
            println!("{:32} FAILED\n  {e}", "Warehouse:");
        }
    }

    if all_ok {
        println!("\nAll checks passed.");
        Ok(Status::Clean)
    } else {
        anyhow::bail!("One or more checks failed")
    }
}
