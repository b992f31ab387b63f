mod commands;
mod logging;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "clinicmart",
    version,
    about = "Batch ETL for the clinic data mart"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every pipeline in the config, or one of them
    Run {
        /// Path to config YAML file
        config: PathBuf,
        /// Run only this pipeline
        #[arg(long)]
        pipeline: Option<String>,
        /// Load into an in-memory warehouse and print what would be written
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate config and probe source and warehouse connectivity
    Check {
        /// Path to config YAML file
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    logging::init(&cli.log_level);

    let result = match cli.command {
        Commands::Run {
            config,
            pipeline,
            dry_run,
        } => commands::run::execute(&config, pipeline.as_deref(), dry_run).await,
        Commands::Check { config } => commands::check::execute(&config).await,
    };

    match result {
        Ok(status) => ExitCode::from(status.code()),
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::from(commands::failure_code(&err))
        }
    }
}
