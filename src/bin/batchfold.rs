//! batchfold - fold delimited batch files into a durable running aggregate
//!
//! Usage:
//!   batchfold                 # every unprocessed batch except the reserved one
//!   batchfold --validation    # only the reserved batch, with before/after statistics
//!
//! Configuration comes from `.env` / environment (`BATCHFOLD_*`); the flags
//! below override it.
//!
//! Exit codes: 0 all batches completed or skipped, 1 fatal error,
//! 2 at least one batch failed.

use batchfold::report;
use batchfold::runner::{BatchRunner, RunMode, EXIT_FATAL};
use batchfold::store::{AggregateStore, SqliteStore};
use batchfold::IngestConfig;
use clap::Parser;
use dotenv::dotenv;
use log::{error, info};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "batchfold", version, about = "Incremental batch ingestion with running statistics")]
struct Cli {
    /// Process only the reserved validation batch
    #[arg(long)]
    validation: bool,

    /// Directory scanned for batch files
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// SQLite database path
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("❌ Fatal: {}", e);
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<u8, Box<dyn std::error::Error>> {
    let mut config = IngestConfig::from_env()?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    let mode = if cli.validation {
        RunMode::Validation
    } else {
        RunMode::Normal
    };

    info!("🚀 batchfold starting ({:?} run)", mode);
    info!("   ├─ Database: {}", config.db_path.display());
    info!("   ├─ Data dir: {}", config.data_dir.display());
    info!("   ├─ Reserved batch: {}", config.reserved_batch);
    info!("   └─ Value field: {}", config.value_field);

    let store = Arc::new(SqliteStore::open(&config.db_path, config.busy_timeout)?);

    if mode == RunMode::Validation {
        let before = store.latest().await?;
        println!("{}", report::summary("Statistics before validation", &config.value_field, before.as_ref()));
    }

    let runner = BatchRunner::from_store(store, config.runner_options());
    let run_report = runner.run(mode).await?;

    println!(
        "{}",
        report::summary(report::closing_title(mode), &config.value_field, run_report.final_snapshot.as_ref())
    );
    println!("{}", report::run_overview(&run_report));

    Ok(run_report.exit_code())
}
