//! AidBoard import CLI
//!
//! Usage: `import <PATH> [--clear] [--sheet NAME] [--json] [--config FILE]`
//!
//! Exits non-zero only when the run could not start or finish (missing
//! file, bad headers, unreachable database). Row-level problems are listed
//! in the report and do not change the exit status.

use aidboard_common::{config::AppConfig, db::schema::ensure_schema, db::DbPool, telemetry, VERSION};
use aidboard_ingestion::cli::ImportArgs;
use aidboard_ingestion::{ImportOptions, ImportPipeline};
use clap::Parser;
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = ImportArgs::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Import failed");
            eprintln!("Import failed: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: ImportArgs) -> anyhow::Result<()> {
    let config = match args.config.as_deref() {
        Some(path) => AppConfig::from_file(path)?,
        None => AppConfig::load()?,
    };

    telemetry::init_tracing(&config.observability);
    info!(version = VERSION, path = %args.path.display(), "Starting import");

    let pool = DbPool::new(&config.database).await?;
    if config.database.auto_migrate {
        ensure_schema(pool.write()).await?;
    }

    let pipeline = ImportPipeline::new(pool);
    let report = pipeline
        .import_path(
            &args.path,
            args.sheet.as_deref(),
            ImportOptions {
                clear_existing: args.clear,
            },
        )
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    Ok(())
}
