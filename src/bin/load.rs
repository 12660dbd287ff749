use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing::{error, info};

use rakuten_ingest::config::Config;
use rakuten_ingest::datekey::ExecutionDate;
use rakuten_ingest::loader::Loader;
use rakuten_ingest::storage;
use rakuten_ingest::util::db::Db;
use rakuten_ingest::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "load",
    version,
    about = "Load the day's JSONL snapshot from GCS into the Postgres raw table"
)]
struct Cli {
    /// Target date (YYYYMMDD, JST); defaults to today
    #[arg(long)]
    date: Option<String>,
    /// Print the newest artifact under the output prefix and exit
    #[arg(long, action = ArgAction::SetTrue)]
    latest_path: bool,
}

#[tokio::main]
async fn main() {
    env_util::init_env();
    if let Err(err) = rakuten_ingest::tracing::init_tracing("info") {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(1);
    }

    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        error!(error = ?err, "loader run failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let cfg = Config::from_env()?;

    if cli.latest_path {
        let store = storage::gcs_store(&cfg.bucket, &cfg.credentials_path)?;
        let meta = storage::require_latest_artifact(&store, &cfg.output_prefix).await?;
        println!("gs://{}/{}", cfg.bucket, meta.location);
        return Ok(());
    }

    // Fail on missing database settings before any network activity.
    let database_url = cfg.database_url()?;

    let date = match &cli.date {
        Some(raw) => ExecutionDate::from_ymd_str(raw)?,
        None => ExecutionDate::now(),
    };
    info!(date = %date.year_month_day(), "loading snapshot");

    let store = storage::gcs_store(&cfg.bucket, &cfg.credentials_path)?;
    let db = Db::connect(&database_url, 1).await?;
    let loader = Loader::new(db, store, &cfg.raw_schema, &cfg.raw_table, &cfg.output_prefix)?;

    let report = loader.run(&date).await?;
    println!(
        "loaded {} rows into {}.{} ({} replaced) from gs://{}/{}",
        report.inserted, cfg.raw_schema, cfg.raw_table, report.deleted, cfg.bucket, report.location
    );
    Ok(())
}
