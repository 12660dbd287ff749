use anyhow::Result;
use clap::{ArgAction, Parser};
use tracing::{error, info};

use rakuten_ingest::collector::{self, collect_pages, CollectOptions};
use rakuten_ingest::config::Config;
use rakuten_ingest::datekey::ExecutionDate;
use rakuten_ingest::search::{RakutenClient, SearchQuery};
use rakuten_ingest::storage;
use rakuten_ingest::util::env as env_util;

#[derive(Parser, Debug)]
#[command(
    name = "collect",
    version,
    about = "Fetch Rakuten search pages and publish the day's JSONL snapshot to GCS"
)]
struct Cli {
    /// Override SEARCH_KEYWORD for this run
    #[arg(long)]
    keyword: Option<String>,
    /// Override SHOP_CODE for this run
    #[arg(long)]
    shop_code: Option<String>,
    /// Override MAX_PAGES for this run
    #[arg(long)]
    max_pages: Option<u32>,
    /// Paginate and report counts without publishing anything
    #[arg(long, action = ArgAction::SetTrue)]
    dry_run: bool,
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
        error!(error = ?err, "collector run failed");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = Config::from_env()?;
    if let Some(keyword) = cli.keyword {
        cfg.keyword = keyword;
    }
    if let Some(shop_code) = cli.shop_code {
        cfg.shop_code = Some(shop_code);
    }
    if let Some(max_pages) = cli.max_pages {
        cfg.max_pages = max_pages;
    }
    let api_key = cfg.require_api_key()?.to_string();

    // One execution date for the whole run; never recomputed past this point.
    let date = ExecutionDate::now();

    let client = RakutenClient::new(api_key, cfg.api_endpoint.clone())?;
    let query = SearchQuery {
        keyword: cfg.keyword.clone(),
        shop_code: cfg.shop_code.clone(),
        hits: cfg.hits_per_page,
    };
    let opts = CollectOptions {
        max_pages: cfg.max_pages,
        page_delay: cfg.request_delay,
    };

    if cli.dry_run {
        let outcome = collect_pages(&client, &query, opts).await;
        info!(
            items = outcome.items.len(),
            pages = outcome.pages_fetched,
            truncated = outcome.truncated,
            "dry run complete; nothing published"
        );
        println!(
            "dry run: {} items across {} pages",
            outcome.items.len(),
            outcome.pages_fetched
        );
        return Ok(());
    }

    let store = storage::gcs_store(&cfg.bucket, &cfg.credentials_path)?;
    match collector::run(&client, &store, &query, opts, &cfg.output_prefix, &date).await? {
        Some(report) => println!(
            "published {} items to gs://{}/{}",
            report.items, cfg.bucket, report.location
        ),
        None => println!("no items collected; nothing published"),
    }
    Ok(())
}
