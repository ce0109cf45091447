mod config;
mod models;
mod pipeline;
mod scraper;
mod storage;
mod utils;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;
use crate::pipeline::{Pipeline, PipelineError};
use crate::storage::database::DuckDbSink;
use crate::storage::json_store::JsonDocumentStore;
use crate::storage::FreshnessStore;

const EXIT_CONFIG: u8 = 2;
const EXIT_DISCOVERY: u8 = 3;

#[derive(Parser)]
#[command(name = "swift-scraper", about = "SWIFT/BIC code catalog refresher", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Command {
    /// Re-scrape every country whose data is stale
    Run {
        /// Only process the first N countries (overrides pipeline.country_limit)
        #[arg(short, long, env = "SWIFT_LIMIT")]
        limit: Option<usize>,
    },

    /// Show freshness and record statistics
    Status,

    /// Create the secondary DuckDB table without scraping
    Migrate,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "swift_scraper=info,warn",
        1 => "swift_scraper=debug,info",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().compact().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {:#}", e);
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    match cli.command {
        Command::Run { limit } => run(config, limit).await,
        Command::Status => report(status(&config)),
        Command::Migrate => report(migrate(&config)),
    }
}

async fn run(mut config: AppConfig, limit: Option<usize>) -> ExitCode {
    if limit.is_some() {
        config.pipeline.country_limit = limit;
    }

    let _t = utils::Timer::start("SWIFT code refresh");
    let result = match Pipeline::from_config(config) {
        Ok(mut pipeline) => pipeline.run().await,
        Err(e) => Err(e),
    };

    match result {
        Ok(stats) => {
            info!(
                "Done: {} scraped, {} skipped, {} failed, {} records",
                stats.scraped, stats.skipped, stats.failed, stats.records_written
            );
            ExitCode::SUCCESS
        }
        Err(e @ PipelineError::Discovery(_)) => {
            error!("{}", e);
            ExitCode::from(EXIT_DISCOVERY)
        }
        Err(e @ PipelineError::State(_)) => {
            error!("{}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn report(result: Result<()>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn status(config: &AppConfig) -> Result<()> {
    let freshness = FreshnessStore::load(&config.storage.freshness_path)?;
    let records = JsonDocumentStore::load(&config.storage.data_path)?;
    let threshold = config.pipeline.staleness_threshold();
    let stale = freshness
        .keys()
        .filter(|k| freshness.is_stale(k, threshold))
        .count();
    let mirrored = match &config.storage.secondary {
        Some(secondary) => DuckDbSink::open(secondary)
            .and_then(|db| {
                db.run_migrations()?;
                db.record_count()
            })
            .map(utils::fmt_number)
            .unwrap_or_else(|e| format!("unavailable ({:#})", e)),
        None => "not configured".to_string(),
    };

    println!("─────────────────────────────────");
    println!("  SWIFT scraper — Status");
    println!("─────────────────────────────────");
    println!("  Countries : {}", utils::fmt_number(freshness.len() as i64));
    println!("  Stale     : {}", utils::fmt_number(stale as i64));
    println!("  Records   : {}", utils::fmt_number(records.len() as i64));
    println!("  DuckDB    : {}", mirrored);
    println!("─────────────────────────────────");
    Ok(())
}

fn migrate(config: &AppConfig) -> Result<()> {
    match &config.storage.secondary {
        Some(secondary) => {
            DuckDbSink::open(secondary)?.run_migrations()?;
            println!("Migrations applied.");
        }
        None => println!("No secondary store configured; nothing to migrate."),
    }
    Ok(())
}
