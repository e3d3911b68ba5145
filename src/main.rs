//! market-etl binary: run the worker or enqueue symbols.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use market_etl::api::TdaClient;
use market_etl::token::TokenProvider;
use market_etl::worker::{Worker, WorkerConfig};
use market_etl::{Config, EtlDb, JobType};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "market-etl", about = "Market data ETL worker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Drain the work queue once: claim, call, transform, load.
    Work,
    /// Bulk-enqueue symbols for a job from a newline-separated file.
    Enqueue {
        /// Job type: fundamentals, medium-trend, short-trend, signals.
        #[arg(long)]
        job: String,
        /// Path to the symbol list, one symbol per line.
        #[arg(long)]
        symbols_file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_etl=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;
    let db = Arc::new(EtlDb::new(&config.database_path)?);

    match cli.command {
        Command::Work => {
            let token = Arc::new(TokenProvider::new(&config.token_path)?);
            let client = Arc::new(TdaClient::new(
                Arc::clone(&db),
                token,
                config.api_key.clone(),
                config.base_url.clone(),
                config.retry_max,
                config.retry_wait,
            )?);
            let worker = Worker::new(db, client, WorkerConfig::from(&config));
            let summary = worker.run().await?;
            tracing::info!(
                "Done: {} claimed, {} succeeded, {} failed",
                summary.claimed,
                summary.succeeded,
                summary.failed
            );
        }
        Command::Enqueue { job, symbols_file } => {
            let Some(job) = JobType::from_str(&job) else {
                bail!(
                    "unknown job {:?}; expected one of: {}",
                    job,
                    JobType::ALL.map(|j| j.as_str()).join(", ")
                );
            };
            let raw = std::fs::read_to_string(&symbols_file)
                .with_context(|| format!("reading symbol list {:?}", symbols_file))?;
            let symbols = raw
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string);
            let count = db.enqueue(symbols, job)?;
            tracing::info!("Enqueued {} symbols for {}", count, job);
        }
    }

    Ok(())
}
