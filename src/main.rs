//! Daily ranking job binary.
//!
//! `rankpipe run` executes one pipeline pass (or loops on a fixed interval
//! with `--interval-secs`); `rankpipe latest` prints the most recent
//! published snapshot without re-running any computation.

use anyhow::Result;
use clap::{Parser, Subcommand};
use rankpipe::application::pipeline::RankingPipeline;
use rankpipe::config::{Config, Mode};
use rankpipe::domain::ports::{MarketDataProvider, SnapshotStore};
use rankpipe::domain::snapshot::RunStatus;
use rankpipe::infrastructure::artifacts::FsArtifactStore;
use rankpipe::infrastructure::mock::MockMarketDataProvider;
use rankpipe::infrastructure::persistence::{Database, SqliteSnapshotRepository};
use rankpipe::infrastructure::yahoo::YahooDataProvider;
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Daily instrument ranking pipeline", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ranking pipeline once (default), or repeatedly.
    Run {
        /// Re-run on a fixed tick instead of exiting after one pass. Each
        /// tick is independently idempotent per as-of date.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
    /// Print the latest published snapshot as JSON.
    Latest,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let stdout_layer = tracing_subscriber::fmt::layer().with_target(false);
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stdout_layer)
        .init();

    let args = Args::parse();
    let config = Config::from_env()?;

    let db = Database::new(&config.database_url).await?;
    let snapshots = Arc::new(SqliteSnapshotRepository::new(db.pool.clone()));

    match args.command.unwrap_or(Command::Run { interval_secs: None }) {
        Command::Run { interval_secs } => {
            info!(
                mode = ?config.mode,
                universe = config.universe.len(),
                top_k = config.top_k,
                "rankpipe {} starting",
                env!("CARGO_PKG_VERSION")
            );

            let artifacts = Arc::new(FsArtifactStore::new(&config.artifact_dir)?);
            let provider: Arc<dyn MarketDataProvider> = match config.mode {
                Mode::Mock => Arc::new(MockMarketDataProvider::new(42)),
                Mode::Yahoo => Arc::new(YahooDataProvider::new(&config.yahoo_base_url)),
            };
            let pipeline = RankingPipeline::new(provider, artifacts, snapshots, config);

            match interval_secs {
                None => {
                    let result = pipeline.run_once().await;
                    info!(status = ?result.status, as_of = ?result.as_of, "Run finished");
                    if result.status == RunStatus::Failed {
                        anyhow::bail!(
                            "run failed: {}",
                            result.reason.unwrap_or_else(|| "unknown".to_string())
                        );
                    }
                }
                Some(secs) => {
                    let mut tick = tokio::time::interval(std::time::Duration::from_secs(secs));
                    loop {
                        tick.tick().await;
                        let result = pipeline.run_once().await;
                        match result.status {
                            RunStatus::Failed => warn!(
                                reason = ?result.reason,
                                "Run failed; will retry on the next tick"
                            ),
                            _ => info!(status = ?result.status, as_of = ?result.as_of, "Run finished"),
                        }
                    }
                }
            }
        }
        Command::Latest => match snapshots.latest().await? {
            Some(snapshot) => println!("{}", serde_json::to_string_pretty(&snapshot)?),
            None => {
                // Explicit "not yet available" signal for consumers.
                eprintln!("No ranking snapshot has been published yet.");
                std::process::exit(2);
            }
        },
    }

    Ok(())
}
