use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use usage_reindex::cli::Cli;
use usage_reindex::reconcile::{EngineConfig, ReconcileEngine};
use usage_reindex::stats::RunSummary;
use usage_reindex::storage::{CountersWriter, RedisCountersStore};
use usage_reindex::ReindexError;

/// Sentinel 无法给出 master 时的退出码
const EXIT_MASTER_UNAVAILABLE: u8 = 100;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            // --help / --version 不是错误
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli).await {
        Ok(summary) => {
            info!("\n{}", summary);
            if !summary.is_clean() {
                warn!("Reindex completed with failures, affected counters were left untouched");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Reindex failed: {:#}", e);
            match e.downcast_ref::<ReindexError>() {
                Some(ReindexError::MasterUnavailable(_)) => ExitCode::from(EXIT_MASTER_UNAVAILABLE),
                _ => ExitCode::FAILURE,
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    let config = cli.load_config()?;
    let scope = cli.target_scope()?;
    info!("Starting usage-reindex against bucketd {}", config.bucketd.addr);

    let store = RedisCountersStore::connect(&config.sentinel_config()).await?;
    let writer = CountersWriter::new(Arc::new(store), config.dry_run);
    if config.dry_run {
        info!("Dry run: counters store will not be modified");
    }

    let mut engine = ReconcileEngine::new(
        EngineConfig {
            client: config.client_config(),
            workers: config.workers,
            only_latest_when_locked: config.only_latest_when_locked,
        },
        writer,
    );
    Ok(engine.run(&scope).await?)
}
