//! Billflow Normalizer
//!
//! Refreshes the normalized tables from the raw store:
//! 1. Lists distinct (kind, entity_id) units
//! 2. Per unit, selects the authoritative raw record (last-write-wins
//!    across the competing timestamp fields)
//! 3. Upserts customers / invoices / invoice addresses, one transaction
//!    per entity, across a bounded worker pool
//!
//! Exit status: 0 on full success, 2 on partial success (some units
//! skipped or failed, reported in the summary), 1 on fatal failure.

use anyhow::Context;
use billflow_common::db::DbPool;
use billflow_common::{AppConfig, Repository, VERSION};
use billflow_normalizer::processor::{NormalizerProcessor, RunSummary};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(name = "normalizer", about = "Refresh normalized tables from the raw store")]
struct Args {
    /// Bounded worker pool size (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    /// Skip all customers table writes
    #[arg(long)]
    skip_customers: bool,

    /// Load configuration from a specific TOML file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    match run(args).await {
        Ok(summary) if summary.is_clean() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(e) => {
            // Also to stderr: config failures happen before tracing init
            eprintln!("Error: {:#}", e);
            error!(error = %e, "Normalization run failed");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<RunSummary> {
    let mut config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    if let Some(workers) = args.workers {
        config.normalizer.workers = workers.max(1);
    }

    init_tracing(&config);
    info!("Starting Billflow Normalizer v{}", VERSION);

    let pool = DbPool::new(&config.database).await?;
    let repository = Repository::new(pool);
    let engine = NormalizerProcessor::new(
        repository,
        config.normalizer.clone(),
        args.skip_customers,
    );

    // Ctrl-C stops dispatch; in-flight transactions finish or roll back
    let cancel = Arc::new(AtomicBool::new(false));
    let cancel_flag = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Shutdown signal received, cancelling dispatch");
            cancel_flag.store(true, Ordering::SeqCst);
        }
    });

    let summary = engine.run(cancel).await?;
    report(&summary);

    Ok(summary)
}

fn report(summary: &RunSummary) {
    info!(
        units = summary.units,
        customers = summary.customers_upserted,
        invoices = summary.invoices_upserted,
        addresses = summary.addresses_upserted,
        "Normalized table refresh finished"
    );

    for skipped in &summary.skipped {
        warn!(unit = %skipped.key, reason = %skipped.reason, "Skipped malformed unit");
    }
    for failed in &summary.failed {
        error!(unit = %failed.key, reason = %failed.reason, "Failed unit");
    }

    if !summary.is_clean() {
        warn!(
            skipped = summary.skipped.len(),
            failed = summary.failed.len(),
            "Run finished with partial success"
        );
    }
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}
