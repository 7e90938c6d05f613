//! Billflow Raw Loader
//!
//! Appends a line-delimited JSON export file into the immutable raw store:
//! 1. Streams the file line by line with stable 1-based offsets
//! 2. Extracts the entity id and ordering timestamps (best-effort)
//! 3. Inserts batches with ON CONFLICT DO NOTHING, so re-running the same
//!    file is a no-op

mod reader;

use anyhow::Context;
use billflow_common::db::models::RecordKind;
use billflow_common::db::DbPool;
use billflow_common::{AppConfig, Repository, VERSION};
use clap::Parser;
use std::path::PathBuf;
use tokio::io::AsyncBufReadExt;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "loader", about = "Load a JSON-lines export into the raw store")]
struct Args {
    /// Path to the JSON-lines export file
    #[arg(long)]
    src: PathBuf,

    /// Which export stream this file came from
    #[arg(long, default_value = "invoice")]
    kind: RecordKind,

    /// Rows per insert batch (overrides config)
    #[arg(long)]
    batch: Option<usize>,

    /// Load configuration from a specific TOML file
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => AppConfig::from_file(path),
        None => AppConfig::load(),
    }
    .context("Failed to load configuration")?;

    init_tracing(&config);
    info!("Starting Billflow Raw Loader v{}", VERSION);

    let batch_size = args.batch.unwrap_or(config.loader.batch_size).max(1);
    let source_file = args.src.display().to_string();

    let pool = DbPool::new(&config.database).await?;
    let repository = Repository::new(pool);

    let file = tokio::fs::File::open(&args.src)
        .await
        .with_context(|| format!("Input file not found: {}", source_file))?;
    let mut lines = tokio::io::BufReader::new(file).lines();

    let mut batch = Vec::with_capacity(batch_size);
    let mut line_no = 0i64;
    let mut parsed = 0u64;
    let mut skipped = 0u64;
    let mut inserted = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        if line.trim().is_empty() {
            continue;
        }
        match reader::parse_line(&source_file, line_no, args.kind, &line) {
            Some(rec) => {
                parsed += 1;
                batch.push(rec);
            }
            None => skipped += 1,
        }

        if batch.len() >= batch_size {
            inserted += repository.insert_raw_batch(&batch).await?;
            batch.clear();
        }
    }

    if !batch.is_empty() {
        inserted += repository.insert_raw_batch(&batch).await?;
    }

    info!(
        source = %source_file,
        kind = %args.kind,
        lines = line_no,
        parsed,
        inserted,
        already_present = parsed - inserted,
        skipped,
        "Raw load complete"
    );

    Ok(())
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
