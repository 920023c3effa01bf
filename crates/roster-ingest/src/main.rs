//! Roster Ingest - command line ingestion of employee CSV exports

use anyhow::Result;
use clap::{Parser, Subcommand};
use roster_common::logging::{init_logging, LogConfig, LogLevel};
use roster_ingest::{IngestPipeline, MemorySink, PipelineConfig, RecordSink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "roster-ingest")]
#[command(author, version, about = "Stream employee CSV files into storage")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest one CSV file
    Run {
        /// CSV file; the first row is treated as a header and skipped
        file: PathBuf,

        /// Concurrent writers
        #[arg(short, long, env = "INGEST_WORKER_COUNT")]
        workers: Option<usize>,

        /// Records per bulk write
        #[arg(short, long, env = "INGEST_BATCH_SIZE")]
        batch_size: Option<usize>,

        /// Batches buffered ahead of the writers
        #[arg(short, long, env = "INGEST_QUEUE_CAPACITY")]
        queue_capacity: Option<usize>,

        /// Columns to skip before first-name (1 for exports with a row id)
        #[arg(short, long, env = "INGEST_LEADING_COLUMNS")]
        leading_columns: Option<usize>,

        /// Write into Postgres instead of memory
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,

        /// Print the run summary to stdout as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("roster-ingest")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    match cli.command {
        Command::Run {
            file,
            workers,
            batch_size,
            queue_capacity,
            leading_columns,
            database_url,
            json,
        } => {
            let defaults = PipelineConfig::default();
            let config = PipelineConfig {
                worker_count: workers.unwrap_or(defaults.worker_count),
                batch_size: batch_size.unwrap_or(defaults.batch_size),
                queue_capacity: queue_capacity.unwrap_or(defaults.queue_capacity),
                leading_columns: leading_columns.unwrap_or(defaults.leading_columns),
            };

            let sink = build_sink(database_url.as_deref(), config.worker_count).await?;
            let pipeline = IngestPipeline::new(config, sink)?;

            info!(file = %file.display(), "Ingesting file");
            let summary = pipeline.run(&file).await?;

            info!(
                records_written = summary.records_written,
                rows_failed = summary.rows_failed,
                batches_failed = summary.batches_failed,
                clean = summary.is_clean(),
                "Ingestion complete"
            );

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            }
        },
    }

    Ok(())
}

#[cfg(feature = "database")]
async fn build_sink(database_url: Option<&str>, workers: usize) -> Result<Arc<dyn RecordSink>> {
    use anyhow::Context;
    use roster_ingest::PgSink;
    use sqlx::postgres::PgPoolOptions;

    match database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(pool_size(workers))
                .connect(url)
                .await
                .context("Failed to connect to database")?;
            info!("Writing to Postgres");
            Ok(Arc::new(PgSink::new(pool)))
        },
        None => {
            info!("No DATABASE_URL given, writing to memory");
            Ok(Arc::new(MemorySink::new()))
        },
    }
}

/// One connection per writer plus one spare
#[cfg(any(feature = "database", test))]
fn pool_size(workers: usize) -> u32 {
    u32::try_from(workers).unwrap_or(u32::MAX).saturating_add(1)
}

#[cfg(not(feature = "database"))]
async fn build_sink(database_url: Option<&str>, _workers: usize) -> Result<Arc<dyn RecordSink>> {
    if database_url.is_some() {
        tracing::warn!("Built without the `database` feature, ignoring DATABASE_URL");
    }
    info!("Writing to memory");
    Ok(Arc::new(MemorySink::new()))
}
