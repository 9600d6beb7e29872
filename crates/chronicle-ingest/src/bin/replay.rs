//! Replay JSONL event files through the deduplicating pipeline.
//!
//! Each line is parsed as an event, submitted to an
//! [`Aggregator`] backed by the configured SQLite database, and consumed
//! exactly as if it had been published over HTTP. Events already in the
//! database are counted as duplicates.
//!
//! # Usage
//!
//! ```bash
//! # Single file
//! chronicle-replay -i events.jsonl
//!
//! # Directory of JSONL files into a specific database
//! chronicle-replay -i ./exports/ --db-path ./data/chronicle.db
//!
//! # With metrics
//! chronicle-replay -i ./exports/ --metrics-port 9091
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use chronicle_core::metrics::{init_metrics, start_metrics_server};
use chronicle_ingest::config::{DB_PATH_ENV, DEFAULT_DB_PATH};
use chronicle_ingest::{
    Aggregator, EventSource, IngestConfig, JsonlConfig, JsonlSource, SourceStats, Stats,
};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Replay JSONL events into a Chronicle dedup store.
#[derive(Parser, Debug)]
#[command(name = "chronicle-replay")]
#[command(about = "Feed JSONL event files through the Chronicle dedup pipeline")]
struct Args {
    /// Input JSONL file or directory path
    #[arg(short, long)]
    input: PathBuf,

    /// SQLite database holding dedup state
    #[arg(long, env = DB_PATH_ENV, default_value = DEFAULT_DB_PATH)]
    db_path: PathBuf,

    /// Abort on the first invalid line instead of skipping it
    #[arg(long, default_value = "false")]
    strict: bool,

    /// Limit number of files to process
    #[arg(long)]
    limit: Option<usize>,

    /// Print progress every N events
    #[arg(long, default_value = "100000")]
    progress_interval: usize,

    /// Seconds to wait for the queue to drain before giving up
    #[arg(long, default_value = "300")]
    drain_timeout_secs: u64,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "0")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle)
            .await
            .context("Failed to start metrics server")?;
    }

    let aggregator = Aggregator::new(&IngestConfig {
        db_path: args.db_path.clone(),
    });
    aggregator
        .initialize()
        .with_context(|| format!("Failed to open {}", args.db_path.display()))?;
    aggregator.start().await?;

    let before = aggregator.get_stats();
    let start = Instant::now();

    let mut source = JsonlSource::new(JsonlConfig {
        input: args.input.clone(),
        continue_on_error: !args.strict,
        limit: args.limit,
        progress_interval: args.progress_interval.max(1),
    });
    info!(source = source.name(), input = %args.input.display(), "Replaying events");

    let source_stats = source.process(|event| {
        aggregator.submit(event)?;
        Ok(true)
    });

    let drained = aggregator
        .wait_idle(Duration::from_secs(args.drain_timeout_secs))
        .await;
    let after = aggregator.get_stats();
    aggregator.close().await.context("Failed to close dedup store")?;

    let source_stats = source_stats.context("Replay failed")?;
    print_summary(&args, &source_stats, &before, &after, start.elapsed());

    if !drained {
        warn!(
            pending = (source_stats.valid_events as u64)
                .saturating_sub(after.received - before.received),
            "Queue did not drain in time"
        );
        bail!("Timed out waiting for the consumer to drain the queue");
    }

    Ok(())
}

fn print_summary(
    args: &Args,
    source: &SourceStats,
    before: &Stats,
    after: &Stats,
    elapsed: Duration,
) {
    println!("\n══════════════════════════════════════════════════════════════════");
    println!("SUMMARY");
    println!("══════════════════════════════════════════════════════════════════\n");

    println!("Input:       {}", args.input.display());
    println!("Database:    {}", args.db_path.display());
    println!();
    println!("Files processed:   {:>12}", source.files_processed);
    println!("Bytes read:        {:>12}", source.bytes_read);
    println!("Total events:      {:>12}", source.total_events);
    println!("Valid events:      {:>12}", source.valid_events);
    println!("Invalid events:    {:>12}", source.invalid_events);
    if source.invalid_events > 0 {
        println!("  - JSON errors:     {:>10}", source.parse_errors);
    }
    println!();
    println!(
        "Unique accepted:   {:>12}",
        after.unique_processed - before.unique_processed
    );
    println!(
        "Duplicates:        {:>12}",
        after.duplicated_dropped - before.duplicated_dropped
    );
    println!("Store total:       {:>12}", after.unique_processed);
    println!("Topics:            {:>12}", after.topics.len());
    println!();

    let secs = elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        source.valid_events as f64 / secs
    } else {
        0.0
    };
    println!("Elapsed:           {:>12.2}s", secs);
    println!("Throughput:        {:>12.0} events/s", rate);
}
