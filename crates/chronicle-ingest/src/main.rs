//! Chronicle live ingestion daemon.
//!
//! This is the main entry point for the live audit-trail ingestion service.
//! It subscribes to the platform's change-event stream, transforms each
//! event into a canonical history record, and upserts it into the backing
//! index keyed by the event id.
//!
//! # Usage
//!
//! ```bash
//! # Run with default settings (local platform and store)
//! chronicle-ingest
//!
//! # Run against a remote platform and store
//! CHRONICLE_ELASTIC_API_KEY=... chronicle-ingest \
//!     --stream-url https://platform:4000/stream \
//!     --elastic-url https://es:9200 \
//!     --index history
//! ```
//!
//! # Graceful Shutdown
//!
//! The daemon handles SIGINT (Ctrl+C) and SIGTERM for graceful shutdown:
//! 1. Stops consuming after the in-flight event completes
//! 2. Drains the indexer queue
//! 3. Logs the resume cursor and exits cleanly
//!
//! A lost stream subscription is fatal: the process exits non-zero so the
//! surrounding supervisor can restart it with backoff.

use anyhow::{Context, Result};
use chronicle_core::metrics::{init_metrics, start_metrics_server};
use chronicle_core::{HistoryRecord, transform};
use chronicle_ingest::{
    Config, ElasticIndexer,
    source::{RawEvent, SseConfig, SseSource},
};
use clap::Parser;
use metrics::{counter, gauge};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Chronicle live ingestion daemon.
#[derive(Parser, Debug)]
#[command(name = "chronicle-ingest")]
#[command(about = "Live audit-trail ingestion daemon")]
#[command(version)]
struct Args {
    /// Stream endpoint URL (overrides CHRONICLE_STREAM_URL)
    #[arg(long)]
    stream_url: Option<String>,

    /// Store URL (overrides CHRONICLE_ELASTIC_URL)
    #[arg(long)]
    elastic_url: Option<String>,

    /// Index name for history records (overrides CHRONICLE_ELASTIC_INDEX)
    #[arg(long)]
    index: Option<String>,

    /// Resume cursor: id of the last event a previous run indexed
    #[arg(long)]
    cursor: Option<String>,

    /// Metrics HTTP server port (0 to disable)
    #[arg(long, default_value = "9090")]
    metrics_port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("info".parse().unwrap())
                .add_directive("chronicle_ingest=debug".parse().unwrap()),
        )
        .init();

    let args = Args::parse();

    tracing::info!("Chronicle ingestion daemon starting...");

    // Initialize metrics
    if args.metrics_port > 0 {
        let metrics_handle = init_metrics();
        start_metrics_server(args.metrics_port, metrics_handle).await?;
        gauge!("ingestion_running").set(1.0);
    }

    let mut config = Config::from_env().context("invalid configuration")?;
    if let Some(url) = args.elastic_url {
        config.elastic.url = url;
    }
    if let Some(index) = args.index {
        config.elastic.index = index;
    }
    if let Some(url) = args.stream_url {
        config.stream_url = url;
    }
    if let Some(cursor) = args.cursor {
        config.stream_cursor = Some(cursor);
    }

    tracing::info!("Configuration:");
    tracing::info!("  Stream: {}", config.stream_url);
    tracing::info!("  Store:  {}", config.elastic.url);
    tracing::info!("  Index:  {}", config.elastic.index);
    tracing::info!(
        "  Cursor: {}",
        config.stream_cursor.as_deref().unwrap_or("live")
    );

    // Initialize pipeline components
    let (indexer, sender, indexer_handle) = init_pipeline(&config)?;

    // Create the stream source
    let source = Arc::new(SseSource::new(SseConfig {
        url: config.stream_url.clone(),
        token: config.stream_token.clone(),
        last_event_id: config.stream_cursor.clone(),
        ..Default::default()
    }));

    // Set up graceful shutdown
    let shutdown_source = Arc::clone(&source);
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received, stopping after the in-flight event...");
        shutdown_source.stop();
    })
    .context("Failed to set Ctrl+C handler")?;

    // Run stats
    let mut events_transformed = 0usize;
    let mut events_skipped = 0usize;

    // Run the ingestion loop
    tracing::info!("Starting live ingestion...");

    let run_result = source
        .run_async(|event: RawEvent| {
            counter!("history_events_total").increment(1);

            match transform(&event.id, &event.event_type, &event.data) {
                Ok(record) => {
                    counter!("history_events_transformed_total").increment(1);
                    events_transformed += 1;
                    if let Err(e) = sender.send(record) {
                        // The indexer thread is gone and the record is
                        // dropped; keep that visible to operators.
                        counter!("elastic_index_errors_total").increment(1);
                        return Err(chronicle_ingest::Error::ChannelSend(e.to_string()));
                    }
                }
                Err(e) => {
                    // Permanent skip: the payload will not change on replay.
                    tracing::warn!(event_id = %event.id, error = %e, "skipping malformed event");
                    counter!("history_events_skipped_total").increment(1);
                    events_skipped += 1;
                }
            }

            Ok(true)
        })
        .await;

    // Shutdown sequence: disconnecting the channel lets the indexer drain
    // the remaining queue and stop, regardless of how the run ended.
    tracing::info!("Shutting down...");
    drop(sender);
    if indexer_handle.join().is_err() {
        tracing::warn!("Indexer thread panicked");
    }
    gauge!("ingestion_running").set(0.0);

    // A lost subscription is fatal to this worker: surface it to the
    // supervisor for restart instead of swallowing it.
    let stats = run_result.context("stream subscription failed")?;

    let indexer_stats = indexer.stats();

    // Print summary
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("SHUTDOWN COMPLETE");
    tracing::info!("═══════════════════════════════════════════════════════");
    tracing::info!("Events received:      {}", stats.total_events);
    tracing::info!("Events transformed:   {}", events_transformed);
    tracing::info!("Events skipped:       {}", events_skipped);
    tracing::info!("Records indexed:      {}", indexer_stats.records_indexed);
    tracing::info!("Index errors:         {}", indexer_stats.index_errors);
    if let Some(cursor) = &stats.source_metadata.last_event_id {
        tracing::info!("Resume cursor:        {}", cursor);
    }

    Ok(())
}

/// Pipeline components: (indexer, record channel sender, indexer thread handle).
type PipelineComponents = (
    Arc<ElasticIndexer>,
    crossbeam_channel::Sender<HistoryRecord>,
    std::thread::JoinHandle<()>,
);

/// Initialize pipeline components.
fn init_pipeline(config: &Config) -> Result<PipelineComponents> {
    let indexer = Arc::new(
        ElasticIndexer::new(config.elastic.clone())
            .with_context(|| "Failed to create Elasticsearch indexer")?,
    );

    let (sender, receiver) = crossbeam_channel::unbounded::<HistoryRecord>();
    let handle = indexer.start(receiver);

    Ok((indexer, sender, handle))
}
