//! Prometheus metrics helpers for the Chronicle pipeline.
//!
//! This module provides centralized metrics initialization and the metric
//! definitions used across Chronicle components.
//!
//! # Usage
//!
//! ```rust,ignore
//! use chronicle_core::metrics::{init_metrics, start_metrics_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let handle = init_metrics();
//!     start_metrics_server(9090, handle).await.unwrap();
//!
//!     use metrics::counter;
//!     counter!("history_events_total").increment(1);
//! }
//! ```
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (`history_`, `elastic_`, `replay_`, `stream_`)
//! - Suffix: unit or type (`_total`, `_seconds`)

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns a handle that can be used with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if the recorder is already
/// installed, instead of panicking. Useful for tests or optional metrics.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the specified port.
/// This spawns a background task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    Ok(())
}

/// Register descriptions for the metrics used across Chronicle.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // =========================================================================
    // Pipeline metrics
    // =========================================================================

    describe_counter!(
        "history_events_total",
        "Total stream events delivered to the pipeline"
    );
    describe_counter!(
        "history_events_transformed_total",
        "Events successfully transformed into history records"
    );
    describe_counter!(
        "history_events_skipped_total",
        "Events permanently skipped due to a malformed payload"
    );
    describe_gauge!(
        "ingestion_running",
        "Whether the ingestion daemon is running (1=yes, 0=no)"
    );

    // =========================================================================
    // Stream listener metrics
    // =========================================================================

    describe_gauge!(
        "stream_connected",
        "Whether the event-stream subscription is live (1=yes, 0=no)"
    );

    // =========================================================================
    // Indexer metrics
    // =========================================================================

    describe_counter!(
        "elastic_records_indexed_total",
        "History records upserted into the backing index"
    );
    describe_counter!(
        "elastic_index_errors_total",
        "Upserts rejected or failed by the backing index"
    );
    describe_histogram!(
        "elastic_upsert_duration_seconds",
        "Time spent on individual upsert requests"
    );
    describe_gauge!(
        "indexer_queue_depth",
        "History records waiting in the indexer channel"
    );

    // =========================================================================
    // Replay metrics
    // =========================================================================

    describe_counter!("replay_lines_total", "Lines read from replay input files");
    describe_counter!(
        "replay_parse_errors_total",
        "Replay input lines that could not be parsed"
    );
}
