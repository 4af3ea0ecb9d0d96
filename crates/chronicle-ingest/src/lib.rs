//! Chronicle ingestion pipeline components.
//!
//! This crate provides the pipeline for ingesting platform change-events
//! into a searchable history index.
//!
//! # Modules
//!
//! - [`source`] - Event source adapters (live SSE stream, JSONL replay)
//! - [`pipeline`] - Transformation orchestration and the Elasticsearch indexer
//! - [`config`] - Process configuration, read once at startup
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Event Sources  │  (live platform stream, captured JSONL dumps)
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │   Transformer   │  Pure event → history record mapping
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ ElasticIndexer  │  Upsert keyed by event id (replace on redelivery)
//! └─────────────────┘
//! ```
//!
//! Each event is processed exactly once per delivery, in arrival order. A
//! malformed payload or a rejected write is logged and skipped; only the
//! loss of the stream subscription itself stops a worker.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod source;

// Re-export commonly used types at crate root
pub use config::Config;
pub use error::{Error, Result};

// Re-export pipeline components for convenience
pub use pipeline::{
    AuthMode, ElasticConfig, ElasticIndexer, EventOutcome, IndexerStats, RecordSink, process_event,
};

// Re-export source trait and adapters
pub use source::{
    EventSource, JsonlConfig, JsonlSource, RawEvent, SourceMetadata, SourceStats, SseConfig,
    SseSource,
};
