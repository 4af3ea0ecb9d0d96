//! Event source adapters.
//!
//! This module provides adapters for the origins that feed raw change-events
//! into the ingestion pipeline. Each source delivers events in arrival
//! order, one at a time, without buffering or reordering.
//!
//! # Available Sources
//!
//! - [`SseSource`] - Live subscription to the platform's HTTP event stream
//! - [`JsonlSource`] - Replays captured stream dumps (one JSON envelope per line)
//!
//! # Architecture
//!
//! All sources implement the [`EventSource`] trait, which provides a uniform
//! interface for the pipeline to consume events regardless of their origin.

mod jsonl;
mod sse;

pub use jsonl::{JsonlConfig, JsonlSource};
pub use sse::{SseConfig, SseSource};

use crate::Result;

/// One delivered unit from the external change-event stream.
///
/// Owned by the source only for the duration of one handler call; the
/// pipeline constructs its own record from it and never holds onto it.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Stream-assigned id, `"<ms-since-epoch>-<sequence>"`. Unique and
    /// monotonically non-decreasing; the sole idempotency key downstream.
    pub id: String,

    /// Change kind (create, update, delete, merge).
    pub event_type: String,

    /// UTF-8 JSON payload document.
    pub data: String,
}

/// A source of raw change-events.
///
/// Sources are responsible for:
/// 1. Reading/receiving events from their underlying origin
/// 2. Delivering them to the handler in arrival order
/// 3. Containing per-event handler failures so one bad event cannot
///    halt the stream
pub trait EventSource {
    /// Human-readable name for this source (used in logs and metrics).
    fn name(&self) -> &'static str;

    /// Process events from this source, calling the handler for each one.
    ///
    /// The handler returns `Ok(true)` to continue processing, `Ok(false)`
    /// to stop gracefully, or `Err` for a per-event failure — which is
    /// logged and does NOT stop the stream. Only a source-level failure
    /// (lost subscription, unreadable input) makes `run` return `Err`.
    fn run<F>(&mut self, handler: F) -> Result<SourceStats>
    where
        F: FnMut(RawEvent) -> Result<bool>;
}

/// Statistics from processing an event source.
#[derive(Debug, Clone, Default)]
pub struct SourceStats {
    /// Total events encountered.
    pub total_events: usize,

    /// Events delivered to the handler.
    pub delivered_events: usize,

    /// Events the source itself could not parse into a [`RawEvent`].
    pub parse_errors: usize,

    /// Source-specific metadata.
    pub source_metadata: SourceMetadata,
}

/// Source-specific metadata.
#[derive(Debug, Clone, Default)]
pub struct SourceMetadata {
    /// For file-based sources: number of files processed.
    pub files_processed: Option<usize>,

    /// For file-based sources: total bytes read.
    pub bytes_read: Option<usize>,

    /// For the live source: id of the last delivered event, usable as a
    /// resume cursor on restart.
    pub last_event_id: Option<String>,
}
