//! Core pipeline components for history ingestion.
//!
//! This module provides the shared pipeline that all event sources feed into:
//!
//! - [`process_event`] - Transform one raw event and upsert the result
//! - [`RecordSink`] - The seam between orchestration and the backing store
//! - [`ElasticIndexer`] - Upserts records into Elasticsearch by event id
//!
//! # Architecture
//!
//! ```text
//! [EventSource] → [transform] → [RecordSink (ElasticIndexer)]
//! ```
//!
//! Per-event failures are contained here: a malformed payload or a rejected
//! write is logged and counted, and the pipeline moves on to the next event.
//! Nothing at this layer retries — malformed payloads never self-correct,
//! and redelivery of transient store failures belongs to the stream
//! collaborator's delivery guarantees.

mod elastic;

pub use elastic::{AuthMode, ElasticConfig, ElasticIndexer, IndexerStats};

use crate::Result;
use crate::source::RawEvent;
use async_trait::async_trait;
use chronicle_core::{HistoryRecord, transform};
use metrics::counter;

/// Destination for transformed history records.
///
/// Implementations must replace-by-key on the record's `internal_id` so
/// repeated upserts of the same event converge to a single document.
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Write or replace the document keyed by `record.internal_id`.
    async fn upsert(&self, record: &HistoryRecord) -> Result<()>;
}

#[async_trait]
impl RecordSink for ElasticIndexer {
    async fn upsert(&self, record: &HistoryRecord) -> Result<()> {
        ElasticIndexer::upsert(self, record).await
    }
}

/// What happened to one event pushed through the pipeline.
#[derive(Debug)]
pub enum EventOutcome {
    /// Transformed and upserted.
    Indexed,
    /// Malformed payload; permanently skipped.
    SkippedTransform,
    /// The store rejected the write; skipped, redelivery may retry it.
    SkippedIndex,
}

/// Push one raw event through transform and into the sink.
///
/// Never returns an error: per-event failures are logged with the event id,
/// counted, and reported in the outcome so the caller can keep statistics.
pub async fn process_event<S>(sink: &S, event: &RawEvent) -> EventOutcome
where
    S: RecordSink + ?Sized,
{
    counter!("history_events_total").increment(1);

    let record = match transform(&event.id, &event.event_type, &event.data) {
        Ok(record) => record,
        Err(e) => {
            tracing::warn!(event_id = %event.id, error = %e, "skipping malformed event");
            counter!("history_events_skipped_total").increment(1);
            return EventOutcome::SkippedTransform;
        }
    };

    counter!("history_events_transformed_total").increment(1);

    match sink.upsert(&record).await {
        Ok(()) => EventOutcome::Indexed,
        Err(e) => {
            tracing::error!(event_id = %event.id, error = %e, "failed to index history record");
            EventOutcome::SkippedIndex
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory sink with replace-by-key semantics, mirroring the store's
    /// per-key last-write-wins behavior.
    #[derive(Default)]
    struct MemorySink {
        docs: Mutex<HashMap<String, serde_json::Value>>,
        write_order: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RecordSink for MemorySink {
        async fn upsert(&self, record: &HistoryRecord) -> Result<()> {
            let doc = serde_json::to_value(record)?;
            self.docs
                .lock()
                .unwrap()
                .insert(record.internal_id.clone(), doc);
            self.write_order
                .lock()
                .unwrap()
                .push(record.internal_id.clone());
            Ok(())
        }
    }

    /// Sink that rejects a single configured id.
    struct RejectingSink {
        inner: MemorySink,
        reject_id: String,
    }

    #[async_trait]
    impl RecordSink for RejectingSink {
        async fn upsert(&self, record: &HistoryRecord) -> Result<()> {
            if record.internal_id == self.reject_id {
                return Err(Error::Index {
                    status: 400,
                    body: "mapper_parsing_exception".to_string(),
                });
            }
            self.inner.upsert(record).await
        }
    }

    fn valid_event(id: &str) -> RawEvent {
        RawEvent {
            id: id.to_string(),
            event_type: "create".to_string(),
            data: format!(
                r#"{{"data": {{"type": "Report", "x_opencti_id": "subject-{id}"}}, "message": "created"}}"#
            ),
        }
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let sink = MemorySink::default();
        let event = valid_event("1700000000000-5");

        assert!(matches!(
            process_event(&sink, &event).await,
            EventOutcome::Indexed
        ));
        let after_one = sink.docs.lock().unwrap().clone();

        // Redelivery of the same event converges to the same stored state.
        assert!(matches!(
            process_event(&sink, &event).await,
            EventOutcome::Indexed
        ));
        let after_two = sink.docs.lock().unwrap().clone();

        assert_eq!(after_two.len(), 1);
        assert_eq!(after_one, after_two);
    }

    #[tokio::test]
    async fn redelivery_with_updated_payload_converges_to_latest() {
        let sink = MemorySink::default();
        let mut event = valid_event("1700000000000-5");
        process_event(&sink, &event).await;

        event.data = r#"{"data": {"type": "Report", "x_opencti_id": "s2"}, "message": "revised"}"#
            .to_string();
        process_event(&sink, &event).await;

        let docs = sink.docs.lock().unwrap();
        assert_eq!(docs.len(), 1);
        let doc = &docs["1700000000000-5"];
        assert_eq!(doc["context_data"]["message"], "revised");
    }

    #[tokio::test]
    async fn malformed_event_never_reaches_the_sink() {
        let sink = MemorySink::default();
        let event = RawEvent {
            id: "1700000000000-1".to_string(),
            event_type: "create".to_string(),
            data: r#"{"message": "created"}"#.to_string(),
        };

        assert!(matches!(
            process_event(&sink, &event).await,
            EventOutcome::SkippedTransform
        ));
        assert!(sink.docs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_event_does_not_halt_the_stream() {
        let sink = MemorySink::default();
        let events = vec![
            valid_event("1700000000000-0"),
            RawEvent {
                id: "1700000000001-0".to_string(),
                event_type: "update".to_string(),
                data: "{broken".to_string(),
            },
            valid_event("1700000000002-0"),
        ];

        for event in &events {
            process_event(&sink, event).await;
        }

        // First and third are indexed, in order; the middle one is gone.
        let order = sink.write_order.lock().unwrap().clone();
        assert_eq!(order, vec!["1700000000000-0", "1700000000002-0"]);
        assert_eq!(sink.docs.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn index_rejection_does_not_halt_the_stream() {
        let sink = RejectingSink {
            inner: MemorySink::default(),
            reject_id: "1700000000001-0".to_string(),
        };
        let events = vec![
            valid_event("1700000000000-0"),
            valid_event("1700000000001-0"),
            valid_event("1700000000002-0"),
        ];

        let mut outcomes = Vec::new();
        for event in &events {
            outcomes.push(process_event(&sink, event).await);
        }

        assert!(matches!(outcomes[0], EventOutcome::Indexed));
        assert!(matches!(outcomes[1], EventOutcome::SkippedIndex));
        assert!(matches!(outcomes[2], EventOutcome::Indexed));

        let order = sink.inner.write_order.lock().unwrap().clone();
        assert_eq!(order, vec!["1700000000000-0", "1700000000002-0"]);
    }

    #[tokio::test]
    async fn stored_document_matches_canonical_shape() {
        let sink = MemorySink::default();
        let event = RawEvent {
            id: "1700000000000-5".to_string(),
            event_type: "create".to_string(),
            data: r#"{"data": {"type": "Report", "x_opencti_id": "r1"}, "message": "created"}"#
                .to_string(),
        };
        process_event(&sink, &event).await;

        let docs = sink.docs.lock().unwrap();
        let doc = &docs["1700000000000-5"];
        assert_eq!(doc["timestamp"], "2023-11-14T22:13:20Z");
        assert_eq!(doc["entity_type"], "history");
        assert!(doc["user_id"].is_null());
        assert_eq!(doc["context_data"]["id"], "r1");
    }
}
