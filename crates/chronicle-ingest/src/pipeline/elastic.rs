//! Elasticsearch indexer for history records.
//!
//! This module provides the [`ElasticIndexer`] which upserts history
//! records into an Elasticsearch-compatible store over its REST API.
//!
//! # Idempotence
//!
//! `upsert` issues a full document PUT keyed by the record's
//! `internal_id`. Re-processing the same stream event (at-least-once
//! redelivery) replaces the document rather than duplicating it, and a
//! redelivery carrying an updated payload converges to the latest write.
//!
//! # Threading
//!
//! [`ElasticIndexer::start`] spawns a background thread that consumes
//! records from a channel, preserving arrival order with a single
//! consumer. Per-record failures are logged with the offending id and
//! never stop the thread; redelivery, if any, belongs to the stream
//! collaborator's guarantees.

use crate::{Error, Result};
use chronicle_core::HistoryRecord;
use crossbeam_channel::Receiver;
use metrics::{counter, gauge, histogram};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Authentication mode for the backing store, mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// HTTP basic auth.
    Basic { username: String, password: String },
    /// Elasticsearch API key (sent as `Authorization: ApiKey <key>`).
    ApiKey(String),
    /// Unauthenticated.
    None,
}

/// Configuration for the Elasticsearch indexer.
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    /// Store URL (e.g., "http://localhost:9200").
    pub url: String,

    /// Index name for history records.
    pub index: String,

    /// Verify TLS certificates. Disable only for self-signed test clusters.
    pub verify_tls: bool,

    /// Authentication mode.
    pub auth: AuthMode,

    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:9200".to_string(),
            index: "history".to_string(),
            verify_tls: true,
            auth: AuthMode::None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Elasticsearch indexer that upserts history records by event id.
pub struct ElasticIndexer {
    client: Client,
    config: ElasticConfig,
    running: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

#[derive(Default)]
struct Counters {
    records_indexed: AtomicUsize,
    index_errors: AtomicUsize,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

impl ElasticIndexer {
    /// Create a new indexer with a long-lived HTTP client.
    pub fn new(config: ElasticConfig) -> Result<Self> {
        let mut builder = Client::builder().timeout(config.request_timeout);
        if !config.verify_tls {
            builder = builder.danger_accept_invalid_certs(true);
        }
        let client = builder.build()?;

        tracing::info!(
            url = %config.url,
            index = %config.index,
            verify_tls = config.verify_tls,
            auth = match &config.auth {
                AuthMode::Basic { .. } => "basic",
                AuthMode::ApiKey(_) => "api-key",
                AuthMode::None => "none",
            },
            "Elasticsearch indexer initialized"
        );

        Ok(Self {
            client,
            config,
            running: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        })
    }

    /// Start the indexer, consuming records from the channel.
    ///
    /// This runs in a background thread until `stop()` is called or the
    /// sending side of the channel is dropped (remaining records are
    /// drained first).
    pub fn start(&self, receiver: Receiver<HistoryRecord>) -> thread::JoinHandle<()> {
        let client = self.client.clone();
        let config = self.config.clone();
        let running = Arc::clone(&self.running);
        let counters = Arc::clone(&self.counters);

        self.running.store(true, Ordering::SeqCst);

        thread::spawn(move || {
            tracing::info!("indexer thread started");

            // Upserts are sequential; a single-threaded runtime is enough.
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("Failed to create tokio runtime");

            while running.load(Ordering::SeqCst) {
                match receiver.recv_timeout(Duration::from_secs(1)) {
                    Ok(record) => {
                        gauge!("indexer_queue_depth").set(receiver.len() as f64);

                        if let Err(e) =
                            rt.block_on(Self::do_upsert(&client, &config, &counters, &record))
                        {
                            // Logged and dropped: the stream collaborator owns
                            // redelivery, this worker must keep consuming.
                            tracing::error!(
                                record_id = %record.internal_id,
                                error = %e,
                                "failed to index history record"
                            );
                        }
                    }
                    Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                        tracing::info!("record channel disconnected, stopping indexer");
                        break;
                    }
                }
            }

            tracing::info!("indexer thread stopped");
        })
    }

    /// Stop the indexer thread.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Upsert one history record, replacing any document with the same id.
    pub async fn upsert(&self, record: &HistoryRecord) -> Result<()> {
        Self::do_upsert(&self.client, &self.config, &self.counters, record).await
    }

    async fn do_upsert(
        client: &Client,
        config: &ElasticConfig,
        counters: &Counters,
        record: &HistoryRecord,
    ) -> Result<()> {
        let url = doc_url(&config.url, &config.index, &record.internal_id);
        let started = Instant::now();

        let request = Self::authorize(client.put(&url), &config.auth).json(record);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                counters.index_errors.fetch_add(1, Ordering::Relaxed);
                counter!("elastic_index_errors_total").increment(1);
                return Err(e.into());
            }
        };

        histogram!("elastic_upsert_duration_seconds").record(started.elapsed().as_secs_f64());

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            counters.index_errors.fetch_add(1, Ordering::Relaxed);
            counter!("elastic_index_errors_total").increment(1);
            return Err(Error::Index {
                status: status.as_u16(),
                body,
            });
        }

        counters.records_indexed.fetch_add(1, Ordering::Relaxed);
        counter!("elastic_records_indexed_total").increment(1);

        Ok(())
    }

    fn authorize(
        request: reqwest::RequestBuilder,
        auth: &AuthMode,
    ) -> reqwest::RequestBuilder {
        match auth {
            AuthMode::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
            AuthMode::ApiKey(key) => {
                request.header(reqwest::header::AUTHORIZATION, format!("ApiKey {key}"))
            }
            AuthMode::None => request,
        }
    }

    /// Get statistics about the indexer.
    pub fn stats(&self) -> IndexerStats {
        IndexerStats {
            records_indexed: self.counters.records_indexed.load(Ordering::Relaxed),
            index_errors: self.counters.index_errors.load(Ordering::Relaxed),
            is_running: self.running.load(Ordering::Relaxed),
        }
    }

    /// Check if the store is reachable.
    pub async fn health_check(&self) -> Result<bool> {
        let request = Self::authorize(self.client.get(&self.config.url), &self.config.auth);
        let response = request.send().await?;
        Ok(response.status().is_success())
    }

    /// Get the count of history records in the index.
    pub async fn record_count(&self) -> Result<u64> {
        let url = format!(
            "{}/{}/_count",
            self.config.url.trim_end_matches('/'),
            self.config.index
        );
        let request = Self::authorize(self.client.get(&url), &self.config.auth);
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Index {
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let count: CountResponse = response.json().await?;
        Ok(count.count)
    }
}

/// Document URL for an upsert: `{url}/{index}/_doc/{id}`.
fn doc_url(base: &str, index: &str, id: &str) -> String {
    format!("{}/{}/_doc/{}", base.trim_end_matches('/'), index, id)
}

/// Statistics about the indexer.
#[derive(Debug, Clone)]
pub struct IndexerStats {
    /// Records upserted successfully.
    pub records_indexed: usize,

    /// Upserts that failed (logged and dropped).
    pub index_errors: usize,

    /// Whether the indexer thread is running.
    pub is_running: bool,
}
