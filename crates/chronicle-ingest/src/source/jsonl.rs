//! JSONL replay source adapter.
//!
//! Reads captured stream dumps (one JSON envelope per line) and feeds them
//! through the same pipeline as the live source, for backfill after an
//! outage and for testing. Envelope shape:
//!
//! ```json
//! {"id": "1700000000000-5", "event": "create", "data": {...}}
//! ```

use super::{EventSource, RawEvent, SourceMetadata, SourceStats};
use crate::{Error, Result};
use metrics::counter;
use serde::Deserialize;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;

/// Configuration for the JSONL replay source.
#[derive(Debug, Clone)]
pub struct JsonlConfig {
    /// Input file or directory path.
    pub input: PathBuf,

    /// Continue processing on errors (log and skip invalid lines).
    pub continue_on_error: bool,

    /// Limit number of files to process (for testing).
    pub limit: Option<usize>,

    /// Progress reporting interval (events).
    pub progress_interval: usize,
}

impl Default for JsonlConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::new(),
            continue_on_error: true,
            limit: None,
            progress_interval: 100_000,
        }
    }
}

/// One line of a captured stream dump.
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "event")]
    event_type: String,
    data: serde_json::Value,
}

/// JSONL replay source.
pub struct JsonlSource {
    config: JsonlConfig,
}

impl JsonlSource {
    /// Create a new replay source with the given configuration.
    pub fn new(config: JsonlConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &JsonlConfig {
        &self.config
    }

    /// Collect files to process based on input path.
    fn collect_files(&self) -> Result<Vec<PathBuf>> {
        let input = &self.config.input;
        let mut files = Vec::new();

        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            let mut entries: Vec<_> = fs::read_dir(input)?
                .filter_map(|e| e.ok())
                .filter(|e| {
                    let path = e.path();
                    path.is_file()
                        && path
                            .extension()
                            .is_some_and(|ext| ext == "jsonl" || ext == "json" || ext == "ndjson")
                })
                .map(|e| e.path())
                .collect();

            // Sort for deterministic processing order
            entries.sort();
            files = entries;
        } else {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Input path does not exist: {}", input.display()),
            )));
        }

        if let Some(limit) = self.config.limit {
            files.truncate(limit);
        }

        Ok(files)
    }

    /// Process a single JSONL file.
    fn process_file<F>(
        &self,
        file_path: &PathBuf,
        handler: &mut F,
        stats: &mut JsonlStats,
    ) -> Result<bool>
    where
        F: FnMut(RawEvent) -> Result<bool>,
    {
        let file = File::open(file_path)?;
        let reader = BufReader::new(file);

        for (line_num, line_result) in reader.lines().enumerate() {
            stats.total_lines += 1;
            counter!("replay_lines_total").increment(1);

            let line = match line_result {
                Ok(l) => l,
                Err(e) => {
                    tracing::warn!("Line {}: I/O error: {}", line_num + 1, e);
                    stats.parse_errors += 1;
                    counter!("replay_parse_errors_total").increment(1);
                    if self.config.continue_on_error {
                        continue;
                    } else {
                        return Err(Error::Io(e));
                    }
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            stats.total_events += 1;

            let envelope = match serde_json::from_str::<EventEnvelope>(&line) {
                Ok(envelope) => envelope,
                Err(e) => {
                    tracing::warn!("Line {}: JSON parse error: {}", line_num + 1, e);
                    stats.parse_errors += 1;
                    counter!("replay_parse_errors_total").increment(1);
                    if self.config.continue_on_error {
                        continue;
                    } else {
                        return Err(Error::Json(e));
                    }
                }
            };

            let event = RawEvent {
                id: envelope.id,
                event_type: envelope.event_type,
                data: envelope.data.to_string(),
            };

            stats.delivered_events += 1;

            match handler(event) {
                Ok(true) => {}
                Ok(false) => {
                    tracing::info!("Handler signaled stop");
                    return Ok(false);
                }
                Err(e) => {
                    if self.config.continue_on_error {
                        tracing::warn!("Handler error: {}", e);
                    } else {
                        return Err(e);
                    }
                }
            }

            if stats.total_events.is_multiple_of(self.config.progress_interval) {
                tracing::info!(
                    "Progress: {} events, {} delivered, {} parse errors",
                    stats.total_events,
                    stats.delivered_events,
                    stats.parse_errors
                );
            }
        }

        Ok(true)
    }
}

impl EventSource for JsonlSource {
    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn run<F>(&mut self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(RawEvent) -> Result<bool>,
    {
        let mut stats = JsonlStats::default();

        let files = self.collect_files()?;
        tracing::info!("Found {} JSONL files to replay", files.len());

        for (file_idx, file_path) in files.iter().enumerate() {
            tracing::info!(
                "[{}/{}] Replaying: {}",
                file_idx + 1,
                files.len(),
                file_path.display()
            );

            let file_size = fs::metadata(file_path)?.len() as usize;
            stats.total_bytes += file_size;

            match self.process_file(file_path, &mut handler, &mut stats) {
                Ok(true) => {
                    stats.files_processed += 1;
                }
                Ok(false) => {
                    // Handler signaled stop
                    stats.files_processed += 1;
                    break;
                }
                Err(e) => {
                    tracing::warn!("Error replaying {}: {}", file_path.display(), e);
                    if !self.config.continue_on_error {
                        return Err(e);
                    }
                }
            }
        }

        Ok(SourceStats {
            total_events: stats.total_events,
            delivered_events: stats.delivered_events,
            parse_errors: stats.parse_errors,
            source_metadata: SourceMetadata {
                files_processed: Some(stats.files_processed),
                bytes_read: Some(stats.total_bytes),
                ..Default::default()
            },
        })
    }
}

/// Internal statistics for JSONL processing.
#[derive(Default)]
struct JsonlStats {
    files_processed: usize,
    total_lines: usize,
    total_events: usize,
    delivered_events: usize,
    parse_errors: usize,
    total_bytes: usize,
}
