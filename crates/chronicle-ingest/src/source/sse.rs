//! Live event-stream source adapter.
//!
//! Subscribes to the platform's change-event feed over HTTP server-sent
//! events (`text/event-stream`) and delivers each event to the handler in
//! arrival order.
//!
//! # Resume cursor
//!
//! The id of the last delivered event is sent as the `Last-Event-ID`
//! request header on connect, so a restarted worker resumes where the
//! previous one stopped. The current cursor is available via
//! [`SseSource::cursor`] and in the returned
//! [`SourceStats`](super::SourceStats) for the supervisor to persist.
//!
//! # Failure model
//!
//! A handler error for one event is logged and the stream proceeds to the
//! next event. Loss of the subscription itself (transport error, server
//! EOF, non-2xx response) is fatal to the worker and surfaces as
//! [`Error::Stream`] from `run`, for the hosting process to restart.

use super::{EventSource, RawEvent, SourceMetadata, SourceStats};
use crate::{Error, Result};

use futures::StreamExt;
use metrics::gauge;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Configuration for the live stream source.
#[derive(Debug, Clone)]
pub struct SseConfig {
    /// Stream endpoint URL (e.g. "http://platform:4000/stream").
    pub url: String,

    /// Bearer token for the platform handshake.
    pub token: Option<String>,

    /// Resume cursor: id of the last event a previous run delivered.
    pub last_event_id: Option<String>,

    /// TCP connect timeout. No overall request timeout is set — the
    /// response body is an unbounded stream.
    pub connect_timeout: Duration,
}

impl Default for SseConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4000/stream".to_string(),
            token: None,
            last_event_id: None,
            connect_timeout: Duration::from_secs(30),
        }
    }
}

/// Live event-stream source.
pub struct SseSource {
    config: SseConfig,
    /// Running flag for graceful shutdown.
    running: Arc<AtomicBool>,
    /// Statistics counters.
    stats: Arc<SseStats>,
    /// Id of the last event delivered to the handler.
    cursor: Mutex<Option<String>>,
}

/// Internal statistics for the stream source.
#[derive(Default)]
struct SseStats {
    total_events: AtomicUsize,
    delivered_events: AtomicUsize,
    invalid_frames: AtomicUsize,
}

impl SseSource {
    /// Create a new stream source with the given configuration.
    pub fn new(config: SseConfig) -> Self {
        let cursor = config.last_event_id.clone();
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SseStats::default()),
            cursor: Mutex::new(cursor),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SseConfig {
        &self.config
    }

    /// Signal the source to stop after the in-flight event completes.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if the source is currently running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Id of the last delivered event, for persisting as a resume cursor.
    pub fn cursor(&self) -> Option<String> {
        self.cursor.lock().unwrap().clone()
    }

    /// Run the stream source asynchronously.
    ///
    /// This is the main async implementation that the sync [`EventSource`]
    /// `run` method wraps. Blocks until the handler signals stop, [`stop`]
    /// is called, or the subscription is lost.
    ///
    /// [`stop`]: Self::stop
    pub async fn run_async<F>(&self, mut handler: F) -> Result<SourceStats>
    where
        F: FnMut(RawEvent) -> Result<bool>,
    {
        self.running.store(true, Ordering::SeqCst);

        tracing::info!(
            url = %self.config.url,
            resume_from = self.config.last_event_id.as_deref().unwrap_or("live"),
            "connecting to event stream"
        );

        let client = reqwest::Client::builder()
            .connect_timeout(self.config.connect_timeout)
            .build()?;

        let mut request = client
            .get(&self.config.url)
            .header(reqwest::header::ACCEPT, "text/event-stream");

        if let Some(token) = &self.config.token {
            request = request.bearer_auth(token);
        }
        if let Some(cursor) = &self.config.last_event_id {
            request = request.header("Last-Event-ID", cursor.as_str());
        }

        let response = request.send().await.map_err(|e| {
            Error::Stream(format!("failed to connect to {}: {e}", self.config.url))
        })?;

        if !response.status().is_success() {
            return Err(Error::Stream(format!(
                "stream endpoint {} returned HTTP {}",
                self.config.url,
                response.status()
            )));
        }

        gauge!("stream_connected").set(1.0);
        tracing::info!("event stream subscription established");

        let mut body = response.bytes_stream();
        let mut parser = FrameParser::default();
        let mut event_count = 0usize;
        let progress_interval = 10_000;

        let disconnect = 'outer: loop {
            if !self.running.load(Ordering::SeqCst) {
                break None;
            }

            // Poll with a timeout so the running flag is observed even when
            // the stream is quiet.
            let chunk = match tokio::time::timeout(Duration::from_secs(1), body.next()).await {
                Err(_) => continue,
                Ok(None) => break Some("event stream closed by server".to_string()),
                Ok(Some(Err(e))) => break Some(format!("transport error: {e}")),
                Ok(Some(Ok(chunk))) => chunk,
            };

            for frame in parser.push(&chunk) {
                self.stats.total_events.fetch_add(1, Ordering::Relaxed);

                let Some(id) = frame.id else {
                    // A frame without an id cannot be keyed downstream.
                    tracing::debug!("dropping stream frame without an id");
                    self.stats.invalid_frames.fetch_add(1, Ordering::Relaxed);
                    continue;
                };

                let event = RawEvent {
                    id: id.clone(),
                    // "message" is the SSE default when no event field is sent.
                    event_type: frame.event.unwrap_or_else(|| "message".to_string()),
                    data: frame.data.join("\n"),
                };

                self.stats.delivered_events.fetch_add(1, Ordering::Relaxed);
                *self.cursor.lock().unwrap() = Some(id);
                event_count += 1;

                // Per-event failures never tear down the subscription.
                match handler(event) {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::info!("handler signaled stop");
                        break 'outer None;
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "handler error");
                    }
                }

                if event_count.is_multiple_of(progress_interval) {
                    tracing::info!("received {} events", event_count);
                }
            }
        };

        gauge!("stream_connected").set(0.0);
        self.running.store(false, Ordering::SeqCst);

        match disconnect {
            Some(reason) => Err(Error::Stream(reason)),
            None => Ok(self.build_stats()),
        }
    }

    /// Build statistics from the current state.
    fn build_stats(&self) -> SourceStats {
        SourceStats {
            total_events: self.stats.total_events.load(Ordering::Relaxed),
            delivered_events: self.stats.delivered_events.load(Ordering::Relaxed),
            parse_errors: self.stats.invalid_frames.load(Ordering::Relaxed),
            source_metadata: SourceMetadata {
                last_event_id: self.cursor(),
                ..Default::default()
            },
        }
    }
}

impl EventSource for SseSource {
    fn name(&self) -> &'static str {
        "sse"
    }

    fn run<F>(&mut self, handler: F) -> Result<SourceStats>
    where
        F: FnMut(RawEvent) -> Result<bool>,
    {
        // Create a tokio runtime for the async implementation.
        let rt = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(Error::Io)?;

        rt.block_on(self.run_async(handler))
    }
}

/// One parsed server-sent event.
#[derive(Debug, Clone, Default, PartialEq)]
struct SseFrame {
    id: Option<String>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseFrame {
    fn is_empty(&self) -> bool {
        self.id.is_none() && self.event.is_none() && self.data.is_empty()
    }
}

/// Incremental `text/event-stream` parser.
///
/// Bytes arrive in arbitrary chunk boundaries; complete lines are consumed
/// as they appear and a blank line dispatches the accumulated frame.
/// Comment lines (heartbeats) and unknown fields are ignored.
#[derive(Default)]
struct FrameParser {
    buf: Vec<u8>,
    current: SseFrame,
}

impl FrameParser {
    /// Feed a chunk of bytes, returning any frames completed by it.
    fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.buf.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(newline) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=newline).collect();
            let mut line = String::from_utf8_lossy(&raw[..raw.len() - 1]).into_owned();
            if line.ends_with('\r') {
                line.pop();
            }
            self.handle_line(&line, &mut frames);
        }
        frames
    }

    fn handle_line(&mut self, line: &str, frames: &mut Vec<SseFrame>) {
        if line.is_empty() {
            // Blank line dispatches the frame; consecutive blanks are noise.
            if !self.current.is_empty() {
                frames.push(std::mem::take(&mut self.current));
            }
            return;
        }

        if line.starts_with(':') {
            // Comment line, used by servers as a keep-alive heartbeat.
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "id" => self.current.id = Some(value.to_string()),
            "event" => self.current.event = Some(value.to_string()),
            "data" => self.current.data.push(value.to_string()),
            // "retry" and vendor fields are not used by this consumer.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &[u8]) -> Vec<SseFrame> {
        FrameParser::default().push(input)
    }

    #[test]
    fn parses_single_frame() {
        let frames = parse_all(b"id: 1700000000000-0\nevent: create\ndata: {\"a\":1}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id.as_deref(), Some("1700000000000-0"));
        assert_eq!(frames[0].event.as_deref(), Some("create"));
        assert_eq!(frames[0].data, vec!["{\"a\":1}"]);
    }

    #[test]
    fn joins_multiple_data_lines() {
        let frames = parse_all(b"id: 1\ndata: first\ndata: second\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data.join("\n"), "first\nsecond");
    }

    #[test]
    fn tolerates_crlf_line_endings() {
        let frames = parse_all(b"id: 1\r\nevent: update\r\ndata: {}\r\n\r\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event.as_deref(), Some("update"));
    }

    #[test]
    fn ignores_heartbeat_comments() {
        let frames = parse_all(b": ping\n\n: ping\n\nid: 1\ndata: {}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id.as_deref(), Some("1"));
    }

    #[test]
    fn handles_chunk_split_mid_line() {
        let mut parser = FrameParser::default();
        assert!(parser.push(b"id: 17000").is_empty());
        assert!(parser.push(b"00000000-5\ndata: {\"x\"").is_empty());
        let frames = parser.push(b":2}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].id.as_deref(), Some("1700000000000-5"));
        assert_eq!(frames[0].data, vec!["{\"x\":2}"]);
    }

    #[test]
    fn splits_consecutive_frames() {
        let frames = parse_all(b"id: 1\ndata: a\n\nid: 2\ndata: b\n\n");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].id.as_deref(), Some("1"));
        assert_eq!(frames[1].id.as_deref(), Some("2"));
    }

    #[test]
    fn field_without_colon_is_a_bare_name() {
        // Per the SSE grammar, "data" alone means an empty data value.
        let frames = parse_all(b"id: 1\ndata\n\n");
        assert_eq!(frames[0].data, vec![""]);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let frames = parse_all(b"id: 1\nretry: 3000\nwhatever: x\ndata: {}\n\n");
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].data, vec!["{}"]);
    }

    #[test]
    fn incomplete_frame_is_held_back() {
        let mut parser = FrameParser::default();
        assert!(parser.push(b"id: 1\ndata: {}\n").is_empty());
        // Only the terminating blank line dispatches it.
        assert_eq!(parser.push(b"\n").len(), 1);
    }
}
