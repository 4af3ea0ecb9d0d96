//! Error types for the ingestion pipeline.

use chronicle_core::TransformError;
use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// The event payload is structurally invalid. Permanent for the event.
    #[error("transform error: {0}")]
    Transform(#[from] TransformError),

    /// The backing index rejected the write.
    #[error("index rejected document (HTTP {status}): {body}")]
    Index {
        /// HTTP status returned by the store.
        status: u16,
        /// Response body, for operator diagnosis.
        body: String,
    },

    /// HTTP transport error talking to the store.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// Loss of the stream subscription. Fatal to the worker instance.
    #[error("stream connection error: {0}")]
    Stream(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Channel send error.
    #[error("channel send error: {0}")]
    ChannelSend(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
