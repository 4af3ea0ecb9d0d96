//! Error types for event transformation.

use thiserror::Error;

/// Errors produced while mapping a raw stream event to a history record.
///
/// Transform failures are permanent for a given event: the payload will not
/// self-correct on redelivery, so callers skip the event rather than retry.
#[derive(Error, Debug)]
pub enum TransformError {
    /// A mandatory payload field is absent (or JSON `null`).
    #[error("missing mandatory field '{field}'")]
    MissingField {
        /// Dotted path of the missing field.
        field: &'static str,
    },

    /// The event id does not carry a parsable millisecond timestamp prefix.
    #[error("cannot derive timestamp from event id '{id}': {reason}")]
    Timestamp {
        /// The offending event id.
        id: String,
        /// Description of what's wrong.
        reason: String,
    },

    /// The payload is not valid JSON, or a field has the wrong type.
    #[error("payload JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
