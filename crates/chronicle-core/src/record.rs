//! Wire payload model and the canonical history record.
//!
//! [`EventPayload`] is a tolerant serde view of the loosely-structured JSON
//! document carried by each stream event: every field the platform may omit
//! is an `Option`, and unknown keys are ignored. A key that is present but
//! holds the wrong type fails deserialization, which the transformer reports
//! as a [`TransformError::Json`](crate::TransformError::Json).
//!
//! [`HistoryRecord`] is the canonical output document, one per event,
//! serialized field-for-field into the backing index. `Option` fields
//! serialize as JSON `null` so the stored document shape is stable.

use serde::{Deserialize, Serialize};

/// Record-kind discriminator stored on every history record.
///
/// Distinct from the *subject* entity type inside [`RecordContext`].
pub const HISTORY_ENTITY_TYPE: &str = "history";

/// The semi-structured payload of one stream event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPayload {
    /// The changed subject. Mandatory at transform time.
    #[serde(default)]
    pub data: Option<SubjectData>,

    /// Human-readable change description. Mandatory at transform time.
    #[serde(default)]
    pub message: Option<String>,

    /// Actor metadata; absent for system-initiated changes.
    #[serde(default)]
    pub origin: Option<EventOrigin>,

    /// Free-form commit message, only meaningful for certain event types.
    #[serde(default)]
    pub commit_message: Option<String>,

    /// External references attached to the commit.
    #[serde(default)]
    pub commit_references: Option<Vec<String>>,
}

/// The subject of a change event, as embedded in the payload's `data` object.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubjectData {
    /// Entity type of the subject (e.g. "Report", "stix-core-relationship").
    #[serde(rename = "type", default)]
    pub entity_type: Option<String>,

    /// Internal identifier; preferred over [`standard_id`](Self::standard_id).
    #[serde(rename = "x_opencti_internal_id", default)]
    pub internal_id: Option<String>,

    /// Standard identifier; fallback when no internal id is present.
    #[serde(rename = "x_opencti_id", default)]
    pub standard_id: Option<String>,

    /// Source endpoint, populated only for relationship-type subjects.
    #[serde(rename = "x_opencti_source_ref", default)]
    pub source_ref: Option<String>,

    /// Target endpoint, populated only for relationship-type subjects.
    #[serde(rename = "x_opencti_target_ref", default)]
    pub target_ref: Option<String>,
}

/// Actor metadata identifying who triggered a change event.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventOrigin {
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub applicant_id: Option<String>,
}

/// Canonical audit entry, one per successfully transformed stream event.
///
/// `internal_id` doubles as the store's primary key, which makes redelivery
/// of the same event a replace rather than a duplicate.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRecord {
    /// The stream-assigned event id (`"<ms-since-epoch>-<sequence>"`).
    pub internal_id: String,

    /// Change kind (create, update, delete, merge).
    pub event_type: String,

    /// UTC ISO-8601 timestamp derived from the event id, `Z` suffix.
    pub timestamp: String,

    /// Always [`HISTORY_ENTITY_TYPE`].
    pub entity_type: String,

    pub user_id: Option<String>,
    pub applicant_id: Option<String>,

    pub context_data: RecordContext,
}

/// Subject context carried inside a [`HistoryRecord`].
#[derive(Debug, Clone, Serialize)]
pub struct RecordContext {
    /// Subject identifier (internal id preferred over standard id).
    pub id: String,

    /// Entity type of the subject.
    pub entity_type: String,

    pub from_id: Option<String>,
    pub to_id: Option<String>,

    /// Human-readable change description.
    pub message: String,

    pub commit_message: Option<String>,
    pub commit_references: Option<Vec<String>>,
}
