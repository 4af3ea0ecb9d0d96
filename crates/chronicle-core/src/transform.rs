//! Pure mapping from raw stream events to canonical history records.
//!
//! [`transform`] performs no I/O and has no side effects, so it is safe to
//! replay the same event any number of times. Failures are permanent for a
//! given event: a malformed payload will look exactly the same on
//! redelivery, so callers log and skip instead of retrying.

use crate::error::TransformError;
use crate::record::{EventPayload, HISTORY_ENTITY_TYPE, HistoryRecord, RecordContext};

/// Derive the UTC ISO-8601 timestamp embedded in a stream event id.
///
/// Event ids have the form `"<ms-since-epoch>-<sequence>"`. The millisecond
/// prefix is rounded to whole seconds and rendered with a literal `Z`
/// suffix, never a numeric offset.
///
/// # Errors
///
/// Returns [`TransformError::Timestamp`] when the prefix is missing,
/// non-numeric, or outside the representable date range.
pub fn event_timestamp(id: &str) -> Result<String, TransformError> {
    // split() always yields at least one element; an id without '-' is
    // treated as a bare millisecond value.
    let prefix = id.split('-').next().unwrap_or_default();

    let millis: i64 = prefix.parse().map_err(|_| TransformError::Timestamp {
        id: id.to_string(),
        reason: format!("prefix '{prefix}' is not a millisecond timestamp"),
    })?;

    // Round to the nearest whole second; an exact half goes to the even
    // second (ties-to-even).
    let (quot, rem) = (millis.div_euclid(1000), millis.rem_euclid(1000));
    let secs = match rem.cmp(&500) {
        std::cmp::Ordering::Less => quot,
        std::cmp::Ordering::Greater => quot + 1,
        std::cmp::Ordering::Equal => quot + (quot & 1),
    };

    let date = chrono::DateTime::from_timestamp(secs, 0).ok_or_else(|| {
        TransformError::Timestamp {
            id: id.to_string(),
            reason: format!("{secs}s is outside the representable date range"),
        }
    })?;

    Ok(date.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}

/// Map one raw stream event to a [`HistoryRecord`].
///
/// `payload_json` is the event's UTF-8 payload document. Optional fields
/// follow present-and-non-null-else-null semantics; the mandatory fields are
/// `data`, `data.type`, `message`, and at least one subject identifier.
pub fn transform(
    id: &str,
    event_type: &str,
    payload_json: &str,
) -> Result<HistoryRecord, TransformError> {
    let payload: EventPayload = serde_json::from_str(payload_json)?;
    let timestamp = event_timestamp(id)?;

    let data = payload
        .data
        .as_ref()
        .ok_or(TransformError::MissingField { field: "data" })?;

    let subject_entity_type = data
        .entity_type
        .clone()
        .ok_or(TransformError::MissingField { field: "data.type" })?;

    let message = payload
        .message
        .clone()
        .ok_or(TransformError::MissingField { field: "message" })?;

    // The internal identifier wins when both are present.
    let subject_id = data
        .internal_id
        .clone()
        .or_else(|| data.standard_id.clone())
        .ok_or(TransformError::MissingField {
            field: "data.x_opencti_id",
        })?;

    let origin = payload.origin.as_ref();

    Ok(HistoryRecord {
        internal_id: id.to_string(),
        event_type: event_type.to_string(),
        timestamp,
        entity_type: HISTORY_ENTITY_TYPE.to_string(),
        user_id: origin.and_then(|o| o.user_id.clone()),
        applicant_id: origin.and_then(|o| o.applicant_id.clone()),
        context_data: RecordContext {
            id: subject_id,
            entity_type: subject_entity_type,
            from_id: data.source_ref.clone(),
            to_id: data.target_ref.clone(),
            message,
            commit_message: payload.commit_message.clone(),
            commit_references: payload.commit_references.clone(),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_from_millisecond_prefix() {
        assert_eq!(
            event_timestamp("1700000000000-5").unwrap(),
            "2023-11-14T22:13:20Z"
        );
    }

    #[test]
    fn timestamp_rounds_to_nearest_second() {
        // Below the half rounds down, above it rounds up.
        assert_eq!(
            event_timestamp("1700000000499-0").unwrap(),
            "2023-11-14T22:13:20Z"
        );
        assert_eq!(
            event_timestamp("1700000000501-0").unwrap(),
            "2023-11-14T22:13:21Z"
        );
    }

    #[test]
    fn timestamp_rounds_exact_half_to_even_second() {
        // 1700000000 is even: the 500ms tie stays put.
        assert_eq!(
            event_timestamp("1700000000500-0").unwrap(),
            "2023-11-14T22:13:20Z"
        );
        // 1700000001 is odd: the 500ms tie rounds up to the even second.
        assert_eq!(
            event_timestamp("1700000001500-0").unwrap(),
            "2023-11-14T22:13:22Z"
        );
    }

    #[test]
    fn timestamp_without_sequence_suffix() {
        assert_eq!(
            event_timestamp("1700000000000").unwrap(),
            "2023-11-14T22:13:20Z"
        );
    }

    #[test]
    fn timestamp_rejects_non_numeric_prefix() {
        let err = event_timestamp("abc-5").unwrap_err();
        assert!(matches!(err, TransformError::Timestamp { .. }));

        let err = event_timestamp("").unwrap_err();
        assert!(matches!(err, TransformError::Timestamp { .. }));
    }

    #[test]
    fn timestamp_rejects_out_of_range_value() {
        let err = event_timestamp("999999999999999999-0").unwrap_err();
        assert!(matches!(err, TransformError::Timestamp { .. }));
    }

    #[test]
    fn transform_full_payload() {
        let payload = r#"{
            "data": {
                "type": "stix-core-relationship",
                "x_opencti_internal_id": "rel-1",
                "x_opencti_source_ref": "src-1",
                "x_opencti_target_ref": "dst-1"
            },
            "message": "adds relationship",
            "origin": {"user_id": "u1", "applicant_id": "a1"},
            "commit_message": "bulk import",
            "commit_references": ["ref-1"]
        }"#;

        let record = transform("1700000000000-5", "create", payload).unwrap();
        assert_eq!(record.internal_id, "1700000000000-5");
        assert_eq!(record.event_type, "create");
        assert_eq!(record.timestamp, "2023-11-14T22:13:20Z");
        assert_eq!(record.entity_type, "history");
        assert_eq!(record.user_id.as_deref(), Some("u1"));
        assert_eq!(record.applicant_id.as_deref(), Some("a1"));
        assert_eq!(record.context_data.id, "rel-1");
        assert_eq!(record.context_data.entity_type, "stix-core-relationship");
        assert_eq!(record.context_data.from_id.as_deref(), Some("src-1"));
        assert_eq!(record.context_data.to_id.as_deref(), Some("dst-1"));
        assert_eq!(record.context_data.message, "adds relationship");
        assert_eq!(record.context_data.commit_message.as_deref(), Some("bulk import"));
    }

    #[test]
    fn transform_defaults_optional_fields() {
        let payload = r#"{"data": {"type": "Report", "x_opencti_id": "r1"}, "message": "created"}"#;
        let record = transform("1700000000000-1", "create", payload).unwrap();
        assert!(record.user_id.is_none());
        assert!(record.applicant_id.is_none());
        assert!(record.context_data.from_id.is_none());
        assert!(record.context_data.to_id.is_none());
        assert!(record.context_data.commit_message.is_none());
        assert!(record.context_data.commit_references.is_none());
        assert_eq!(record.context_data.id, "r1");
    }

    #[test]
    fn transform_prefers_internal_id() {
        let payload = r#"{
            "data": {"type": "Report", "x_opencti_internal_id": "A", "x_opencti_id": "B"},
            "message": "updated"
        }"#;
        let record = transform("1700000000000-2", "update", payload).unwrap();
        assert_eq!(record.context_data.id, "A");
    }

    #[test]
    fn transform_rejects_missing_data() {
        let err = transform("1700000000000-3", "create", r#"{"message": "created"}"#).unwrap_err();
        assert!(matches!(
            err,
            TransformError::MissingField { field: "data" }
        ));
    }

    #[test]
    fn transform_rejects_missing_subject_type() {
        let payload = r#"{"data": {"x_opencti_id": "r1"}, "message": "created"}"#;
        let err = transform("1700000000000-3", "create", payload).unwrap_err();
        assert!(matches!(
            err,
            TransformError::MissingField { field: "data.type" }
        ));
    }

    #[test]
    fn transform_rejects_missing_message() {
        let payload = r#"{"data": {"type": "Report", "x_opencti_id": "r1"}}"#;
        let err = transform("1700000000000-3", "create", payload).unwrap_err();
        assert!(matches!(
            err,
            TransformError::MissingField { field: "message" }
        ));
    }

    #[test]
    fn transform_rejects_missing_subject_id() {
        let payload = r#"{"data": {"type": "Report"}, "message": "created"}"#;
        let err = transform("1700000000000-3", "create", payload).unwrap_err();
        assert!(matches!(err, TransformError::MissingField { .. }));
    }

    #[test]
    fn transform_rejects_malformed_json() {
        let err = transform("1700000000000-3", "create", "{not json").unwrap_err();
        assert!(matches!(err, TransformError::Json(_)));
    }

    #[test]
    fn transform_rejects_unparsable_event_id() {
        let payload = r#"{"data": {"type": "Report", "x_opencti_id": "r1"}, "message": "m"}"#;
        let err = transform("bogus", "create", payload).unwrap_err();
        assert!(matches!(err, TransformError::Timestamp { .. }));
    }
}
