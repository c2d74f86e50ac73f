//! Field inclusion policy for structured log payloads
//!
//! A field is included when its configuration flag says so and the raw event
//! actually carries it. Without a usable flag, presence alone decides.

use crate::error::{AuditError, Result};
use crate::normalize::parse_bool;
use crate::types::{fields, FieldMappingEntry, Payload, RawEvent};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Payload key that always leads a structured payload
pub const EVENT_TIME_KEY: &str = "eventTime";

/// String-keyed configuration lookup
pub trait ConfigSource: Send + Sync {
    /// Raw configuration value for a key, if any
    fn get(&self, key: &str) -> Option<&str>;
}

impl ConfigSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }
}

impl ConfigSource for BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        BTreeMap::get(self, key).map(String::as_str)
    }
}

/// Decide whether a raw field goes into the structured payload
///
/// | config flag      | raw field | result |
/// |------------------|-----------|--------|
/// | `true`/`false`   | present   | flag   |
/// | `true`/`false`   | absent    | false  |
/// | unset / not bool | present   | true   |
/// | unset / not bool | absent    | false  |
pub fn should_include(
    config_field: &str,
    raw_field: &str,
    event: &RawEvent,
    config: &dyn ConfigSource,
) -> bool {
    let present = event.contains(raw_field);
    match config.get(config_field).and_then(parse_bool) {
        Some(flag) => present && flag,
        None => present,
    }
}

/// Build the ordered structured payload for one raw event
///
/// `eventTime` comes first, copied verbatim from `event_time`; mapped fields
/// follow in mapping order. A target key that is already in the payload,
/// including a mapping target named `eventTime`, keeps its first value: the
/// later entry is dropped with a warning and the event is not rejected.
pub fn build_payload(
    mapping: &[FieldMappingEntry],
    event: &RawEvent,
    config: &dyn ConfigSource,
) -> Result<Payload> {
    let event_time = event
        .get(fields::EVENT_TIME)
        .ok_or_else(|| AuditError::field(fields::EVENT_TIME, "field is absent"))?;

    let mut payload = Payload::new();
    payload.insert(EVENT_TIME_KEY, event_time);

    for entry in mapping {
        if !should_include(&entry.target, &entry.source, event, config) {
            continue;
        }
        let Some(value) = event.get(&entry.source) else {
            continue;
        };
        if !payload.insert(entry.target.as_str(), value) {
            tracing::warn!(
                source = %entry.source,
                target = %entry.target,
                "Duplicate payload field skipped"
            );
        }
    }

    Ok(payload)
}

/// A field mapping bound to its configuration source
#[derive(Clone)]
pub struct FieldPolicy {
    mapping: Arc<[FieldMappingEntry]>,
    config: Arc<dyn ConfigSource>,
}

impl FieldPolicy {
    pub fn new(mapping: impl Into<Arc<[FieldMappingEntry]>>, config: Arc<dyn ConfigSource>) -> Self {
        Self {
            mapping: mapping.into(),
            config,
        }
    }

    /// Default mapping with no inclusion flags (presence decides)
    pub fn presence_only() -> Self {
        Self::new(
            FieldMappingEntry::defaults(),
            Arc::new(HashMap::<String, String>::new()),
        )
    }

    pub fn mapping(&self) -> &[FieldMappingEntry] {
        &self.mapping
    }

    /// `should_include` for one mapping entry
    pub fn includes(&self, entry: &FieldMappingEntry, event: &RawEvent) -> bool {
        should_include(&entry.target, &entry.source, event, self.config.as_ref())
    }

    /// `build_payload` over this policy's mapping and config
    pub fn payload(&self, event: &RawEvent) -> Result<Payload> {
        build_payload(&self.mapping, event, self.config.as_ref())
    }
}

impl std::fmt::Debug for FieldPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldPolicy")
            .field("mapping", &self.mapping)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn event_with_statement() -> RawEvent {
        RawEvent::new("audit_event")
            .with_field("event_time", "2024-01-01T00:00:00Z")
            .with_field("statement", "SELECT 1")
    }

    #[test]
    fn test_should_include_truth_table() {
        let present = event_with_statement();
        let absent = RawEvent::new("audit_event");

        let on = config(&[("statement", "true")]);
        let off = config(&[("statement", "false")]);
        let unset = config(&[]);
        let garbage = config(&[("statement", "not-a-bool")]);

        assert!(should_include("statement", "statement", &present, &on));
        assert!(!should_include("statement", "statement", &absent, &on));
        assert!(!should_include("statement", "statement", &present, &off));
        assert!(should_include("statement", "statement", &present, &unset));
        assert!(!should_include("statement", "statement", &absent, &unset));
        assert!(should_include("statement", "statement", &present, &garbage));
        assert!(!should_include("statement", "statement", &absent, &garbage));
        assert!(!should_include("statement", "statement", &absent, &off));
    }

    #[test]
    fn test_should_include_flag_is_case_insensitive() {
        let present = event_with_statement();
        assert!(!should_include(
            "statement",
            "statement",
            &present,
            &config(&[("statement", " False ")])
        ));
        assert!(should_include(
            "statement",
            "statement",
            &present,
            &config(&[("statement", "TRUE")])
        ));
    }

    #[test]
    fn test_build_payload_order_and_event_time_first() {
        let event = RawEvent::new("audit_event")
            .with_field("event_time", "2024-01-01 10:00:00")
            .with_field("statement", "SELECT 1")
            .with_field("action_id", "SL")
            .with_field("object_name", "orders");

        let mapping = vec![
            FieldMappingEntry::new("object_name", "objectName"),
            FieldMappingEntry::new("statement", "statement"),
            FieldMappingEntry::new("missing_field", "missing"),
            FieldMappingEntry::new("action_id", "actionId"),
        ];

        let payload = build_payload(&mapping, &event, &config(&[])).unwrap();
        assert_eq!(
            payload.keys().collect::<Vec<_>>(),
            vec!["eventTime", "objectName", "statement", "actionId"]
        );
        assert_eq!(payload.get("eventTime"), Some("2024-01-01 10:00:00"));
        assert_eq!(payload.get("objectName"), Some("orders"));
    }

    #[test]
    fn test_build_payload_empty_mapping_still_has_event_time() {
        let payload = build_payload(&[], &event_with_statement(), &config(&[])).unwrap();
        assert_eq!(payload.len(), 1);
        assert_eq!(payload.keys().next(), Some("eventTime"));
    }

    #[test]
    fn test_build_payload_respects_flags() {
        let mapping = vec![FieldMappingEntry::new("statement", "statement")];
        let payload = build_payload(
            &mapping,
            &event_with_statement(),
            &config(&[("statement", "false")]),
        )
        .unwrap();
        assert!(!payload.contains("statement"));
    }

    #[test]
    fn test_build_payload_event_time_is_verbatim() {
        let event = event_with_statement().with_field("event_time", "garbage");
        let payload = build_payload(&[], &event, &config(&[])).unwrap();
        assert_eq!(payload.get("eventTime"), Some("garbage"));
    }

    #[test]
    fn test_build_payload_requires_event_time() {
        let event = RawEvent::new("audit_event").with_field("statement", "SELECT 1");
        let err = build_payload(&[], &event, &config(&[])).unwrap_err();
        assert_eq!(err.field_name(), Some("event_time"));
    }

    #[test]
    fn test_build_payload_skips_duplicate_targets() {
        let event = event_with_statement().with_field("action_id", "SL");
        let mapping = vec![
            FieldMappingEntry::new("statement", "text"),
            FieldMappingEntry::new("action_id", "text"),
            FieldMappingEntry::new("action_id", "eventTime"),
        ];
        let payload = build_payload(&mapping, &event, &config(&[])).unwrap();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.get("text"), Some("SELECT 1"));
        assert_eq!(payload.get("eventTime"), Some("2024-01-01T00:00:00Z"));
    }

    #[test]
    fn test_field_policy_bundle() {
        let policy = FieldPolicy::new(
            vec![FieldMappingEntry::new("statement", "statement")],
            Arc::new(config(&[("statement", "false")])),
        );
        let event = event_with_statement();
        assert!(!policy.includes(&policy.mapping()[0], &event));
        assert_eq!(policy.payload(&event).unwrap().len(), 1);

        let open = FieldPolicy::presence_only();
        let payload = open.payload(&event).unwrap();
        assert_eq!(payload.get("statement"), Some("SELECT 1"));
    }
}
