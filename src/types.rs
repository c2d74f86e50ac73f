//! Core audit types for the a3s-audit system
//!
//! All types use camelCase JSON serialization for wire compatibility.

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use indexmap::IndexMap;
use std::fmt;

/// Raw field names emitted by the SQL Server audit subsystem
pub mod fields {
    pub const EVENT_TIME: &str = "event_time";
    pub const CLASS_TYPE: &str = "class_type";
    pub const OBJECT_NAME: &str = "object_name";
    pub const DATABASE_NAME: &str = "database_name";
    pub const SESSION_ID: &str = "session_id";
    pub const STATEMENT: &str = "statement";
    pub const SEQUENCE_NUMBER: &str = "sequence_number";
    pub const SERVER_PRINCIPAL_NAME: &str = "server_principal_name";
    pub const TRANSACTION_ID: &str = "transaction_id";
    pub const OBJECT_ID: &str = "object_id";
    pub const DATABASE_PRINCIPAL_NAME: &str = "database_principal_name";
    pub const SERVER_INSTANCE_NAME: &str = "server_instance_name";
    pub const APPLICATION_NAME: &str = "application_name";
    pub const DURATION_MILLISECONDS: &str = "duration_milliseconds";
    pub const SCHEMA_NAME: &str = "schema_name";
    pub const SUCCEEDED: &str = "succeeded";
    pub const ACTION_ID: &str = "action_id";
    pub const CONNECTION_ID: &str = "connection_id";

    /// Every field read by normalization, in record order
    pub const ALL: [&str; 18] = [
        EVENT_TIME,
        CLASS_TYPE,
        OBJECT_NAME,
        DATABASE_NAME,
        SESSION_ID,
        STATEMENT,
        SEQUENCE_NUMBER,
        SERVER_PRINCIPAL_NAME,
        TRANSACTION_ID,
        OBJECT_ID,
        DATABASE_PRINCIPAL_NAME,
        SERVER_INSTANCE_NAME,
        APPLICATION_NAME,
        DURATION_MILLISECONDS,
        SCHEMA_NAME,
        SUCCEEDED,
        ACTION_ID,
        CONNECTION_ID,
    ];
}

/// A raw audit event as produced by the trace reader
///
/// Field values are untyped strings; nothing is validated until the event
/// is normalized or filtered.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawEvent {
    /// Extended event name (e.g., "audit_event")
    pub name: String,

    /// Timestamp recorded by the trace reader, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    /// Field name → raw value, in the order the trace reader produced them
    #[serde(default)]
    pub fields: IndexMap<String, String>,
}

impl RawEvent {
    /// Create an event with no fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timestamp: None,
            fields: IndexMap::new(),
        }
    }

    /// Create an event from (field, value) pairs
    pub fn from_fields<K, V>(name: impl Into<String>, fields: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            name: name.into(),
            timestamp: None,
            fields: fields
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Add a field
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Drop a field, keeping the order of the rest
    pub fn remove_field(&mut self, field: &str) -> Option<String> {
        self.fields.shift_remove(field)
    }

    /// Set the reader timestamp
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Look up a raw field value
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Whether the event carries the field at all
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }
}

/// A normalized, strongly-typed SQL Server audit record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    /// When the audited action happened; `UNSET_EVENT_TIME` if unparseable
    pub event_time: DateTime<Utc>,
    pub class_type: String,
    pub object_name: String,
    pub database_name: String,
    pub session_id: i32,
    pub statement: String,
    /// Opaque ordering token, kept as text
    pub sequence_number: String,
    pub server_principal_name: String,
    pub database_principal_name: String,
    pub server_instance_name: String,
    pub application_name: String,
    pub schema_name: String,
    pub transaction_id: i64,
    pub object_id: i32,
    pub duration_milliseconds: i64,
    pub succeeded: bool,
    pub action_id: String,
    pub connection_id: String,
}

impl AuditRecord {
    /// Sentinel stored in `event_time` when the raw value cannot be parsed
    pub const UNSET_EVENT_TIME: DateTime<Utc> = DateTime::<Utc>::MIN_UTC;

    /// Whether `event_time` holds a parsed timestamp
    pub fn has_event_time(&self) -> bool {
        self.event_time != Self::UNSET_EVENT_TIME
    }
}

/// Maps a raw field onto a payload field of the structured log entry
///
/// `target` doubles as the configuration key of the field's inclusion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMappingEntry {
    /// Raw event field name (e.g., "statement")
    pub source: String,

    /// Payload field name and config key (e.g., "statement")
    pub target: String,
}

impl FieldMappingEntry {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Default mapping: every audit field except `event_time`, raw
    /// snake_case name onto its camelCase payload name
    pub fn defaults() -> Vec<Self> {
        fields::ALL
            .iter()
            .filter(|f| **f != fields::EVENT_TIME)
            .map(|f| Self::new(*f, snake_to_camel(f)))
            .collect()
    }
}

fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut upper = false;
    for c in name.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            out.extend(c.to_uppercase());
            upper = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Ordered key-value payload of a structured log entry
///
/// Serializes as a JSON object whose keys keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload {
    fields: Vec<(String, String)>,
}

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field. Returns false (and leaves the payload untouched)
    /// if the key is already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.contains(&key) {
            return false;
        }
        self.fields.push((key, value.into()));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Log entry severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Default,
    Debug,
    Info,
    Notice,
    Warning,
    Error,
}

/// Destination log: `projects/{project}/logs/{log}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogName {
    pub project_id: String,
    pub log_id: String,
}

impl LogName {
    pub fn new(project_id: impl Into<String>, log_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            log_id: log_id.into(),
        }
    }
}

impl fmt::Display for LogName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/logs/{}", self.project_id, self.log_id)
    }
}

/// Destination topic: `projects/{project}/topics/{topic}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicName {
    pub project_id: String,
    pub topic_id: String,
}

impl TopicName {
    pub fn new(project_id: impl Into<String>, topic_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            topic_id: topic_id.into(),
        }
    }
}

impl fmt::Display for TopicName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "projects/{}/topics/{}", self.project_id, self.topic_id)
    }
}

/// Method name stamped on every structured audit log entry
pub const AUDIT_METHOD_NAME: &str = "sqlAudit.custom";

/// A structured audit entry destined for the log sink
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    /// Unique entry id (ins-<uuid>)
    pub insert_id: String,

    /// Full log name (`projects/{p}/logs/{l}`)
    pub log_name: String,

    pub severity: Severity,

    /// Audit method identifier
    pub method_name: String,

    /// Fields that passed the inclusion policy, `eventTime` first
    pub payload: Payload,
}

impl LogEntry {
    /// Create an `INFO` audit entry for a log
    pub fn new(log_name: &LogName, payload: Payload) -> Self {
        Self {
            insert_id: format!("ins-{}", uuid::Uuid::new_v4()),
            log_name: log_name.to_string(),
            severity: Severity::Info,
            method_name: AUDIT_METHOD_NAME.to_string(),
            payload,
        }
    }
}
