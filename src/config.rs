//! Deployment configuration
//!
//! Loaded once at startup from a camelCase JSON document. The `fields` table
//! holds the per-field inclusion flags consulted by the field policy; its
//! values are kept as strings so that `true`, `"true"`, and `"TRUE"` all
//! behave the same and anything else falls back to presence.

use crate::batch::ClearPolicy;
use crate::error::{AuditError, Result};
use crate::policy::{ConfigSource, FieldPolicy};
use crate::sink::nats::NatsConfig;
use crate::types::{FieldMappingEntry, LogName, TopicName};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Where a segment's events are delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SinkKind {
    /// Batched structured log entries
    #[default]
    Log,
    /// Batched normalized records
    Records,
    /// One pub/sub message per event
    #[serde(rename = "pubsub")]
    PubSub,
}

/// What a segment pipeline does with an event that fails normalization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureMode {
    /// Stop the segment and return the error
    #[default]
    Abort,
    /// Log the event and continue with the next one
    Skip,
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Destination project
    pub project_id: String,

    /// Log id for the structured-log sink
    #[serde(default = "default_log_id")]
    pub log_id: String,

    /// Topic id for the pub/sub sink
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<String>,

    #[serde(default)]
    pub sink: SinkKind,

    #[serde(default)]
    pub clear_policy: ClearPolicy,

    #[serde(default)]
    pub failure_mode: FailureMode,

    /// Raw field → payload field, in payload order
    #[serde(default = "FieldMappingEntry::defaults")]
    pub field_mapping: Vec<FieldMappingEntry>,

    /// Per-field inclusion flags, keyed by payload field name
    #[serde(default, deserialize_with = "string_map")]
    pub fields: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nats: Option<NatsConfig>,

    /// Directory for the file-backed sinks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
}

fn default_log_id() -> String {
    "sqlaudit".to_string()
}

/// Accept JSON scalars as flag values, storing them as strings
fn string_map<'de, D>(deserializer: D) -> std::result::Result<HashMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = HashMap::<String, serde_json::Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, v)
        })
        .collect())
}

impl AuditConfig {
    /// Minimal configuration for a project with defaults everywhere else
    pub fn new(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            log_id: default_log_id(),
            topic_id: None,
            sink: SinkKind::default(),
            clear_policy: ClearPolicy::default(),
            failure_mode: FailureMode::default(),
            field_mapping: FieldMappingEntry::defaults(),
            fields: HashMap::new(),
            nats: None,
            output_dir: None,
        }
    }

    /// Parse and validate a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| AuditError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            AuditError::Io(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config = Self::from_json(&json)?;
        tracing::debug!(
            path = %path.display(),
            sink = ?config.sink,
            mapped_fields = config.field_mapping.len(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Check the settings the selected sink depends on
    pub fn validate(&self) -> Result<()> {
        if self.project_id.trim().is_empty() {
            return Err(AuditError::Config("projectId cannot be empty".to_string()));
        }
        if self.sink == SinkKind::Log && self.log_id.trim().is_empty() {
            return Err(AuditError::Config("logId cannot be empty".to_string()));
        }
        if self.sink == SinkKind::PubSub
            && self.topic_id.as_deref().map_or(true, |t| t.trim().is_empty())
        {
            return Err(AuditError::Config(
                "topicId is required for the pubsub sink".to_string(),
            ));
        }
        for entry in &self.field_mapping {
            if entry.source.is_empty() || entry.target.is_empty() {
                return Err(AuditError::Config(format!(
                    "Field mapping entry has an empty name: '{}' -> '{}'",
                    entry.source, entry.target
                )));
            }
        }
        Ok(())
    }

    pub fn log_name(&self) -> LogName {
        LogName::new(&self.project_id, &self.log_id)
    }

    /// Destination topic, if configured
    pub fn topic_name(&self) -> Option<TopicName> {
        self.topic_id
            .as_ref()
            .map(|t| TopicName::new(&self.project_id, t))
    }

    /// Field policy over this config's mapping and flags
    pub fn field_policy(self: Arc<Self>) -> FieldPolicy {
        FieldPolicy::new(self.field_mapping.clone(), self)
    }
}

impl ConfigSource for AuditConfig {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RawEvent;

    #[test]
    fn test_minimal_config_defaults() {
        let config = AuditConfig::from_json(r#"{"projectId": "proj"}"#).unwrap();
        assert_eq!(config.log_id, "sqlaudit");
        assert_eq!(config.sink, SinkKind::Log);
        assert_eq!(config.clear_policy, ClearPolicy::Always);
        assert_eq!(config.failure_mode, FailureMode::Abort);
        assert_eq!(config.field_mapping, FieldMappingEntry::defaults());
        assert!(config.fields.is_empty());
        assert!(config.nats.is_none());
        assert_eq!(config.log_name().to_string(), "projects/proj/logs/sqlaudit");
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "projectId": "proj",
            "logId": "audit",
            "topicId": "audit-events",
            "sink": "pubsub",
            "clearPolicy": "onSuccess",
            "failureMode": "skip",
            "fieldMapping": [
                {"source": "statement", "target": "statement"},
                {"source": "action_id", "target": "actionId"}
            ],
            "fields": {"statement": false, "actionId": "TRUE", "objectId": 1},
            "nats": {"url": "nats://nats:4222"},
            "outputDir": "/var/lib/a3s-audit"
        }"#;

        let config = AuditConfig::from_json(json).unwrap();
        assert_eq!(config.sink, SinkKind::PubSub);
        assert_eq!(config.clear_policy, ClearPolicy::OnSuccess);
        assert_eq!(config.failure_mode, FailureMode::Skip);
        assert_eq!(config.field_mapping.len(), 2);
        assert_eq!(config.fields["statement"], "false");
        assert_eq!(config.fields["actionId"], "TRUE");
        assert_eq!(config.fields["objectId"], "1");
        assert_eq!(config.nats.as_ref().unwrap().url, "nats://nats:4222");
        assert_eq!(
            config.topic_name().unwrap().to_string(),
            "projects/proj/topics/audit-events"
        );
    }

    #[test]
    fn test_validate_rejects_missing_project() {
        let err = AuditConfig::from_json(r#"{"projectId": " "}"#).unwrap_err();
        assert!(err.to_string().contains("projectId"));
    }

    #[test]
    fn test_validate_pubsub_requires_topic() {
        let err = AuditConfig::from_json(r#"{"projectId": "p", "sink": "pubsub"}"#).unwrap_err();
        assert!(err.to_string().contains("topicId"));
    }

    #[test]
    fn test_validate_rejects_empty_mapping_names() {
        let json = r#"{"projectId": "p", "fieldMapping": [{"source": "", "target": "x"}]}"#;
        assert!(AuditConfig::from_json(json).is_err());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        let err = AuditConfig::from_json("{").unwrap_err();
        assert!(matches!(err, AuditError::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("a3s-audit-test-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("audit.json");
        std::fs::write(&path, r#"{"projectId": "proj", "sink": "records"}"#).unwrap();

        let config = AuditConfig::from_file(&path).unwrap();
        assert_eq!(config.sink, SinkKind::Records);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_from_missing_file() {
        let err = AuditConfig::from_file("/tmp/nonexistent-a3s-audit.json").unwrap_err();
        assert!(matches!(err, AuditError::Io(_)));
    }

    #[test]
    fn test_config_as_field_policy_source() {
        let mut config = AuditConfig::new("proj");
        config.fields.insert("statement".to_string(), "false".to_string());
        config.fields.insert("actionId".to_string(), "maybe".to_string());
        let config = Arc::new(config);

        let event = RawEvent::new("audit_event")
            .with_field("event_time", "2024-01-01T00:00:00Z")
            .with_field("statement", "SELECT 1")
            .with_field("action_id", "SL");

        let payload = config.clone().field_policy().payload(&event).unwrap();
        assert!(!payload.contains("statement"));
        assert_eq!(payload.get("actionId"), Some("SL"));
    }
}
