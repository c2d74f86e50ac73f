//! Transport traits — the seams between the core and delivery backends
//!
//! The structured-log transport receives one batched write per flush; the
//! record sink receives one batch of normalized records per flush; the
//! pub/sub transport receives one message per event. Backends (in-memory,
//! files, NATS JetStream) implement these traits and are injected into the
//! batchers.

use crate::error::Result;
use crate::types::{AuditRecord, LogEntry, LogName, TopicName};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use std::collections::BTreeMap;

pub mod file;
pub mod memory;
pub mod nats;

/// Resource type attached to every log write
pub const GLOBAL_RESOURCE: &str = "global";

/// Attribute key stamped on every pub/sub message
pub const DESCRIPTION_ATTRIBUTE: &str = "Description";

/// Attribute value stamped on every pub/sub message
pub const DESCRIPTION_VALUE: &str = "SQL Server Audit message";

/// Monitored resource descriptor of a log write
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    pub kind: String,
}

impl MonitoredResource {
    /// The `global` resource
    pub fn global() -> Self {
        Self {
            kind: GLOBAL_RESOURCE.to_string(),
        }
    }
}

/// One batched write to the structured-log store
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogWriteRequest {
    pub log_name: LogName,
    pub resource: MonitoredResource,
    pub labels: BTreeMap<String, String>,
    pub entries: Vec<LogEntry>,
}

/// One message for the pub/sub channel
#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub topic: TopicName,
    pub data: Bytes,
    pub attributes: BTreeMap<String, String>,
}

/// Structured-log store backend
#[async_trait]
pub trait LogTransport: Send + Sync {
    /// Write the whole batch in a single call
    async fn write_entries(&self, request: &LogWriteRequest) -> Result<()>;

    /// Transport name (e.g., "memory", "file", "nats")
    fn name(&self) -> &str;
}

/// Normalized-record backend
#[async_trait]
pub trait RecordSink: Send + Sync {
    /// Write one segment's records in a single call
    async fn write_records(&self, segment: &str, records: &[AuditRecord]) -> Result<()>;

    /// Sink name
    fn name(&self) -> &str;
}

/// Publish/subscribe backend
#[async_trait]
pub trait PubSubTransport: Send + Sync {
    /// Publish a single message
    async fn publish(&self, message: &PubSubMessage) -> Result<()>;

    /// Transport name
    fn name(&self) -> &str;
}
