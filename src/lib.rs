//! # a3s-audit
//!
//! SQL Server audit event normalization, field policy, and batched delivery
//! for the A3S ecosystem.
//!
//! ## Overview
//!
//! `a3s-audit` turns raw audit events (field name → string value, as read
//! from extended-event trace segments) into typed records or structured log
//! entries and delivers them through pluggable transports. Swap backends
//! (in-memory, files, NATS JetStream) without changing pipeline code.
//!
//! ## Quick Start
//!
//! ```rust
//! use a3s_audit::{FieldPolicy, LogBatcher, LogName, RawEvent};
//! use a3s_audit::sink::memory::MemoryLogTransport;
//! use std::sync::Arc;
//!
//! # async fn example() -> a3s_audit::Result<()> {
//! let transport = Arc::new(MemoryLogTransport::new());
//! let mut batcher = LogBatcher::new(
//!     LogName::new("my-project", "sqlaudit"),
//!     "orders_Audit_20240101.xel",
//!     FieldPolicy::presence_only(),
//!     transport.clone(),
//! );
//!
//! let event = RawEvent::new("audit_event")
//!     .with_field("event_time", "2024-01-01T10:00:00Z")
//!     .with_field("statement", "SELECT * FROM orders");
//! batcher.accumulate(&event)?;
//!
//! let delivered = batcher.flush().await?;
//! assert_eq!(delivered, 1);
//! # Ok(())
//! # }
//! ```
//!
//! ## Sinks
//!
//! - **log** — batched structured entries, one write per flush
//! - **records** — batched normalized `AuditRecord`s, one write per flush
//! - **pubsub** — one message per raw event
//!
//! ## Architecture
//!
//! - **normalize** — raw event → `AuditRecord`
//! - **policy** — per-field inclusion and payload construction
//! - **delivery** — `LogBatcher`, `RecordBatcher`, `PubSubPublisher`
//! - **sink** — `LogTransport`, `RecordSink`, `PubSubTransport` traits and backends
//! - **pipeline** — `SegmentPipeline`, one per trace segment

pub mod batch;
pub mod config;
pub mod delivery;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod policy;
pub mod sink;
pub mod types;

// Re-export core types
pub use batch::{file_label, ClearPolicy, DeliveryBatch};
pub use config::{AuditConfig, FailureMode, SinkKind};
pub use delivery::{LogBatcher, PubSubPublisher, RecordBatcher};
pub use error::{AuditError, Result};
pub use normalize::{normalize, EventNormalizer};
pub use pipeline::{SegmentPipeline, SegmentSink, SegmentStats, Transports};
pub use policy::{build_payload, should_include, ConfigSource, FieldPolicy};
pub use sink::{
    LogTransport, LogWriteRequest, MonitoredResource, PubSubMessage, PubSubTransport, RecordSink,
};
pub use types::{
    AuditRecord, FieldMappingEntry, LogEntry, LogName, Payload, RawEvent, Severity, TopicName,
};

// Re-export transports for convenience
pub use sink::file::{FileLogTransport, FileRecordSink};
pub use sink::memory::{MemoryLogTransport, MemoryPubSubTransport, MemoryRecordSink};
pub use sink::nats::{NatsClient, NatsConfig, NatsLogTransport, NatsPubSubTransport, StorageType};
