//! In-memory transports for testing and single-process use
//!
//! Every call is recorded in order. `fail_next` makes the next call return
//! a transport error, leaving the recorded history untouched.

use super::{LogTransport, LogWriteRequest, PubSubMessage, PubSubTransport, RecordSink};
use crate::error::{AuditError, Result};
use crate::types::AuditRecord;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

#[derive(Default)]
struct FailSwitch(AtomicBool);

impl FailSwitch {
    fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    fn check(&self, transport: &str) -> Result<()> {
        if self.0.swap(false, Ordering::SeqCst) {
            return Err(AuditError::transport(transport, "injected failure"));
        }
        Ok(())
    }
}

/// Records every log write
#[derive(Default)]
pub struct MemoryLogTransport {
    requests: RwLock<Vec<LogWriteRequest>>,
    fail: FailSwitch,
}

impl MemoryLogTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write fail
    pub fn fail_next(&self) {
        self.fail.arm();
    }

    /// All successful writes, oldest first
    pub async fn requests(&self) -> Vec<LogWriteRequest> {
        self.requests.read().await.clone()
    }

    /// Number of successful writes
    pub async fn calls(&self) -> usize {
        self.requests.read().await.len()
    }
}

#[async_trait]
impl LogTransport for MemoryLogTransport {
    async fn write_entries(&self, request: &LogWriteRequest) -> Result<()> {
        self.fail.check(self.name())?;
        self.requests.write().await.push(request.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory-log"
    }
}

/// Records every record batch, keyed by segment
#[derive(Default)]
pub struct MemoryRecordSink {
    batches: RwLock<Vec<(String, Vec<AuditRecord>)>>,
    fail: FailSwitch,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write fail
    pub fn fail_next(&self) {
        self.fail.arm();
    }

    /// All successful writes as (segment, records), oldest first
    pub async fn batches(&self) -> Vec<(String, Vec<AuditRecord>)> {
        self.batches.read().await.clone()
    }

    /// Number of successful writes
    pub async fn calls(&self) -> usize {
        self.batches.read().await.len()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn write_records(&self, segment: &str, records: &[AuditRecord]) -> Result<()> {
        self.fail.check(self.name())?;
        self.batches
            .write()
            .await
            .push((segment.to_string(), records.to_vec()));
        Ok(())
    }

    fn name(&self) -> &str {
        "memory-records"
    }
}

/// Records every published message
#[derive(Default)]
pub struct MemoryPubSubTransport {
    messages: RwLock<Vec<PubSubMessage>>,
    fail: FailSwitch,
}

impl MemoryPubSubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next publish fail
    pub fn fail_next(&self) {
        self.fail.arm();
    }

    /// All published messages, oldest first
    pub async fn messages(&self) -> Vec<PubSubMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl PubSubTransport for MemoryPubSubTransport {
    async fn publish(&self, message: &PubSubMessage) -> Result<()> {
        self.fail.check(self.name())?;
        self.messages.write().await.push(message.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory-pubsub"
    }
}
