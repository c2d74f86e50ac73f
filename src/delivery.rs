//! Batchers and publishers — accumulate audit output and hand it to a transport
//!
//! `LogBatcher` and `RecordBatcher` own one ordered batch each and deliver it
//! in a single transport call per `flush`. Flushing is always triggered by
//! the caller; nothing here flushes on size or time. `PubSubPublisher` is
//! not batched: every event is one publish.

use crate::batch::{file_label, ClearPolicy, DeliveryBatch, FILE_LABEL_KEY};
use crate::error::Result;
use crate::normalize::normalize;
use crate::policy::FieldPolicy;
use crate::sink::{
    LogTransport, LogWriteRequest, MonitoredResource, PubSubMessage, PubSubTransport, RecordSink,
    DESCRIPTION_ATTRIBUTE, DESCRIPTION_VALUE,
};
use crate::types::{AuditRecord, LogEntry, LogName, RawEvent, TopicName};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Batches structured log entries for one segment
pub struct LogBatcher {
    log_name: LogName,
    file_name: String,
    label: String,
    policy: FieldPolicy,
    batch: DeliveryBatch<LogEntry>,
    transport: Arc<dyn LogTransport>,
    clear_policy: ClearPolicy,
}

impl LogBatcher {
    /// Create a batcher for a segment file
    pub fn new(
        log_name: LogName,
        file_name: impl Into<String>,
        policy: FieldPolicy,
        transport: Arc<dyn LogTransport>,
    ) -> Self {
        let file_name = file_name.into();
        Self {
            label: file_label(&file_name),
            log_name,
            file_name,
            policy,
            batch: DeliveryBatch::new(),
            transport,
            clear_policy: ClearPolicy::default(),
        }
    }

    /// Set what happens to the batch when the transport fails
    pub fn with_clear_policy(mut self, clear_policy: ClearPolicy) -> Self {
        self.clear_policy = clear_policy;
        self
    }

    /// Build the structured entry for a raw event without accumulating it
    pub fn build_entry(&self, event: &RawEvent) -> Result<LogEntry> {
        let payload = self.policy.payload(event)?;
        Ok(LogEntry::new(&self.log_name, payload))
    }

    /// Filter a raw event through the field policy and append its entry
    pub fn accumulate(&mut self, event: &RawEvent) -> Result<()> {
        let entry = self.build_entry(event)?;
        self.batch.push(entry);
        Ok(())
    }

    /// Append a prebuilt entry
    pub fn push_entry(&mut self, entry: LogEntry) {
        self.batch.push(entry);
    }

    /// Write the whole batch in one transport call
    ///
    /// Returns the number of entries delivered. An empty batch is not sent:
    /// a flush with nothing pending returns `Ok(0)` without calling the
    /// transport, so no empty write request is ever issued.
    ///
    /// With `ClearPolicy::Always` the batch is gone after this call whatever
    /// the outcome; with `ClearPolicy::OnSuccess` a failed batch stays
    /// pending.
    pub async fn flush(&mut self) -> Result<usize> {
        if self.batch.is_empty() {
            return Ok(0);
        }

        let mut labels = BTreeMap::new();
        labels.insert(FILE_LABEL_KEY.to_string(), self.label.clone());

        let request = LogWriteRequest {
            log_name: self.log_name.clone(),
            resource: MonitoredResource::global(),
            labels,
            entries: self.batch.take(),
        };
        let count = request.entries.len();

        if let Err(e) = self.transport.write_entries(&request).await {
            tracing::warn!(
                transport = self.transport.name(),
                file = %self.file_name,
                count,
                error = %e,
                "Log write failed"
            );
            if self.clear_policy == ClearPolicy::OnSuccess {
                self.batch.restore(request.entries);
            }
            return Err(e);
        }

        tracing::info!(count, file = %self.file_name, "Saved to log");
        Ok(count)
    }

    /// Derived `FileLabel`
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn log_name(&self) -> &LogName {
        &self.log_name
    }

    /// Entries awaiting flush, in arrival order
    pub fn pending(&self) -> &[LogEntry] {
        self.batch.items()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Batches normalized records for one segment
pub struct RecordBatcher {
    file_name: String,
    batch: DeliveryBatch<AuditRecord>,
    sink: Arc<dyn RecordSink>,
    clear_policy: ClearPolicy,
}

impl RecordBatcher {
    pub fn new(file_name: impl Into<String>, sink: Arc<dyn RecordSink>) -> Self {
        Self {
            file_name: file_name.into(),
            batch: DeliveryBatch::new(),
            sink,
            clear_policy: ClearPolicy::default(),
        }
    }

    /// Set what happens to the batch when the sink fails
    pub fn with_clear_policy(mut self, clear_policy: ClearPolicy) -> Self {
        self.clear_policy = clear_policy;
        self
    }

    /// Normalize a raw event and append the record
    ///
    /// On a field error nothing is appended.
    pub fn accumulate(&mut self, event: &RawEvent) -> Result<()> {
        let record = normalize(event)?;
        self.batch.push(record);
        Ok(())
    }

    /// Append a prebuilt record
    pub fn push_record(&mut self, record: AuditRecord) {
        self.batch.push(record);
    }

    /// Write the whole batch in one sink call; see `LogBatcher::flush`
    pub async fn flush(&mut self) -> Result<usize> {
        // Nothing pending: no sink call, not even an empty one
        if self.batch.is_empty() {
            return Ok(0);
        }

        let records = self.batch.take();
        let count = records.len();

        if let Err(e) = self.sink.write_records(&self.file_name, &records).await {
            tracing::warn!(
                sink = self.sink.name(),
                file = %self.file_name,
                count,
                error = %e,
                "Record write failed"
            );
            if self.clear_policy == ClearPolicy::OnSuccess {
                self.batch.restore(records);
            }
            return Err(e);
        }

        tracing::debug!(count, file = %self.file_name, "Records written");
        Ok(count)
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Records awaiting flush, in arrival order
    pub fn pending(&self) -> &[AuditRecord] {
        self.batch.items()
    }

    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }
}

/// Publishes raw events one by one
pub struct PubSubPublisher {
    topic: TopicName,
    transport: Arc<dyn PubSubTransport>,
}

impl PubSubPublisher {
    pub fn new(topic: TopicName, transport: Arc<dyn PubSubTransport>) -> Self {
        Self { topic, transport }
    }

    /// The message a raw event is published as
    pub fn message(&self, event: &RawEvent) -> Result<PubSubMessage> {
        let data = serde_json::to_vec(event)?;
        let mut attributes = BTreeMap::new();
        attributes.insert(
            DESCRIPTION_ATTRIBUTE.to_string(),
            DESCRIPTION_VALUE.to_string(),
        );

        Ok(PubSubMessage {
            topic: self.topic.clone(),
            data: data.into(),
            attributes,
        })
    }

    /// Publish one raw event
    pub async fn publish(&self, event: &RawEvent) -> Result<()> {
        let message = self.message(event)?;
        self.transport.publish(&message).await?;
        tracing::debug!(topic = %self.topic, event = %event.name, "Event published");
        Ok(())
    }

    pub fn topic(&self) -> &TopicName {
        &self.topic
    }
}
