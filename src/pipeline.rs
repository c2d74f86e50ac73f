//! Per-segment pipeline
//!
//! One `SegmentPipeline` is built per audit trace segment. It routes every
//! raw event to the sink selected by the configuration and flushes whatever
//! is batched when the segment ends.

use crate::config::{AuditConfig, FailureMode, SinkKind};
use crate::delivery::{LogBatcher, PubSubPublisher, RecordBatcher};
use crate::error::{AuditError, Result};
use crate::sink::{LogTransport, PubSubTransport, RecordSink};
use crate::types::RawEvent;
use futures::{Stream, StreamExt};
use std::sync::Arc;

/// Transports available to a pipeline; only the one matching the
/// configured sink is required
#[derive(Clone, Default)]
pub struct Transports {
    pub log: Option<Arc<dyn LogTransport>>,
    pub records: Option<Arc<dyn RecordSink>>,
    pub pubsub: Option<Arc<dyn PubSubTransport>>,
}

impl Transports {
    pub fn with_log(mut self, transport: Arc<dyn LogTransport>) -> Self {
        self.log = Some(transport);
        self
    }

    pub fn with_records(mut self, sink: Arc<dyn RecordSink>) -> Self {
        self.records = Some(sink);
        self
    }

    pub fn with_pubsub(mut self, transport: Arc<dyn PubSubTransport>) -> Self {
        self.pubsub = Some(transport);
        self
    }
}

/// The delivery path of one segment
pub enum SegmentSink {
    Log(LogBatcher),
    Records(RecordBatcher),
    PubSub(PubSubPublisher),
}

/// Outcome of a processed segment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SegmentStats {
    /// Events handed to the pipeline
    pub received: usize,
    /// Events (or entries/records) delivered to the transport
    pub delivered: usize,
    /// Events dropped for field errors under `FailureMode::Skip`
    pub skipped: usize,
}

/// Routes one segment's events to its sink
pub struct SegmentPipeline {
    file_name: String,
    sink: SegmentSink,
    failure_mode: FailureMode,
    stats: SegmentStats,
}

impl SegmentPipeline {
    /// Wrap an already built sink
    pub fn new(file_name: impl Into<String>, sink: SegmentSink) -> Self {
        Self {
            file_name: file_name.into(),
            sink,
            failure_mode: FailureMode::default(),
            stats: SegmentStats::default(),
        }
    }

    /// Build the sink selected by `config.sink` for a segment file
    pub fn from_config(
        config: Arc<AuditConfig>,
        file_name: impl Into<String>,
        transports: &Transports,
    ) -> Result<Self> {
        let file_name = file_name.into();
        let failure_mode = config.failure_mode;
        let kind = config.sink;

        let sink = match kind {
            SinkKind::Log => {
                let transport = transports.log.clone().ok_or_else(|| missing("log"))?;
                let log_name = config.log_name();
                let clear_policy = config.clear_policy;
                SegmentSink::Log(
                    LogBatcher::new(log_name, &file_name, config.field_policy(), transport)
                        .with_clear_policy(clear_policy),
                )
            }
            SinkKind::Records => {
                let sink = transports.records.clone().ok_or_else(|| missing("records"))?;
                SegmentSink::Records(
                    RecordBatcher::new(&file_name, sink).with_clear_policy(config.clear_policy),
                )
            }
            SinkKind::PubSub => {
                let transport = transports.pubsub.clone().ok_or_else(|| missing("pubsub"))?;
                let topic = config.topic_name().ok_or_else(|| {
                    AuditError::Config("topicId is required for the pubsub sink".to_string())
                })?;
                SegmentSink::PubSub(PubSubPublisher::new(topic, transport))
            }
        };

        Ok(Self::new(file_name, sink).with_failure_mode(failure_mode))
    }

    pub fn with_failure_mode(mut self, failure_mode: FailureMode) -> Self {
        self.failure_mode = failure_mode;
        self
    }

    /// Feed one raw event through the sink
    ///
    /// Field errors are returned or counted as skipped according to the
    /// failure mode; transport errors are always returned.
    pub async fn handle(&mut self, event: &RawEvent) -> Result<()> {
        self.stats.received += 1;

        let result = match &mut self.sink {
            SegmentSink::Log(batcher) => batcher.accumulate(event),
            SegmentSink::Records(batcher) => batcher.accumulate(event),
            SegmentSink::PubSub(publisher) => {
                publisher.publish(event).await?;
                self.stats.delivered += 1;
                Ok(())
            }
        };

        match result {
            Err(e) if e.is_field_error() && self.failure_mode == FailureMode::Skip => {
                tracing::warn!(
                    file = %self.file_name,
                    event = %event.name,
                    error = %e,
                    "Skipping invalid audit event"
                );
                self.stats.skipped += 1;
                Ok(())
            }
            other => other,
        }
    }

    /// Flush anything batched; returns the number delivered by this flush
    pub async fn flush(&mut self) -> Result<usize> {
        let count = match &mut self.sink {
            SegmentSink::Log(batcher) => batcher.flush().await?,
            SegmentSink::Records(batcher) => batcher.flush().await?,
            SegmentSink::PubSub(_) => 0,
        };
        self.stats.delivered += count;
        Ok(count)
    }

    /// Handle every event of a stream, then flush
    pub async fn process<S>(&mut self, events: S) -> Result<SegmentStats>
    where
        S: Stream<Item = RawEvent>,
    {
        let mut events = std::pin::pin!(events);
        while let Some(event) = events.next().await {
            self.handle(&event).await?;
        }
        self.finish().await
    }

    /// Flush and report the segment's stats
    pub async fn finish(&mut self) -> Result<SegmentStats> {
        self.flush().await?;
        tracing::debug!(
            file = %self.file_name,
            received = self.stats.received,
            delivered = self.stats.delivered,
            skipped = self.stats.skipped,
            "Segment processed"
        );
        Ok(self.stats)
    }

    pub fn stats(&self) -> SegmentStats {
        self.stats
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn sink(&self) -> &SegmentSink {
        &self.sink
    }
}

fn missing(kind: &str) -> AuditError {
    AuditError::Config(format!("No {} transport configured", kind))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::memory::{MemoryLogTransport, MemoryPubSubTransport, MemoryRecordSink};

    fn event(session_id: &str) -> RawEvent {
        let mut event = RawEvent::new("audit_event");
        for field in crate::types::fields::ALL {
            event = event.with_field(field, "x");
        }
        event
            .with_field("event_time", "2024-01-01T00:00:00Z")
            .with_field("session_id", session_id)
            .with_field("transaction_id", "1")
            .with_field("object_id", "1")
            .with_field("duration_milliseconds", "1")
            .with_field("succeeded", "true")
    }

    fn config(sink: SinkKind) -> AuditConfig {
        let mut config = AuditConfig::new("proj");
        config.sink = sink;
        config.topic_id = Some("audit".to_string());
        config
    }

    #[tokio::test]
    async fn test_from_config_requires_matching_transport() {
        let err = SegmentPipeline::from_config(
            Arc::new(config(SinkKind::Records)),
            "a.xel",
            &Transports::default(),
        )
        .err()
        .unwrap();
        assert!(err.to_string().contains("records"));
    }

    #[tokio::test]
    async fn test_log_pipeline_flushes_on_finish() {
        let transport = Arc::new(MemoryLogTransport::new());
        let transports = Transports::default().with_log(transport.clone());
        let mut pipeline =
            SegmentPipeline::from_config(Arc::new(config(SinkKind::Log)), "db_Audit_1.xel", &transports)
                .unwrap();

        pipeline.handle(&event("1")).await.unwrap();
        pipeline.handle(&event("2")).await.unwrap();
        assert_eq!(transport.calls().await, 0);

        let stats = pipeline.finish().await.unwrap();
        assert_eq!(stats.received, 2);
        assert_eq!(stats.delivered, 2);
        assert_eq!(transport.calls().await, 1);
        assert_eq!(transport.requests().await[0].labels["FileLabel"], "db");
    }

    #[tokio::test]
    async fn test_skip_mode_counts_invalid_events() {
        let sink = Arc::new(MemoryRecordSink::new());
        let transports = Transports::default().with_records(sink.clone());
        let mut config = config(SinkKind::Records);
        config.failure_mode = FailureMode::Skip;
        let mut pipeline = SegmentPipeline::from_config(Arc::new(config), "a.xel", &transports).unwrap();

        let stats = pipeline
            .process(futures::stream::iter(vec![event("1"), event("bad"), event("3")]))
            .await
            .unwrap();

        assert_eq!(
            stats,
            SegmentStats {
                received: 3,
                delivered: 2,
                skipped: 1
            }
        );
        assert_eq!(sink.batches().await[0].1.len(), 2);
    }

    #[tokio::test]
    async fn test_abort_mode_returns_field_error() {
        let sink = Arc::new(MemoryRecordSink::new());
        let transports = Transports::default().with_records(sink.clone());
        let mut pipeline =
            SegmentPipeline::from_config(Arc::new(config(SinkKind::Records)), "a.xel", &transports)
                .unwrap();

        let err = pipeline
            .process(futures::stream::iter(vec![event("1"), event("bad")]))
            .await
            .unwrap_err();
        assert_eq!(err.field_name(), Some("session_id"));
        assert_eq!(sink.calls().await, 0);
    }

    #[tokio::test]
    async fn test_pubsub_pipeline_publishes_per_event() {
        let transport = Arc::new(MemoryPubSubTransport::new());
        let transports = Transports::default().with_pubsub(transport.clone());
        let mut pipeline =
            SegmentPipeline::from_config(Arc::new(config(SinkKind::PubSub)), "a.xel", &transports)
                .unwrap();

        pipeline.handle(&event("1")).await.unwrap();
        assert_eq!(transport.messages().await.len(), 1);

        let stats = pipeline.finish().await.unwrap();
        assert_eq!(stats.delivered, 1);
    }

    #[tokio::test]
    async fn test_transport_error_aborts_even_in_skip_mode() {
        let transport = Arc::new(MemoryPubSubTransport::new());
        let transports = Transports::default().with_pubsub(transport.clone());
        let mut config = config(SinkKind::PubSub);
        config.failure_mode = FailureMode::Skip;
        let mut pipeline = SegmentPipeline::from_config(Arc::new(config), "a.xel", &transports).unwrap();

        transport.fail_next();
        assert!(pipeline.handle(&event("1")).await.is_err());
        assert_eq!(pipeline.stats().skipped, 0);
    }
}
