//! Shared JetStream handle for the audit transports

use super::config::NatsConfig;
use crate::error::{AuditError, Result};
use async_nats::jetstream::{self, stream::Stream};
use async_nats::HeaderMap;
use bytes::Bytes;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

/// JetStream context bound to the audit stream
///
/// One client is shared by the log and pub/sub transports; every publish
/// waits for the stream's ack before returning.
pub struct NatsClient {
    jetstream: jetstream::Context,
    /// `Stream::info` needs `&mut`
    stream: Mutex<Stream>,
    config: NatsConfig,
}

impl NatsClient {
    /// Connect and create the audit stream if it does not exist yet
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        let client = config
            .connect_options()
            .connect(config.url.as_str())
            .await
            .map_err(|e| AuditError::Connection(format!("{}: {}", config.url, e)))?;
        tracing::info!(url = %config.url, "Connected to NATS");

        let jetstream = jetstream::new(client);
        let stream = jetstream
            .get_or_create_stream(config.stream_config())
            .await
            .map_err(|e| {
                AuditError::Stream(format!("Stream '{}' unavailable: {}", config.stream_name, e))
            })?;
        tracing::info!(
            stream = %config.stream_name,
            prefix = %config.subject_prefix,
            "Audit stream ready"
        );

        Ok(Self {
            jetstream,
            stream: Mutex::new(stream),
            config,
        })
    }

    /// Publish one payload and return its stream sequence
    ///
    /// Headers are attached only when there are any. Failures name the
    /// calling transport.
    pub async fn publish(
        &self,
        transport: &str,
        subject: String,
        headers: &BTreeMap<String, String>,
        payload: Bytes,
    ) -> Result<u64> {
        let fail = |reason: String| AuditError::transport(transport, reason);

        let sent = if headers.is_empty() {
            self.jetstream.publish(subject.clone(), payload).await
        } else {
            let header_map = headers
                .iter()
                .fold(HeaderMap::new(), |mut map, (name, value)| {
                    map.insert(name.as_str(), value.as_str());
                    map
                });
            self.jetstream
                .publish_with_headers(subject.clone(), header_map, payload)
                .await
        };
        let pending = sent.map_err(|e| fail(format!("{}: {}", subject, e)))?;

        let timeout = self.config.ack_timeout();
        let ack = tokio::time::timeout(timeout, pending)
            .await
            .map_err(|_| fail(format!("no ack for '{}' within {:?}", subject, timeout)))?
            .map_err(|e| fail(format!("ack for '{}' failed: {}", subject, e)))?;

        tracing::debug!(subject = %subject, sequence = ack.sequence, "Audit message stored");
        Ok(ack.sequence)
    }

    /// Current message and byte counts of the audit stream
    pub async fn stream_info(&self) -> Result<StreamInfo> {
        let mut stream = self.stream.lock().await;
        let info = stream
            .info()
            .await
            .map_err(|e| AuditError::Stream(format!("{}: {}", self.config.stream_name, e)))?;

        Ok(StreamInfo {
            messages: info.state.messages,
            bytes: info.state.bytes,
            last_sequence: info.state.last_sequence,
        })
    }

    pub fn config(&self) -> &NatsConfig {
        &self.config
    }
}

/// Snapshot of the audit stream's state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamInfo {
    pub messages: u64,
    pub bytes: u64,
    pub last_sequence: u64,
}
