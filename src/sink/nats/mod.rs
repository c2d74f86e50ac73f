//! NATS JetStream transports
//!
//! Both transports share one `NatsClient` and one stream. A log flush becomes
//! a single JetStream message carrying the whole write request; a pub/sub
//! publish becomes one message per event with its attributes as headers.

mod client;
mod config;

pub use client::{NatsClient, StreamInfo};
pub use config::{NatsConfig, StorageType};

use super::{LogTransport, LogWriteRequest, PubSubMessage, PubSubTransport};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Structured-log transport backed by a JetStream stream
pub struct NatsLogTransport {
    client: Arc<NatsClient>,
}

impl NatsLogTransport {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }

    /// Connect with a dedicated client
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(NatsClient::connect(config).await?)))
    }

    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl LogTransport for NatsLogTransport {
    async fn write_entries(&self, request: &LogWriteRequest) -> Result<()> {
        let payload = serde_json::to_vec(request)?;
        let subject = self.client.config().log_subject(&request.log_name);

        let sequence = self
            .client
            .publish(self.name(), subject, &request.labels, payload.into())
            .await?;

        tracing::debug!(
            log = %request.log_name,
            entries = request.entries.len(),
            sequence,
            "Log batch written"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "nats-log"
    }
}

/// Pub/sub transport backed by a JetStream stream
pub struct NatsPubSubTransport {
    client: Arc<NatsClient>,
}

impl NatsPubSubTransport {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }

    /// Connect with a dedicated client
    pub async fn connect(config: NatsConfig) -> Result<Self> {
        Ok(Self::new(Arc::new(NatsClient::connect(config).await?)))
    }

    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait]
impl PubSubTransport for NatsPubSubTransport {
    async fn publish(&self, message: &PubSubMessage) -> Result<()> {
        let subject = self.client.config().topic_subject(&message.topic);
        self.client
            .publish(self.name(), subject, &message.attributes, message.data.clone())
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        "nats-pubsub"
    }
}
