//! NATS JetStream transport configuration

use crate::types::{LogName, TopicName};
use async_nats::jetstream::stream;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// JetStream storage backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StorageType {
    #[default]
    File,
    Memory,
}

/// Connection and stream settings for the NATS transports
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NatsConfig {
    /// Server URL (e.g., "nats://127.0.0.1:4222")
    pub url: String,

    /// JetStream stream holding audit logs and messages
    pub stream_name: String,

    /// Root subject token; the stream captures `<prefix>.>`
    pub subject_prefix: String,

    pub storage: StorageType,

    /// Maximum messages retained (-1 = unlimited)
    pub max_events: i64,

    /// Maximum message age in seconds (0 = unlimited)
    pub max_age_secs: u64,

    /// Maximum stream size in bytes (-1 = unlimited)
    pub max_bytes: i64,

    pub connect_timeout_secs: u64,

    pub request_timeout_secs: u64,

    /// Auth token
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://127.0.0.1:4222".to_string(),
            stream_name: "SQLAUDIT".to_string(),
            subject_prefix: "sqlaudit".to_string(),
            storage: StorageType::File,
            max_events: -1,
            max_age_secs: 0,
            max_bytes: -1,
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
            token: None,
        }
    }
}

impl NatsConfig {
    /// Subjects captured by the stream
    pub fn stream_subjects(&self) -> Vec<String> {
        vec![format!("{}.>", self.subject_prefix)]
    }

    /// `<prefix>.logs.<project>.<log>`
    pub fn log_subject(&self, log_name: &LogName) -> String {
        format!(
            "{}.logs.{}.{}",
            self.subject_prefix,
            subject_token(&log_name.project_id),
            subject_token(&log_name.log_id)
        )
    }

    /// `<prefix>.topics.<project>.<topic>`
    pub fn topic_subject(&self, topic: &TopicName) -> String {
        format!(
            "{}.topics.{}.{}",
            self.subject_prefix,
            subject_token(&topic.project_id),
            subject_token(&topic.topic_id)
        )
    }

    /// How long to wait for a publish ack
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Client options: timeouts and optional token auth
    pub fn connect_options(&self) -> async_nats::ConnectOptions {
        let options = async_nats::ConnectOptions::new()
            .connection_timeout(Duration::from_secs(self.connect_timeout_secs))
            .request_timeout(Some(self.ack_timeout()));
        match &self.token {
            Some(token) => options.token(token.clone()),
            None => options,
        }
    }

    /// Limits-retained stream over every audit subject
    pub fn stream_config(&self) -> stream::Config {
        stream::Config {
            name: self.stream_name.clone(),
            subjects: self.stream_subjects(),
            storage: match self.storage {
                StorageType::File => stream::StorageType::File,
                StorageType::Memory => stream::StorageType::Memory,
            },
            max_messages: self.max_events,
            max_bytes: self.max_bytes,
            max_age: Duration::from_secs(self.max_age_secs),
            retention: stream::RetentionPolicy::Limits,
            ..Default::default()
        }
    }
}

/// Collapse a name into a single subject token
fn subject_token(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '.' | '*' | '>' | ' ' | '\t' => '_',
            c => c,
        })
        .collect()
}
