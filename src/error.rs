//! Error types for a3s-audit

use thiserror::Error;

/// Errors that can occur while normalizing or delivering audit events
#[derive(Debug, Error)]
pub enum AuditError {
    /// A required raw field is absent or cannot be coerced to its type
    #[error("Field '{field}' missing or invalid: {reason}")]
    FieldMissingOrInvalid {
        field: String,
        reason: String,
    },

    /// A log, record, or pub/sub transport call failed
    #[error("Transport '{transport}' failed: {reason}")]
    Transport {
        transport: String,
        reason: String,
    },

    /// Transport connection failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// JetStream stream creation or management error
    #[error("Stream error: {0}")]
    Stream(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure in a file-backed sink
    #[error("I/O error: {0}")]
    Io(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AuditError {
    /// Build a `FieldMissingOrInvalid` error for a raw field
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FieldMissingOrInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Build a `Transport` error
    pub fn transport(transport: impl Into<String>, reason: impl ToString) -> Self {
        Self::Transport {
            transport: transport.into(),
            reason: reason.to_string(),
        }
    }

    /// Name of the offending raw field, if this is a field error
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::FieldMissingOrInvalid { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Whether this error only affects the single event being normalized
    pub fn is_field_error(&self) -> bool {
        matches!(self, Self::FieldMissingOrInvalid { .. })
    }
}

/// Result type alias for audit operations
pub type Result<T> = std::result::Result<T, AuditError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_error_names_field() {
        let err = AuditError::field("session_id", "not an i32");
        assert!(err.is_field_error());
        assert_eq!(err.field_name(), Some("session_id"));
        assert_eq!(
            err.to_string(),
            "Field 'session_id' missing or invalid: not an i32"
        );
    }

    #[test]
    fn test_transport_error_is_not_field_error() {
        let err = AuditError::transport("memory-log", "unavailable");
        assert!(!err.is_field_error());
        assert!(err.field_name().is_none());
        assert!(err.to_string().contains("memory-log"));
    }
}
