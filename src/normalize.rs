//! Event normalization — raw field map to typed `AuditRecord`
//!
//! Each audit field is read through a typed accessor that performs its own
//! parse and reports the offending raw field name on failure. The one
//! exception is `event_time`: it must be present, but a value that does not
//! parse degrades to [`AuditRecord::UNSET_EVENT_TIME`] instead of failing.

use crate::error::{AuditError, Result};
use crate::types::{fields, AuditRecord, RawEvent};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::str::FromStr;

/// Offset-aware layouts, tried after RFC 3339
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f %:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%m/%d/%Y %I:%M:%S %p %:z",
    "%m/%d/%Y %H:%M:%S %:z",
];

/// Naive layouts, interpreted as UTC
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %I:%M:%S %p",
    "%m/%d/%Y %H:%M:%S",
];

/// Normalize a raw event into an `AuditRecord`
pub fn normalize(event: &RawEvent) -> Result<AuditRecord> {
    EventNormalizer::new(event).record()
}

/// Typed accessors over a raw event
pub struct EventNormalizer<'a> {
    event: &'a RawEvent,
}

impl<'a> EventNormalizer<'a> {
    pub fn new(event: &'a RawEvent) -> Self {
        Self { event }
    }

    /// Build the full record, failing on the first bad field
    pub fn record(&self) -> Result<AuditRecord> {
        Ok(AuditRecord {
            event_time: self.event_time()?,
            class_type: self.string(fields::CLASS_TYPE)?,
            object_name: self.string(fields::OBJECT_NAME)?,
            database_name: self.string(fields::DATABASE_NAME)?,
            session_id: self.int32(fields::SESSION_ID)?,
            statement: self.string(fields::STATEMENT)?,
            sequence_number: self.string(fields::SEQUENCE_NUMBER)?,
            server_principal_name: self.string(fields::SERVER_PRINCIPAL_NAME)?,
            transaction_id: self.int64(fields::TRANSACTION_ID)?,
            object_id: self.int32(fields::OBJECT_ID)?,
            database_principal_name: self.string(fields::DATABASE_PRINCIPAL_NAME)?,
            server_instance_name: self.string(fields::SERVER_INSTANCE_NAME)?,
            application_name: self.string(fields::APPLICATION_NAME)?,
            duration_milliseconds: self.int64(fields::DURATION_MILLISECONDS)?,
            schema_name: self.string(fields::SCHEMA_NAME)?,
            succeeded: self.boolean(fields::SUCCEEDED)?,
            action_id: self.string(fields::ACTION_ID)?,
            connection_id: self.string(fields::CONNECTION_ID)?,
        })
    }

    /// Required timestamp with a lenient parse; only absence fails
    pub fn event_time(&self) -> Result<DateTime<Utc>> {
        let value = self.raw(fields::EVENT_TIME)?;
        Ok(parse_timestamp(value).unwrap_or(AuditRecord::UNSET_EVENT_TIME))
    }

    /// Required string field, passed through unchanged
    pub fn string(&self, field: &str) -> Result<String> {
        self.raw(field).map(str::to_string)
    }

    pub fn int32(&self, field: &str) -> Result<i32> {
        self.number(field, "32-bit integer")
    }

    pub fn int64(&self, field: &str) -> Result<i64> {
        self.number(field, "64-bit integer")
    }

    pub fn boolean(&self, field: &str) -> Result<bool> {
        let value = self.raw(field)?;
        parse_bool(value)
            .ok_or_else(|| AuditError::field(field, format!("'{}' is not a boolean", value)))
    }

    fn number<T: FromStr>(&self, field: &str, kind: &str) -> Result<T> {
        let value = self.raw(field)?;
        value
            .trim()
            .parse::<T>()
            .map_err(|_| AuditError::field(field, format!("'{}' is not a {}", value, kind)))
    }

    fn raw(&self, field: &str) -> Result<&'a str> {
        self.event
            .get(field)
            .ok_or_else(|| AuditError::field(field, "field is absent"))
    }
}

/// Parse a boolean string: `true`/`false`, any case, surrounding whitespace ignored
pub fn parse_bool(value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Best-effort timestamp parse; values without an offset are taken as UTC
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(value, format) {
            return Some(ts.with_timezone(&Utc));
        }
    }

    for format in NAIVE_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ts| ts.and_utc())
}
