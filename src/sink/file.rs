//! File-backed transports
//!
//! `FileLogTransport` appends one JSON line per log entry to
//! `<dir>/<log id>.jsonl`. `FileRecordSink` keeps each segment's records as
//! a JSON array in `<dir>/<segment>.records.json`; every write extends the
//! array already on disk and replaces the file atomically via temp file
//! + rename.

use super::{LogTransport, LogWriteRequest, RecordSink};
use crate::error::{AuditError, Result};
use crate::types::AuditRecord;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One line of a JSON-lines log file
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LogLine<'a> {
    log_name: String,
    resource: &'a super::MonitoredResource,
    labels: &'a BTreeMap<String, String>,
    entry: &'a crate::types::LogEntry,
}

/// Appends structured log entries to JSON-lines files
pub struct FileLogTransport {
    dir: PathBuf,
}

impl FileLogTransport {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory holding the log files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File a log id is appended to
    pub fn log_path(&self, log_id: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", file_stem(log_id)))
    }

    fn fail(&self, path: &Path, e: impl std::fmt::Display) -> AuditError {
        AuditError::transport(self.name(), format!("{}: {}", path.display(), e))
    }
}

#[async_trait]
impl LogTransport for FileLogTransport {
    async fn write_entries(&self, request: &LogWriteRequest) -> Result<()> {
        let log_name = request.log_name.to_string();
        let mut buf = Vec::new();
        for entry in &request.entries {
            let line = LogLine {
                log_name: log_name.clone(),
                resource: &request.resource,
                labels: &request.labels,
                entry,
            };
            serde_json::to_writer(&mut buf, &line)?;
            buf.push(b'\n');
        }

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.fail(&self.dir, e))?;

        let path = self.log_path(&request.log_name.log_id);
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| self.fail(&path, e))?;

        // A single write keeps one batch contiguous in the file
        file.write_all(&buf).await.map_err(|e| self.fail(&path, e))?;
        file.flush().await.map_err(|e| self.fail(&path, e))?;

        tracing::debug!(
            path = %path.display(),
            entries = request.entries.len(),
            "Log entries appended"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "file-log"
    }
}

/// Writes normalized records as one JSON document per segment
pub struct FileRecordSink {
    dir: PathBuf,
    /// Serializes read-extend-rename cycles
    write_lock: Mutex<()>,
}

impl FileRecordSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Records already written for a segment, oldest first
    pub async fn load(&self, segment: &str) -> Result<Vec<AuditRecord>> {
        let values = self.load_values(segment).await?;
        Ok(values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<std::result::Result<_, _>>()?)
    }

    async fn load_values(&self, segment: &str) -> Result<Vec<serde_json::Value>> {
        let path = self.segment_path(segment);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(serde_json::from_slice(&data)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(self.fail(&path, e)),
        }
    }

    /// File a segment's records are written to
    pub fn segment_path(&self, segment: &str) -> PathBuf {
        self.dir.join(format!("{}.records.json", file_stem(segment)))
    }

    fn fail(&self, path: &Path, e: impl std::fmt::Display) -> AuditError {
        AuditError::transport(self.name(), format!("{}: {}", path.display(), e))
    }
}

#[async_trait]
impl RecordSink for FileRecordSink {
    async fn write_records(&self, segment: &str, records: &[AuditRecord]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.load_values(segment).await?;
        for record in records {
            all.push(serde_json::to_value(record)?);
        }

        let json = serde_json::to_vec_pretty(&all)?;
        let path = self.segment_path(segment);
        let tmp_path = path.with_extension("tmp");

        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| self.fail(&self.dir, e))?;

        tokio::fs::write(&tmp_path, json)
            .await
            .map_err(|e| self.fail(&tmp_path, e))?;

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| self.fail(&path, e))?;

        tracing::debug!(
            path = %path.display(),
            count = records.len(),
            total = all.len(),
            "Records written"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "file-records"
    }
}

/// Make a name safe to use as a single path component
fn file_stem(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() || stem == "." || stem == ".." {
        "segment".to_string()
    } else {
        stem
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MonitoredResource;
    use crate::types::{LogEntry, LogName, Payload};
    use chrono::Utc;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("a3s-audit-test-{}", uuid::Uuid::new_v4()))
    }

    fn sample_record(session_id: i32) -> AuditRecord {
        AuditRecord {
            event_time: Utc::now(),
            class_type: "U".to_string(),
            object_name: "orders".to_string(),
            database_name: "sales".to_string(),
            session_id,
            statement: "SELECT 1".to_string(),
            sequence_number: "1".to_string(),
            server_principal_name: "sa".to_string(),
            database_principal_name: "dbo".to_string(),
            server_instance_name: "SQL01".to_string(),
            application_name: "app".to_string(),
            schema_name: "dbo".to_string(),
            transaction_id: 1,
            object_id: 2,
            duration_milliseconds: 3,
            succeeded: true,
            action_id: "SL".to_string(),
            connection_id: "c".to_string(),
        }
    }

    #[test]
    fn test_file_stem_sanitizes() {
        assert_eq!(file_stem("orders.xel"), "orders.xel");
        assert_eq!(file_stem("a/b\\c"), "a_b_c");
        assert_eq!(file_stem(""), "segment");
        assert_eq!(file_stem(".."), "segment");
    }

    #[tokio::test]
    async fn test_file_log_appends_lines() {
        let dir = temp_dir();
        let transport = FileLogTransport::new(&dir);
        let log_name = LogName::new("proj", "sqlaudit");

        let mut payload = Payload::new();
        payload.insert("eventTime", "2024-01-01");
        let mut labels = BTreeMap::new();
        labels.insert("FileLabel".to_string(), "orders".to_string());

        let request = LogWriteRequest {
            log_name: log_name.clone(),
            resource: MonitoredResource::global(),
            labels,
            entries: vec![
                LogEntry::new(&log_name, payload.clone()),
                LogEntry::new(&log_name, payload),
            ],
        };

        transport.write_entries(&request).await.unwrap();
        transport.write_entries(&request).await.unwrap();

        let content = std::fs::read_to_string(transport.log_path("sqlaudit")).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 4);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["logName"], "projects/proj/logs/sqlaudit");
        assert_eq!(first["resource"]["type"], "global");
        assert_eq!(first["labels"]["FileLabel"], "orders");
        assert_eq!(first["entry"]["payload"]["eventTime"], "2024-01-01");

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_file_record_sink_writes_segment() {
        let dir = temp_dir();
        let sink = FileRecordSink::new(&dir);

        sink.write_records("orders", &[sample_record(1), sample_record(2)])
            .await
            .unwrap();

        let path = sink.segment_path("orders");
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: Vec<AuditRecord> = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].session_id, 1);
        assert_eq!(parsed[1].session_id, 2);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_file_record_sink_keeps_earlier_flushes() {
        let dir = temp_dir();
        let sink = FileRecordSink::new(&dir);

        sink.write_records("orders_Audit_1.xel", &[sample_record(1), sample_record(2)])
            .await
            .unwrap();
        sink.write_records("orders_Audit_1.xel", &[sample_record(3)])
            .await
            .unwrap();
        sink.write_records("other.xel", &[sample_record(9)]).await.unwrap();

        let ids: Vec<i32> = sink
            .load("orders_Audit_1.xel")
            .await
            .unwrap()
            .iter()
            .map(|r| r.session_id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(sink.load("other.xel").await.unwrap().len(), 1);
        assert!(sink.load("never-written.xel").await.unwrap().is_empty());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
