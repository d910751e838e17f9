//! Durable append-only log sink.
//!
//! # Responsibilities
//! - One JSON line per event, appended to the configured file
//! - Per-line atomicity: a single writer task serializes all appends, so
//!   concurrent requests never interleave partial records
//! - Fire-and-forget from the request's perspective; write failures go to
//!   local diagnostics, never to the client

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use crate::telemetry::correlation::CorrelationContext;

/// One record in the log file.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: String,
    pub level: &'static str,
    pub msg: String,
    pub trace_id: Option<String>,
    pub transaction_id: Option<String>,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl LogRecord {
    pub fn new(
        level: &'static str,
        msg: impl Into<String>,
        correlation: Option<&CorrelationContext>,
    ) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level,
            msg: msg.into(),
            trace_id: correlation.and_then(|c| c.trace_id().map(String::from)),
            transaction_id: correlation.and_then(|c| c.transaction_id().map(String::from)),
            fields: serde_json::Map::new(),
        }
    }

    /// Attach an extra field, flattened into the record.
    pub fn field(mut self, key: &str, value: serde_json::Value) -> Self {
        self.fields.insert(key.to_string(), value);
        self
    }
}

enum Command {
    Append(Box<LogRecord>),
    Flush(oneshot::Sender<()>),
}

/// Handle for appending to the log file. Cheap to clone.
#[derive(Clone)]
pub struct LogSinkHandle {
    tx: Option<mpsc::UnboundedSender<Command>>,
}

impl LogSinkHandle {
    /// Handle that discards all records.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Append a record. Never blocks, never fails.
    pub fn append(&self, record: LogRecord) {
        let Some(tx) = &self.tx else { return };
        if tx.send(Command::Append(Box::new(record))).is_err() {
            tracing::debug!("log sink channel closed; record dropped");
        }
    }

    /// Wait for everything queued so far to hit the file, bounded by
    /// `timeout`.
    pub async fn flush(&self, timeout: Duration) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(Command::Flush(ack_tx)).is_err() {
            return;
        }
        let _ = tokio::time::timeout(timeout, ack_rx).await;
    }
}

/// Spawn the writer task for the given log file.
pub fn spawn_log_sink(path: PathBuf) -> LogSinkHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                if let Err(err) = tokio::fs::create_dir_all(parent).await {
                    tracing::warn!(path = %path.display(), error = %err, "cannot create log directory");
                }
            }
        }
        let mut file = match tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
        {
            Ok(file) => Some(file),
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "log sink unavailable; records will be dropped");
                None
            }
        };

        while let Some(command) = rx.recv().await {
            match command {
                Command::Append(record) => {
                    let Some(file) = file.as_mut() else { continue };
                    let mut line = match serde_json::to_string(&record) {
                        Ok(line) => line,
                        Err(err) => {
                            tracing::warn!(error = %err, "unserializable log record dropped");
                            continue;
                        }
                    };
                    line.push('\n');
                    if let Err(err) = file.write_all(line.as_bytes()).await {
                        tracing::warn!(error = %err, "log sink write failed");
                    }
                }
                Command::Flush(ack) => {
                    if let Some(file) = file.as_mut() {
                        let _ = file.flush().await;
                    }
                    let _ = ack.send(());
                }
            }
        }
    });

    LogSinkHandle { tx: Some(tx) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn appends_one_json_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        let sink = spawn_log_sink(path.clone());

        let mut ext = axum::http::Extensions::new();
        let correlation = CorrelationContext::begin(&mut ext, true);
        sink.append(
            LogRecord::new("info", "request to /submit-data", Some(&correlation))
                .field("method", serde_json::json!("POST")),
        );
        sink.append(LogRecord::new("error", "boom", None));
        sink.flush(Duration::from_secs(1)).await;

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["level"], "info");
        assert_eq!(first["method"], "POST");
        assert_eq!(
            first["trace_id"].as_str(),
            correlation.trace_id()
        );

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["trace_id"], serde_json::Value::Null);
    }

    #[tokio::test]
    async fn disabled_sink_is_inert() {
        let sink = LogSinkHandle::disabled();
        sink.append(LogRecord::new("info", "dropped", None));
        sink.flush(Duration::from_millis(10)).await;
    }
}
