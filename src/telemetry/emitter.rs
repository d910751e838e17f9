//! Asynchronous, best-effort emission of telemetry records.
//!
//! # Responsibilities
//! - Accept records from any request without blocking the request path
//! - Batch records and deliver them to the backend on an interval
//! - Swallow delivery failures (logged locally, never propagated)
//! - Bounded flush for shutdown paths
//!
//! Records travel over an unbounded channel to a single background task; a
//! full or closed channel drops the record with a local debug log. The
//! backend's ack/retry policy is not our concern.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};

use crate::telemetry::capture::FaultClass;
use crate::telemetry::correlation::CorrelationContext;
use crate::telemetry::recorder::{SpanOutcome, TransactionResult, TransactionType};
use crate::telemetry::value::LabelValue;

/// Records delivered per batch before an early flush is forced.
const MAX_BATCH: usize = 256;

/// Wall-clock timing attached to every record.
#[derive(Debug, Clone, Serialize)]
pub struct Timing {
    /// Unix epoch milliseconds at start.
    pub started_at_ms: u64,
    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl Timing {
    pub fn new(started_at: SystemTime, duration: Duration) -> Self {
        let started_at_ms = started_at
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;
        Self {
            started_at_ms,
            duration_ms: duration.as_millis() as u64,
        }
    }
}

/// One record on the wire to the telemetry backend.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryRecord {
    Transaction {
        name: String,
        kind: TransactionType,
        result: TransactionResult,
        labels: BTreeMap<String, LabelValue>,
        custom_context: serde_json::Map<String, serde_json::Value>,
        correlation: CorrelationContext,
        timing: Timing,
        spans_opened: u64,
        spans_closed: u64,
    },
    Span {
        name: String,
        category: String,
        outcome: SpanOutcome,
        labels: BTreeMap<String, LabelValue>,
        correlation: CorrelationContext,
        timing: Timing,
    },
    Error {
        message: String,
        detail: Option<String>,
        fault_class: FaultClass,
        correlation: Option<CorrelationContext>,
        context: serde_json::Map<String, serde_json::Value>,
        timestamp: String,
    },
}

impl TelemetryRecord {
    /// Trace id this record correlates to, when present.
    pub fn trace_id(&self) -> Option<&str> {
        match self {
            TelemetryRecord::Transaction { correlation, .. } => correlation.trace_id(),
            TelemetryRecord::Span { correlation, .. } => correlation.trace_id(),
            TelemetryRecord::Error { correlation, .. } => {
                correlation.as_ref().and_then(|c| c.trace_id())
            }
        }
    }
}

/// Destination for batched records.
#[derive(Clone)]
pub enum BackendSink {
    /// POST newline-delimited JSON batches to an intake endpoint.
    Http {
        client: reqwest::Client,
        endpoint: String,
    },
    /// Collect records in memory. Used by tests.
    Memory(Arc<Mutex<Vec<TelemetryRecord>>>),
}

impl BackendSink {
    /// Sink posting to `<server_url>/intake/v2/events`.
    pub fn http(server_url: &str) -> Self {
        let endpoint = format!("{}/intake/v2/events", server_url.trim_end_matches('/'));
        BackendSink::Http {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    /// In-memory sink plus a handle for inspecting what was delivered.
    pub fn memory() -> (Self, Arc<Mutex<Vec<TelemetryRecord>>>) {
        let store = Arc::new(Mutex::new(Vec::new()));
        (BackendSink::Memory(store.clone()), store)
    }

    async fn deliver(&self, batch: &[TelemetryRecord]) -> Result<(), String> {
        match self {
            BackendSink::Http { client, endpoint } => {
                let mut body = String::new();
                for record in batch {
                    match serde_json::to_string(record) {
                        Ok(line) => {
                            body.push_str(&line);
                            body.push('\n');
                        }
                        Err(err) => {
                            tracing::debug!(error = %err, "unserializable telemetry record dropped")
                        }
                    }
                }
                let response = client
                    .post(endpoint)
                    .header("content-type", "application/x-ndjson")
                    .body(body)
                    .send()
                    .await
                    .map_err(|e| e.to_string())?;
                if !response.status().is_success() {
                    return Err(format!("backend returned {}", response.status()));
                }
                Ok(())
            }
            BackendSink::Memory(store) => {
                let mut store = store.lock().map_err(|_| "sink mutex poisoned".to_string())?;
                store.extend_from_slice(batch);
                Ok(())
            }
        }
    }
}

enum Command {
    Record(Box<TelemetryRecord>),
    Flush(oneshot::Sender<()>),
}

/// Cheap handle for submitting records to the emitter task.
///
/// A disabled handle (inactive agent) drops everything on the floor.
#[derive(Clone)]
pub struct EmitterHandle {
    tx: Option<mpsc::UnboundedSender<Command>>,
}

impl EmitterHandle {
    /// Handle that discards all records.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Submit a record. Never blocks, never fails.
    pub fn emit(&self, record: TelemetryRecord) {
        let Some(tx) = &self.tx else { return };
        if tx.send(Command::Record(Box::new(record))).is_err() {
            tracing::debug!("telemetry channel closed; record dropped");
        }
    }

    /// Deliver everything queued so far, bounded by `timeout`.
    ///
    /// Best-effort: a slow or unreachable backend cannot hold this up past
    /// the bound.
    pub async fn flush(&self, timeout: Duration) {
        let Some(tx) = &self.tx else { return };
        let (ack_tx, ack_rx) = oneshot::channel();
        if tx.send(Command::Flush(ack_tx)).is_err() {
            return;
        }
        if tokio::time::timeout(timeout, ack_rx).await.is_err() {
            tracing::warn!("telemetry flush timed out; records may be dropped");
        }
    }
}

/// Spawn the background emission task.
pub fn spawn_emitter(sink: BackendSink, flush_interval: Duration) -> EmitterHandle {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut batch: Vec<TelemetryRecord> = Vec::new();
        let mut ticker = tokio::time::interval(flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Record(record)) => {
                        batch.push(*record);
                        if batch.len() >= MAX_BATCH {
                            deliver_batch(&sink, &mut batch).await;
                        }
                    }
                    Some(Command::Flush(ack)) => {
                        deliver_batch(&sink, &mut batch).await;
                        let _ = ack.send(());
                    }
                    None => {
                        deliver_batch(&sink, &mut batch).await;
                        break;
                    }
                },
                _ = ticker.tick() => {
                    deliver_batch(&sink, &mut batch).await;
                }
            }
        }
    });

    EmitterHandle { tx: Some(tx) }
}

async fn deliver_batch(sink: &BackendSink, batch: &mut Vec<TelemetryRecord>) {
    if batch.is_empty() {
        return;
    }
    if let Err(err) = sink.deliver(batch).await {
        tracing::debug!(error = %err, count = batch.len(), "telemetry delivery failed; batch dropped");
    }
    batch.clear();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error_record(message: &str) -> TelemetryRecord {
        TelemetryRecord::Error {
            message: message.to_string(),
            detail: None,
            fault_class: FaultClass::Handler,
            correlation: None,
            context: serde_json::Map::new(),
            timestamp: "2026-01-01T00:00:00Z".to_string(),
        }
    }

    #[tokio::test]
    async fn flush_delivers_queued_records() {
        let (sink, store) = BackendSink::memory();
        let emitter = spawn_emitter(sink, Duration::from_secs(3600));

        emitter.emit(error_record("one"));
        emitter.emit(error_record("two"));
        emitter.flush(Duration::from_secs(1)).await;

        assert_eq!(store.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn disabled_handle_is_inert() {
        let emitter = EmitterHandle::disabled();
        emitter.emit(error_record("dropped"));
        emitter.flush(Duration::from_millis(10)).await;
    }

    #[test]
    fn record_serializes_with_type_tag() {
        let json = serde_json::to_value(error_record("boom")).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
        assert_eq!(json["correlation"], serde_json::Value::Null);
    }
}
