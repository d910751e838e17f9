//! Transaction and span recording.
//!
//! # Responsibilities
//! - One `Transaction` per request, shared with handler code for label and
//!   custom-context attachment
//! - Structurally single finalize: only the `TransactionFinisher` (held by
//!   the hook chain, consumed on use) can finish a transaction
//! - `Span` is an owned guard: ended on every exit path, including drops on
//!   cancellation, where it records an aborted outcome
//! - Ending is idempotent; attachment after end is dropped with a debug log
//!
//! Emission happens at finalize time, through the fire-and-forget emitter.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Instant, SystemTime};

use serde::Serialize;

use crate::telemetry::correlation::CorrelationContext;
use crate::telemetry::emitter::{EmitterHandle, TelemetryRecord, Timing};
use crate::telemetry::value::LabelValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionType {
    Request,
    Background,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransactionResult {
    Pending,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpanOutcome {
    Success,
    Error,
    Aborted,
}

struct TransactionInner {
    name: Mutex<String>,
    kind: TransactionType,
    correlation: CorrelationContext,
    start: Instant,
    started_at: SystemTime,
    labels: Mutex<BTreeMap<String, LabelValue>>,
    custom: Mutex<serde_json::Map<String, serde_json::Value>>,
    result: Mutex<TransactionResult>,
    ended: AtomicBool,
    spans_opened: AtomicU64,
    spans_closed: AtomicU64,
    emitter: EmitterHandle,
    recording: bool,
}

impl TransactionInner {
    fn finish(&self, result: TransactionResult) {
        // Second finish is a no-op, not an error.
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        let duration = self.start.elapsed();
        *self.result.lock().expect("transaction result mutex poisoned") = result;

        if !self.recording {
            return;
        }
        let record = TelemetryRecord::Transaction {
            name: self.name.lock().expect("transaction name mutex poisoned").clone(),
            kind: self.kind,
            result,
            labels: self
                .labels
                .lock()
                .expect("transaction labels mutex poisoned")
                .clone(),
            custom_context: self
                .custom
                .lock()
                .expect("transaction context mutex poisoned")
                .clone(),
            correlation: self.correlation.clone(),
            timing: Timing::new(self.started_at, duration),
            spans_opened: self.spans_opened.load(Ordering::Acquire),
            spans_closed: self.spans_closed.load(Ordering::Acquire),
        };
        self.emitter.emit(record);
    }
}

/// Top-level traced unit for one request.
///
/// Cloneable handle: the hook chain creates it and stores a clone in the
/// request extensions so handlers can attach labels, custom context, and
/// spans. Finalization is not reachable from here; see
/// [`TransactionFinisher`].
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    pub fn name(&self) -> String {
        self.inner
            .name
            .lock()
            .expect("transaction name mutex poisoned")
            .clone()
    }

    /// Rename the transaction. Dropped if it has already ended.
    pub fn set_name(&self, name: impl Into<String>) {
        if self.reject_if_ended("name") {
            return;
        }
        *self
            .inner
            .name
            .lock()
            .expect("transaction name mutex poisoned") = name.into();
    }

    /// Attach an indexed scalar label. Dropped if the transaction has ended.
    pub fn set_label(&self, key: impl Into<String>, value: impl Into<LabelValue>) {
        if self.reject_if_ended("label") {
            return;
        }
        self.inner
            .labels
            .lock()
            .expect("transaction labels mutex poisoned")
            .insert(key.into(), value.into());
    }

    /// Attach a structured custom-context block under `key`.
    ///
    /// Unlike labels, custom context is not indexed and may carry nested
    /// payloads; the backend redacts it server-side.
    pub fn set_custom_context(&self, key: impl Into<String>, value: serde_json::Value) {
        if self.reject_if_ended("custom context") {
            return;
        }
        self.inner
            .custom
            .lock()
            .expect("transaction context mutex poisoned")
            .insert(key.into(), value);
    }

    pub fn correlation(&self) -> &CorrelationContext {
        &self.inner.correlation
    }

    pub fn result(&self) -> TransactionResult {
        *self
            .inner
            .result
            .lock()
            .expect("transaction result mutex poisoned")
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    pub fn spans_opened(&self) -> u64 {
        self.inner.spans_opened.load(Ordering::Acquire)
    }

    pub fn spans_closed(&self) -> u64 {
        self.inner.spans_closed.load(Ordering::Acquire)
    }

    /// Start a child span.
    ///
    /// The returned guard must live exactly as long as the operation it
    /// measures: `end` it on success, or let it drop (early return, client
    /// disconnect) to record an aborted outcome.
    pub fn start_span(&self, name: impl Into<String>, category: impl Into<String>) -> Span {
        let recording = self.inner.recording && !self.is_ended();
        if self.is_ended() {
            tracing::debug!("span opened on ended transaction; it will not be recorded");
        }
        self.inner.spans_opened.fetch_add(1, Ordering::AcqRel);
        Span {
            name: name.into(),
            category: category.into(),
            labels: BTreeMap::new(),
            start: Instant::now(),
            started_at: SystemTime::now(),
            parent: Arc::clone(&self.inner),
            recording,
            closed: false,
        }
    }

    fn reject_if_ended(&self, what: &str) -> bool {
        if self.is_ended() {
            tracing::debug!(
                transaction = %self.name(),
                "{} attached after transaction end; dropped",
                what
            );
            return true;
        }
        false
    }
}

/// Consumed-once capability to finalize a transaction.
///
/// Not cloneable: holding it is the right to decide the outcome, and using
/// it gives that right up. Dropping it unfinished (cancelled request)
/// finalizes with an error result so no transaction is left open.
pub struct TransactionFinisher {
    inner: Arc<TransactionInner>,
}

impl TransactionFinisher {
    /// Finalize the transaction with the given result and emit its record.
    pub fn finish(self, result: TransactionResult) {
        self.inner.finish(result);
    }
}

impl Drop for TransactionFinisher {
    fn drop(&mut self) {
        // Reached un-finished only when the request was torn down mid-flight.
        self.inner.finish(TransactionResult::Error);
    }
}

/// Create a transaction plus its single finisher.
pub(crate) fn start_transaction(
    name: impl Into<String>,
    kind: TransactionType,
    correlation: CorrelationContext,
    emitter: EmitterHandle,
    recording: bool,
) -> (Transaction, TransactionFinisher) {
    let inner = Arc::new(TransactionInner {
        name: Mutex::new(name.into()),
        kind,
        correlation,
        start: Instant::now(),
        started_at: SystemTime::now(),
        labels: Mutex::new(BTreeMap::new()),
        custom: Mutex::new(serde_json::Map::new()),
        result: Mutex::new(TransactionResult::Pending),
        ended: AtomicBool::new(false),
        spans_opened: AtomicU64::new(0),
        spans_closed: AtomicU64::new(0),
        emitter,
        recording,
    });
    (
        Transaction {
            inner: Arc::clone(&inner),
        },
        TransactionFinisher { inner },
    )
}

/// Nested traced sub-operation within a transaction.
pub struct Span {
    name: String,
    category: String,
    labels: BTreeMap<String, LabelValue>,
    start: Instant,
    started_at: SystemTime,
    parent: Arc<TransactionInner>,
    recording: bool,
    closed: bool,
}

impl Span {
    /// Attach an indexed scalar label.
    pub fn set_label(&mut self, key: impl Into<String>, value: impl Into<LabelValue>) {
        if self.closed {
            tracing::debug!(span = %self.name, "label attached after span end; dropped");
            return;
        }
        self.labels.insert(key.into(), value.into());
    }

    /// End the span successfully.
    pub fn end(mut self) {
        self.close(SpanOutcome::Success);
    }

    /// End the span with an explicit outcome.
    pub fn end_with(mut self, outcome: SpanOutcome) {
        self.close(outcome);
    }

    fn close(&mut self, outcome: SpanOutcome) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.parent.spans_closed.fetch_add(1, Ordering::AcqRel);

        if !self.recording {
            return;
        }
        let record = TelemetryRecord::Span {
            name: std::mem::take(&mut self.name),
            category: std::mem::take(&mut self.category),
            outcome,
            labels: std::mem::take(&mut self.labels),
            correlation: self.parent.correlation.clone(),
            timing: Timing::new(self.started_at, self.start.elapsed()),
        };
        self.parent.emitter.emit(record);
    }
}

impl Drop for Span {
    fn drop(&mut self) {
        // Un-ended at drop means the measured operation never completed.
        self.close(SpanOutcome::Aborted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::emitter::{spawn_emitter, BackendSink};
    use std::time::Duration;

    fn recording_pair() -> (
        Transaction,
        TransactionFinisher,
        EmitterHandle,
        Arc<Mutex<Vec<TelemetryRecord>>>,
    ) {
        let (sink, store) = BackendSink::memory();
        let emitter = spawn_emitter(sink, Duration::from_secs(3600));
        let correlation = {
            let mut ext = axum::http::Extensions::new();
            CorrelationContext::begin(&mut ext, true)
        };
        let (txn, finisher) = start_transaction(
            "GET /test",
            TransactionType::Request,
            correlation,
            emitter.clone(),
            true,
        );
        (txn, finisher, emitter, store)
    }

    #[tokio::test]
    async fn finish_emits_exactly_one_transaction_record() {
        let (txn, finisher, emitter, store) = recording_pair();
        txn.set_label("http.method", "GET");
        finisher.finish(TransactionResult::Success);
        emitter.flush(Duration::from_secs(1)).await;

        let records = store.lock().unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            TelemetryRecord::Transaction { result, labels, .. } => {
                assert_eq!(*result, TransactionResult::Success);
                assert_eq!(labels["http.method"], LabelValue::from("GET"));
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[tokio::test]
    async fn attachment_after_end_is_dropped() {
        let (txn, finisher, emitter, store) = recording_pair();
        finisher.finish(TransactionResult::Success);
        txn.set_label("late", true);
        txn.set_custom_context("late", serde_json::json!({"too": "late"}));
        emitter.flush(Duration::from_secs(1)).await;

        let records = store.lock().unwrap();
        match &records[0] {
            TelemetryRecord::Transaction {
                labels,
                custom_context,
                ..
            } => {
                assert!(labels.is_empty());
                assert!(custom_context.is_empty());
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[tokio::test]
    async fn dropping_finisher_finalizes_as_error() {
        let (txn, finisher, emitter, store) = recording_pair();
        drop(finisher);
        assert!(txn.is_ended());
        emitter.flush(Duration::from_secs(1)).await;

        let records = store.lock().unwrap();
        assert_eq!(records.len(), 1);
        match &records[0] {
            TelemetryRecord::Transaction { result, .. } => {
                assert_eq!(*result, TransactionResult::Error);
            }
            other => panic!("unexpected record: {:?}", other),
        }
    }

    #[tokio::test]
    async fn span_end_emits_once_and_drop_after_end_is_noop() {
        let (txn, finisher, emitter, store) = recording_pair();
        let mut span = txn.start_span("process", "custom");
        span.set_label("operation", "test");
        span.end();
        finisher.finish(TransactionResult::Success);
        emitter.flush(Duration::from_secs(1)).await;

        let records = store.lock().unwrap();
        let spans: Vec<_> = records
            .iter()
            .filter(|r| matches!(r, TelemetryRecord::Span { .. }))
            .collect();
        assert_eq!(spans.len(), 1);
        match spans[0] {
            TelemetryRecord::Span { outcome, .. } => {
                assert_eq!(*outcome, SpanOutcome::Success);
            }
            _ => unreachable!(),
        }
        assert_eq!(txn.spans_opened(), 1);
        assert_eq!(txn.spans_closed(), 1);
    }

    #[tokio::test]
    async fn dropped_span_records_aborted_outcome() {
        let (txn, finisher, emitter, store) = recording_pair();
        {
            let _span = txn.start_span("interrupted", "custom");
            // dropped without end(): the wrapped operation never finished
        }
        assert_eq!(txn.spans_opened(), txn.spans_closed());
        finisher.finish(TransactionResult::Success);
        emitter.flush(Duration::from_secs(1)).await;

        let records = store.lock().unwrap();
        let aborted = records.iter().any(|r| {
            matches!(
                r,
                TelemetryRecord::Span {
                    outcome: SpanOutcome::Aborted,
                    ..
                }
            )
        });
        assert!(aborted);
    }

    #[tokio::test]
    async fn inactive_transaction_records_nothing() {
        let (sink, store) = BackendSink::memory();
        let emitter = spawn_emitter(sink, Duration::from_secs(3600));
        let (txn, finisher) = start_transaction(
            "GET /test",
            TransactionType::Request,
            CorrelationContext::absent(),
            emitter.clone(),
            false,
        );
        let span = txn.start_span("noop", "custom");
        span.end();
        finisher.finish(TransactionResult::Success);
        emitter.flush(Duration::from_secs(1)).await;

        assert!(store.lock().unwrap().is_empty());
    }
}
