//! The telemetry agent handle.
//!
//! # Responsibilities
//! - Own the emitter and error capture sink for the whole process
//! - Mint correlation contexts and start transactions
//! - Flush on shutdown, bounded
//!
//! The agent is an explicit value threaded through application state, not an
//! ambient global. It is created once at startup and cloned wherever needed;
//! an inactive agent mints absent correlation and records nothing, so every
//! call site works unchanged with telemetry off.

use std::sync::Arc;
use std::time::Duration;

use axum::http::Extensions;

use crate::config::schema::AgentConfig;
use crate::telemetry::capture::ErrorCaptureSink;
use crate::telemetry::correlation::CorrelationContext;
use crate::telemetry::emitter::{spawn_emitter, BackendSink, EmitterHandle};
use crate::telemetry::recorder::{self, Transaction, TransactionFinisher, TransactionType};

/// Process-wide telemetry handle. Cheap to clone.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    active: bool,
    service_name: String,
    environment: String,
    emitter: EmitterHandle,
    capture: ErrorCaptureSink,
}

impl Agent {
    /// Start the agent per configuration.
    ///
    /// With `active = false` no emitter task is spawned and every downstream
    /// consumer sees the "no correlation" state.
    pub fn start(config: &AgentConfig) -> Agent {
        if !config.active {
            tracing::info!("telemetry agent inactive; requests will carry no correlation ids");
            return Self::build(config, EmitterHandle::disabled(), false);
        }
        let sink = BackendSink::http(&config.server_url);
        let emitter = spawn_emitter(sink, Duration::from_secs(config.flush_interval_secs));
        tracing::info!(
            service_name = %config.service_name,
            environment = %config.environment,
            server_url = %config.server_url,
            "telemetry agent started"
        );
        Self::build(config, emitter, true)
    }

    /// Start an active agent against an explicit sink. Used by tests.
    pub fn with_sink(config: &AgentConfig, sink: BackendSink) -> Agent {
        let emitter = spawn_emitter(sink, Duration::from_secs(config.flush_interval_secs));
        Self::build(config, emitter, true)
    }

    /// Agent that records nothing.
    pub fn inactive() -> Agent {
        Self::build(&AgentConfig::default(), EmitterHandle::disabled(), false)
    }

    fn build(config: &AgentConfig, emitter: EmitterHandle, active: bool) -> Agent {
        let capture = ErrorCaptureSink::new(emitter.clone());
        Agent {
            inner: Arc::new(AgentInner {
                active,
                service_name: config.service_name.clone(),
                environment: config.environment.clone(),
                emitter,
                capture,
            }),
        }
    }

    pub fn is_active(&self) -> bool {
        self.inner.active
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    pub fn environment(&self) -> &str {
        &self.inner.environment
    }

    /// Attach (or retrieve) the correlation identity for a request.
    pub fn begin_correlation(&self, extensions: &mut Extensions) -> CorrelationContext {
        CorrelationContext::begin(extensions, self.inner.active)
    }

    /// Start a transaction tied to the given correlation identity.
    pub fn start_transaction(
        &self,
        name: impl Into<String>,
        kind: TransactionType,
        correlation: CorrelationContext,
    ) -> (Transaction, TransactionFinisher) {
        recorder::start_transaction(
            name,
            kind,
            correlation,
            self.inner.emitter.clone(),
            self.inner.active,
        )
    }

    /// The process-wide error capture sink.
    pub fn capture(&self) -> &ErrorCaptureSink {
        &self.inner.capture
    }

    /// Deliver everything queued, bounded by `timeout`. Best-effort.
    pub async fn flush(&self, timeout: Duration) {
        self.inner.emitter.flush(timeout).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::emitter::TelemetryRecord;
    use crate::telemetry::recorder::TransactionResult;

    #[tokio::test]
    async fn active_agent_emits_transaction_with_correlation() {
        let (sink, store) = BackendSink::memory();
        let agent = Agent::with_sink(&AgentConfig::default(), sink);

        let mut ext = Extensions::new();
        let correlation = agent.begin_correlation(&mut ext);
        assert!(correlation.is_present());

        let (_txn, finisher) =
            agent.start_transaction("GET /", TransactionType::Request, correlation.clone());
        finisher.finish(TransactionResult::Success);
        agent.flush(Duration::from_secs(1)).await;

        let records = store.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trace_id(), correlation.trace_id());
    }

    #[tokio::test]
    async fn inactive_agent_mints_absent_correlation() {
        let agent = Agent::inactive();
        let mut ext = Extensions::new();
        let correlation = agent.begin_correlation(&mut ext);
        assert!(!correlation.is_present());

        let (txn, finisher) =
            agent.start_transaction("GET /", TransactionType::Request, correlation);
        txn.set_label("ignored", true);
        finisher.finish(TransactionResult::Success);
        agent.flush(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn capture_reaches_the_same_sink() {
        let (sink, store) = BackendSink::memory();
        let agent = Agent::with_sink(&AgentConfig::default(), sink);

        agent.capture().capture_process(
            crate::telemetry::capture::FaultClass::Startup,
            "bind failed",
            serde_json::Map::new(),
        );
        agent.flush(Duration::from_secs(1)).await;

        let records = store.lock().unwrap();
        assert!(matches!(records[0], TelemetryRecord::Error { .. }));
    }
}
