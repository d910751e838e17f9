//! Per-request correlation identity.
//!
//! # Responsibilities
//! - Mint a trace id + transaction id pair once per inbound request
//! - Re-entrant `begin`: a second call for the same request returns the
//!   identity already attached, never a fresh one
//! - Represent the "agent inactive" case as absent ids, which every consumer
//!   must tolerate

use std::time::Instant;

use axum::http::Extensions;
use serde::Serialize;
use uuid::Uuid;

/// Response header carrying the request's trace id back to the client.
pub const X_TRACE_ID: &str = "x-trace-id";

/// Immutable correlation identity for one request.
///
/// `trace_id` and `transaction_id` are `None` when the telemetry agent is
/// inactive. Consumers branch on presence; absence is a valid state, not an
/// error.
#[derive(Debug, Clone, Serialize)]
pub struct CorrelationContext {
    trace_id: Option<String>,
    transaction_id: Option<String>,
    #[serde(skip)]
    started_at: Instant,
}

impl CorrelationContext {
    /// Attach a correlation identity to the request, or return the one
    /// already attached.
    ///
    /// Idempotent per request: hook re-entry sees the same ids.
    pub fn begin(extensions: &mut Extensions, active: bool) -> CorrelationContext {
        if let Some(existing) = extensions.get::<CorrelationContext>() {
            return existing.clone();
        }
        let ctx = if active {
            CorrelationContext::minted()
        } else {
            CorrelationContext::absent()
        };
        extensions.insert(ctx.clone());
        ctx
    }

    fn minted() -> Self {
        let trace_id = Uuid::new_v4().simple().to_string();
        // Transaction ids are 64-bit on the wire: half a v4 uuid.
        let transaction_id = Uuid::new_v4().simple().to_string()[..16].to_string();
        Self {
            trace_id: Some(trace_id),
            transaction_id: Some(transaction_id),
            started_at: Instant::now(),
        }
    }

    /// The "no correlation" state used when the agent is inactive.
    pub fn absent() -> Self {
        Self {
            trace_id: None,
            transaction_id: None,
            started_at: Instant::now(),
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    /// Whether this context carries real ids.
    pub fn is_present(&self) -> bool {
        self.trace_id.is_some()
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn begin_mints_nonempty_ids_when_active() {
        let mut ext = Extensions::new();
        let ctx = CorrelationContext::begin(&mut ext, true);
        assert!(ctx.is_present());
        assert_eq!(ctx.trace_id().unwrap().len(), 32);
        assert_eq!(ctx.transaction_id().unwrap().len(), 16);
    }

    #[test]
    fn begin_is_idempotent_per_request() {
        let mut ext = Extensions::new();
        let first = CorrelationContext::begin(&mut ext, true);
        let second = CorrelationContext::begin(&mut ext, true);
        assert_eq!(first.trace_id(), second.trace_id());
        assert_eq!(first.transaction_id(), second.transaction_id());
    }

    #[test]
    fn inactive_agent_yields_absent_ids() {
        let mut ext = Extensions::new();
        let ctx = CorrelationContext::begin(&mut ext, false);
        assert!(!ctx.is_present());
        assert!(ctx.trace_id().is_none());
        assert!(ctx.transaction_id().is_none());
    }

    #[test]
    fn distinct_requests_get_distinct_ids() {
        let mut a = Extensions::new();
        let mut b = Extensions::new();
        let ctx_a = CorrelationContext::begin(&mut a, true);
        let ctx_b = CorrelationContext::begin(&mut b, true);
        assert_ne!(ctx_a.trace_id(), ctx_b.trace_id());
    }
}
