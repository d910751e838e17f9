//! Error capture sink.
//!
//! # Responsibilities
//! - Single funnel for faults: handler-level and process-level
//! - `capture_*` never fails and never blocks the caller
//! - Request-scoped captures carry the request's correlation context;
//!   process-scoped captures carry a fault-class label instead
//! - Panic hook: a panic is an `uncaught` fault and forces shutdown, since
//!   process invariants can no longer be trusted

use std::future::Future;

use serde::Serialize;

use crate::lifecycle::Lifecycle;
use crate::telemetry::correlation::CorrelationContext;
use crate::telemetry::emitter::{EmitterHandle, TelemetryRecord};

/// Classification of a captured fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FaultClass {
    /// Raised by a request handler; recovered at the on-error hook.
    Handler,
    /// Uncaught synchronous fault (panic). Fatal.
    Uncaught,
    /// Background task failure nobody awaited. Not fatal by itself.
    UnhandledAsync,
    /// Failure before the listener was up.
    Startup,
    /// Failure while closing the listener or draining.
    Shutdown,
}

impl FaultClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            FaultClass::Handler => "handler",
            FaultClass::Uncaught => "uncaught",
            FaultClass::UnhandledAsync => "unhandled-async",
            FaultClass::Startup => "startup",
            FaultClass::Shutdown => "shutdown",
        }
    }
}

/// Funnel for captured faults. Cheap to clone; safe to call from any thread.
#[derive(Clone)]
pub struct ErrorCaptureSink {
    emitter: EmitterHandle,
}

impl ErrorCaptureSink {
    pub(crate) fn new(emitter: EmitterHandle) -> Self {
        Self { emitter }
    }

    /// Capture a fault raised during request processing.
    pub fn capture_request(
        &self,
        message: impl Into<String>,
        detail: Option<String>,
        correlation: &CorrelationContext,
        context: serde_json::Map<String, serde_json::Value>,
    ) {
        self.capture_inner(
            FaultClass::Handler,
            message.into(),
            detail,
            Some(correlation.clone()),
            context,
        );
    }

    /// Capture a fault with no request scope (panic, background task, startup).
    pub fn capture_process(
        &self,
        class: FaultClass,
        message: impl Into<String>,
        context: serde_json::Map<String, serde_json::Value>,
    ) {
        self.capture_inner(class, message.into(), None, None, context);
    }

    fn capture_inner(
        &self,
        class: FaultClass,
        message: String,
        detail: Option<String>,
        correlation: Option<CorrelationContext>,
        context: serde_json::Map<String, serde_json::Value>,
    ) {
        tracing::error!(
            fault_class = class.as_str(),
            detail = detail.as_deref().unwrap_or(""),
            "captured fault: {}",
            message
        );
        self.emitter.emit(TelemetryRecord::Error {
            message,
            detail,
            fault_class: class,
            correlation,
            context,
            timestamp: chrono::Utc::now().to_rfc3339(),
        });
    }
}

/// Flatten an error's source chain into a single detail string.
pub fn error_chain(error: &(dyn std::error::Error + 'static)) -> Option<String> {
    let mut parts = Vec::new();
    let mut source = error.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    if parts.is_empty() {
        None
    } else {
        Some(format!("caused by: {}", parts.join(": ")))
    }
}

/// Install a panic hook that captures the panic and forces shutdown.
///
/// The previous hook still runs, so the default backtrace printing is kept.
pub fn install_panic_hook(sink: ErrorCaptureSink, lifecycle: Lifecycle) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let message = if let Some(s) = info.payload().downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with non-string payload".to_string()
        };
        let mut context = serde_json::Map::new();
        if let Some(location) = info.location() {
            context.insert(
                "location".to_string(),
                serde_json::Value::String(location.to_string()),
            );
        }
        sink.capture_process(FaultClass::Uncaught, format!("panic: {}", message), context);
        lifecycle.raise_fatal(&message);
        previous(info);
    }));
}

/// Spawn a background task whose failure is captured as `unhandled-async`.
///
/// The task's error does not terminate the process; it is recorded so
/// repeated occurrences are visible to operators.
pub fn spawn_supervised<F, E>(
    name: &'static str,
    sink: ErrorCaptureSink,
    future: F,
) -> tokio::task::JoinHandle<()>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = future.await {
            let mut context = serde_json::Map::new();
            context.insert(
                "task".to_string(),
                serde_json::Value::String(name.to_string()),
            );
            sink.capture_process(
                FaultClass::UnhandledAsync,
                format!("background task '{}' failed: {}", name, err),
                context,
            );
        }
    })
}
