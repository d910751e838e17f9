//! Telemetry subsystem: correlation, recording, capture, emission.
//!
//! # Data Flow
//! ```text
//! request arrives
//!     → correlation.rs (mint trace id + transaction id, once per request)
//!     → recorder.rs (Transaction wraps the request; Spans wrap inner work)
//!     → capture.rs (faults, request- and process-scoped)
//!     → emitter.rs (batch + fire-and-forget delivery to the backend)
//!
//! agent.rs owns the pieces and is threaded through application state.
//! ```
//!
//! # Design Decisions
//! - No ambient global agent: the handle is injected at startup
//! - Emission never blocks or fails the request path
//! - Ending a transaction or span twice is a no-op, not an error
//! - Spans are RAII guards so cancellation still closes them

pub mod agent;
pub mod capture;
pub mod correlation;
pub mod emitter;
pub mod recorder;
pub mod value;

pub use agent::Agent;
pub use capture::{ErrorCaptureSink, FaultClass};
pub use correlation::{CorrelationContext, X_TRACE_ID};
pub use recorder::{Span, SpanOutcome, Transaction, TransactionResult, TransactionType};
pub use value::LabelValue;
