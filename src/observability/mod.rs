//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → tracing events (structured stderr logging, initialized in main)
//!     → logsink.rs (durable JSON lines with correlation ids)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → Log shipper tailing the append-only file
//!     → Metrics endpoint (Prometheus scrape)
//!     → Telemetry backend (see telemetry::emitter)
//! ```
//!
//! # Design Decisions
//! - Correlation ids flow through every log line that has a request scope
//! - Log-sink and metrics failures never surface to the client

pub mod logsink;
pub mod metrics;

pub use logsink::{spawn_log_sink, LogRecord, LogSinkHandle};
