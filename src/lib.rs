//! Instrumented HTTP API service.
//!
//! Every inbound request is assigned a correlation identity, carried through
//! an ordered chain of lifecycle hooks, and recorded as a transaction with
//! nested spans; faults are funneled into a capture sink and everything is
//! emitted, best-effort, to a telemetry backend and a durable log file.
//!
//! # Architecture Overview
//!
//! ```text
//!                ┌────────────────────────────────────────────────────┐
//!                │                    TRACED API                      │
//!                │                                                    │
//!  Client        │  ┌────────┐   ┌───────────────────────────────┐   │
//!  ──────────────┼─▶│  http  │──▶│          hook chain           │   │
//!                │  │ server │   │ on_receive → pre_handle →     │   │
//!                │  └────────┘   │ handler → on_send | on_error  │   │
//!                │               └──────────────┬────────────────┘   │
//!                │                              │                    │
//!                │                              ▼                    │
//!                │  ┌──────────────────────────────────────────────┐ │
//!                │  │                telemetry                     │ │
//!                │  │ correlation · recorder · capture · emitter ──┼─┼──▶ backend
//!                │  └──────────────────────────────────────────────┘ │
//!                │                                                    │
//!                │  ┌────────────────────────────────────────────┐   │
//!                │  │            Cross-Cutting Concerns           │   │
//!                │  │  ┌────────┐ ┌───────────────┐ ┌──────────┐  │   │
//!                │  │  │ config │ │ observability │ │lifecycle │  │   │
//!                │  │  │        │ │ logsink+metrics│ │ drain    │  │   │
//!                │  │  └────────┘ └───────────────┘ └──────────┘  │   │
//!                │  └────────────────────────────────────────────┘   │
//!                └────────────────────────────────────────────────────┘
//! ```

// Core subsystems
pub mod config;
pub mod hooks;
pub mod http;
pub mod telemetry;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;

pub use config::ServiceConfig;
pub use http::{HttpServer, ServeError};
pub use lifecycle::Lifecycle;
pub use telemetry::Agent;
