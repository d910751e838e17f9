//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Start agent → Bind listener → Listening
//!
//! Shutdown (manager.rs):
//!     Signal received → Draining (stop accepting, bounded drain)
//!     → flush telemetry → Stopped → exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → begin draining
//!     Fatal fault (panic) → forced stop, non-zero exit
//! ```
//!
//! # Design Decisions
//! - States only move forward: Starting → Listening → Draining → Stopped
//! - Draining is bounded by a grace period; the process never hangs on a
//!   stuck request
//! - Telemetry flush at shutdown is best-effort with a timeout

mod manager;
pub mod signals;

pub use manager::{Lifecycle, LifecycleState};
