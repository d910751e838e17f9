//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware layering)
//!     → hooks::hook_chain (correlation, transaction, stages)
//!     → handlers.rs (business routes, spans, typed faults)
//!     → error.rs (fault → normalized error contract)
//!     → Send to client (with x-trace-id)
//! ```

pub mod error;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{AppState, HttpServer, ServeError};
