//! OS signal handling.
//!
//! # Responsibilities
//! - Register handlers for the two recognized termination signals
//!   (SIGTERM, SIGINT)
//! - Translate either into the Draining transition
//!
//! # Design Decisions
//! - Uses Tokio's signal handling (async-safe)
//! - No other signals are handled specially

use crate::lifecycle::Lifecycle;

/// Wait for SIGTERM or SIGINT and initiate draining.
pub async fn listen(lifecycle: Lifecycle) {
    let signal = wait_for_termination().await;
    tracing::info!(signal, "termination signal received; draining");
    lifecycle.begin_draining();
}

#[cfg(unix)]
async fn wait_for_termination() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
    }
}

#[cfg(not(unix))]
async fn wait_for_termination() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "ctrl-c"
}
