//! Request lifecycle hook chain.
//!
//! # Data Flow
//! ```text
//! request
//!     → on_receive  (correlation + transaction start, arrival labels)
//!     → pre_handle  (body shape inspection, business context)
//!     → handler     (business logic; spans; may raise a typed fault)
//!     → on_send     (status labels, result bucket, finalize success)
//!       or
//!       on_error    (capture, finalize error, normalized error body)
//!     → response with x-trace-id header
//! ```
//!
//! # Design Decisions
//! - Stages run sequentially per request, never concurrently with each
//!   other; attachments from earlier stages are visible to later ones
//! - Exactly one of on_send/on_error runs, decided by whether the handler
//!   put a fault into the response extensions
//! - Hooks observe the outcome; they never change it
//! - A failure inside a stage must never fail the request it observes

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;

use crate::http::error::FaultInfo;
use crate::http::server::AppState;

pub(crate) mod stages;

/// The framework adapter composing the four stages around every request.
///
/// Layered once on the router; see `http::server`.
pub async fn hook_chain(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let (request, trace) = stages::on_receive(&state, request);
    let request = stages::pre_handle(&state, &trace, request).await;

    let mut response = next.run(request).await;

    match response.extensions_mut().remove::<FaultInfo>() {
        Some(fault) => stages::on_error(&state, trace, fault),
        None => stages::on_send(&state, trace, response),
    }
}
