//! Business route handlers.
//!
//! Thin by design: each route exists to exercise the instrumentation layer.
//! Handlers reach the transaction and correlation identity through request
//! extensions and report faults as typed `ApiError`s.

use std::time::Duration;

use axum::extract::State;
use axum::Extension;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::telemetry::correlation::CorrelationContext;
use crate::telemetry::recorder::Transaction;

/// `GET /`: service banner.
pub async fn root(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationContext>,
) -> Json<Value> {
    Json(json!({
        "hello": "world",
        "timestamp": Utc::now().to_rfc3339(),
        "traceId": correlation.trace_id(),
        "service": state.agent.service_name(),
    }))
}

/// `POST /echo`: returns the received body.
pub async fn echo(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({ "received": body }))
}

/// `POST /submit-data`: accepts a payload and measures its processing with
/// a span.
pub async fn submit_data(
    Extension(transaction): Extension<Transaction>,
    Extension(correlation): Extension<CorrelationContext>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let mut span = transaction.start_span("process-submitted-data", "custom");
    span.set_label("operation", "data_processing");

    let user_id = body
        .get("userId")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();
    span.set_label("user.id", user_id.clone());

    let keys = body
        .as_object()
        .map(|o| o.keys().cloned().collect::<Vec<_>>().join(","))
        .filter(|joined| !joined.is_empty())
        .unwrap_or_else(|| "none".to_string());
    span.set_label("data.keys", keys);

    transaction.set_custom_context(
        "business",
        json!({
            "operation": "submit_data",
            "userId": user_id,
            "dataReceived": !body.is_null(),
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );

    // Simulated downstream work, measured by the span. The span guard also
    // covers the suspension point: a disconnect here still closes it.
    tokio::time::sleep(Duration::from_millis(50)).await;
    span.end();

    Ok(Json(json!({
        "status": "success",
        "message": "data submitted successfully",
        "data": body,
        "timestamp": Utc::now().to_rfc3339(),
        "traceId": correlation.trace_id(),
        "transactionId": correlation.transaction_id(),
    })))
}

/// `POST /test-post`: attaches a test custom-context block.
pub async fn test_post(
    Extension(transaction): Extension<Transaction>,
    Extension(correlation): Extension<CorrelationContext>,
    Json(body): Json<Value>,
) -> Json<Value> {
    transaction.set_custom_context(
        "test",
        json!({
            "endpoint": "test-post",
            "body": body,
            "timestamp": Utc::now().to_rfc3339(),
        }),
    );
    Json(json!({
        "message": "test POST successful",
        "received": body,
        "traceId": correlation.trace_id(),
    }))
}

/// `GET /test-error`: always raises, demonstrating the error path.
pub async fn test_error() -> Result<Json<Value>, ApiError> {
    Err(ApiError::internal(
        "test error for instrumentation demonstration",
    ))
}

/// `GET /health`: liveness plus agent status.
pub async fn health(
    State(state): State<AppState>,
    Extension(correlation): Extension<CorrelationContext>,
) -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
        "agent": {
            "active": state.agent.is_active(),
            "traceId": correlation.trace_id(),
        },
    }))
}
