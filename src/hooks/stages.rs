//! The four lifecycle stages.
//!
//! Each stage is a plain function over the request trace and the in-flight
//! request or response. The adapter in `hooks::hook_chain` composes them in
//! fixed order; nothing here registers callbacks or depends on registration
//! order.

use std::time::Instant;

use axum::body::{Body, Bytes};
use axum::extract::Request;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, USER_AGENT};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::http::error::FaultInfo;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::observability::LogRecord;
use crate::telemetry::correlation::{CorrelationContext, X_TRACE_ID};
use crate::telemetry::recorder::{Transaction, TransactionFinisher, TransactionResult, TransactionType};

/// Per-request trace state threaded through the stages.
///
/// Holds the only [`TransactionFinisher`], so exactly one of the terminal
/// stages can finalize the transaction.
pub(crate) struct RequestTrace {
    pub correlation: CorrelationContext,
    pub transaction: Transaction,
    pub finisher: TransactionFinisher,
    pub method: Method,
    pub path: String,
    pub started: Instant,
}

fn header_or(headers: &HeaderMap, name: axum::http::HeaderName, default: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(default)
        .to_string()
}

/// Stage 1: establish correlation, start the transaction, record arrival.
pub(crate) fn on_receive(state: &AppState, mut request: Request) -> (Request, RequestTrace) {
    let correlation = state.agent.begin_correlation(request.extensions_mut());
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let url = request.uri().to_string();

    let (transaction, finisher) = state.agent.start_transaction(
        format!("{} {}", method, path),
        TransactionType::Request,
        correlation.clone(),
    );

    transaction.set_label("http.method", method.as_str());
    transaction.set_label("http.url", url.clone());
    transaction.set_label(
        "user_agent",
        header_or(request.headers(), USER_AGENT, "unknown"),
    );
    transaction.set_label(
        "content_type",
        header_or(request.headers(), CONTENT_TYPE, "unknown"),
    );
    if method == Method::POST {
        transaction.set_label("has_body", true);
        transaction.set_label(
            "content_length",
            header_or(request.headers(), CONTENT_LENGTH, "0"),
        );
    }

    // Handlers reach the transaction through request extensions.
    request.extensions_mut().insert(transaction.clone());

    state.log.append(
        LogRecord::new("info", format!("request to {}", path), Some(&correlation))
            .field("method", json!(method.as_str()))
            .field("url", json!(url)),
    );

    (
        request,
        RequestTrace {
            correlation,
            transaction,
            finisher,
            method,
            path,
            started: Instant::now(),
        },
    )
}

/// Stage 2: inspect the request body shape and attach business context.
///
/// Only the shape (key names, size) becomes labels; the raw payload goes
/// into custom context, where the backend redacts it server-side. The body
/// is buffered within the configured limit and handed back untouched.
pub(crate) async fn pre_handle(
    state: &AppState,
    trace: &RequestTrace,
    request: Request,
) -> Request {
    if trace.method != Method::POST {
        return request;
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.body_limit).await {
        Ok(bytes) => bytes,
        Err(err) => {
            // Instrumentation must not break the request; hand an empty
            // body on, the handler will reject it on its own terms.
            tracing::debug!(error = %err, "request body inspection failed");
            Bytes::new()
        }
    };

    if !bytes.is_empty() {
        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(body_json) => {
                let keys: Vec<String> = body_json
                    .as_object()
                    .map(|o| o.keys().cloned().collect())
                    .unwrap_or_default();
                trace.transaction.set_label(
                    "body_info",
                    json!({
                        "has_body": true,
                        "body_keys": keys,
                        "body_size": bytes.len(),
                    })
                    .to_string(),
                );
                trace.transaction.set_custom_context(
                    "request",
                    json!({
                        "method": trace.method.as_str(),
                        "url": trace.path,
                        "has_body": true,
                        "body_keys": keys,
                        "body_size": bytes.len(),
                        "body": body_json,
                    }),
                );
            }
            Err(_) => {
                trace.transaction.set_label(
                    "body_info",
                    json!({"has_body": true, "body_size": bytes.len()}).to_string(),
                );
            }
        }
    }

    Request::from_parts(parts, Body::from(bytes))
}

/// Stage 3: the handler produced a response; classify and finalize.
///
/// The response body passes through untouched; only the trace id header is
/// added.
pub(crate) fn on_send(state: &AppState, trace: RequestTrace, mut response: Response) -> Response {
    let status = response.status();
    let transaction = &trace.transaction;

    transaction.set_label("http.status_code", status.as_u16());
    transaction.set_label("status_class", status_class(status));
    if status.as_u16() >= 400 {
        transaction.set_label("error", true);
    } else {
        transaction.set_label("success", true);
    }
    if let Some(size) = response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
    {
        transaction.set_label("response_size", size.to_string());
    }

    let duration_ms = trace.started.elapsed().as_millis() as u64;
    transaction.set_custom_context(
        "response",
        json!({
            "status_code": status.as_u16(),
            "duration_ms": duration_ms,
            "endpoint": trace.path,
            "method": trace.method.as_str(),
        }),
    );

    let result = if status.is_server_error() {
        TransactionResult::Error
    } else {
        TransactionResult::Success
    };
    trace.finisher.finish(result);

    metrics::record_request(trace.method.as_str(), status.as_u16(), trace.started);
    state.log.append(
        LogRecord::new(
            "info",
            format!(
                "{} {} - {} - {}ms",
                trace.method,
                trace.path,
                status.as_u16(),
                duration_ms
            ),
            Some(&trace.correlation),
        )
        .field("status", json!(status.as_u16())),
    );

    add_trace_header(&trace.correlation, &mut response);
    response
}

/// Stage 4: the handler raised; capture, finalize, and build the one
/// normalized error response.
///
/// The client gets the fault's declared status (default internal error), a
/// generic message, and the correlation id. Internal detail goes only to
/// the capture sink.
pub(crate) fn on_error(state: &AppState, trace: RequestTrace, fault: FaultInfo) -> Response {
    let status = fault.status;
    let transaction = &trace.transaction;

    transaction.set_label("http.status_code", status.as_u16());
    transaction.set_label("status_class", status_class(status));
    transaction.set_label("error", true);

    let mut context = fault.context.clone();
    context.insert("endpoint".to_string(), json!(trace.path));
    context.insert("method".to_string(), json!(trace.method.as_str()));
    state.agent.capture().capture_request(
        fault.message.clone(),
        fault.detail.clone(),
        &trace.correlation,
        context,
    );
    metrics::record_fault("handler");

    let duration_ms = trace.started.elapsed().as_millis() as u64;
    state.log.append(
        LogRecord::new("error", fault.message.clone(), Some(&trace.correlation))
            .field("status", json!(status.as_u16()))
            .field("url", json!(trace.path))
            .field("duration_ms", json!(duration_ms)),
    );

    trace.finisher.finish(TransactionResult::Error);
    metrics::record_request(trace.method.as_str(), status.as_u16(), trace.started);

    let body = json!({
        "error": status.canonical_reason().unwrap_or("Internal Server Error"),
        "message": fault.message,
        "traceId": trace.correlation.trace_id(),
    });
    let mut response = (status, axum::Json(body)).into_response();
    add_trace_header(&trace.correlation, &mut response);
    response
}

fn status_class(status: StatusCode) -> String {
    format!("HTTP {}xx", status.as_u16() / 100)
}

fn add_trace_header(correlation: &CorrelationContext, response: &mut Response) {
    if let Some(trace_id) = correlation.trace_id() {
        if let Ok(value) = HeaderValue::from_str(trace_id) {
            response.headers_mut().insert(X_TRACE_ID, value);
        }
    }
}
