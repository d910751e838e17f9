//! Typed handler faults.
//!
//! Handlers report faults through `Result<_, ApiError>` instead of panicking;
//! the on-error hook stage interprets the fault, captures it with full
//! internal detail, and builds the single normalized client response. The
//! client never sees stack traces or internal error fields.

use axum::body::Body;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// A fault raised by a request handler.
///
/// `message` is safe to show to clients. `detail` is internal-only and goes
/// to the error capture sink.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    status: StatusCode,
    message: String,
    detail: Option<String>,
    context: serde_json::Map<String, serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
            context: serde_json::Map::new(),
        }
    }

    /// Fault with the default internal-error code.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// Attach internal-only detail (never sent to the client).
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Attach structured context forwarded to the error capture sink.
    pub fn with_context(mut self, key: &str, value: serde_json::Value) -> Self {
        self.context.insert(key.to_string(), value);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

/// Fault details handed from the handler to the on-error stage through
/// response extensions.
#[derive(Debug, Clone)]
pub struct FaultInfo {
    pub status: StatusCode,
    pub message: String,
    pub detail: Option<String>,
    pub context: serde_json::Map<String, serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // Placeholder response: the on-error stage replaces the body with
        // the normalized error contract. Only the fault rides along here.
        let fault = FaultInfo {
            status: self.status,
            message: self.message,
            detail: self.detail,
            context: self.context,
        };
        let mut response = Response::new(Body::empty());
        *response.status_mut() = fault.status;
        response.extensions_mut().insert(fault);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_response_carries_fault_in_extensions() {
        let error = ApiError::internal("test fault")
            .with_detail("caused by: nothing")
            .with_context("endpoint", serde_json::json!("/test-error"));
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let fault = response.extensions().get::<FaultInfo>().unwrap();
        assert_eq!(fault.message, "test fault");
        assert_eq!(fault.context["endpoint"], "/test-error");
    }

    #[test]
    fn declared_status_is_kept() {
        let error = ApiError::new(StatusCode::BAD_GATEWAY, "upstream broke");
        assert_eq!(error.status(), StatusCode::BAD_GATEWAY);
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
