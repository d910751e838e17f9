//! HTTP server setup.
//!
//! # Responsibilities
//! - Create the Axum router with all routes
//! - Wire up middleware (hook chain, timeout, body limit, trace)
//! - Serve with graceful shutdown driven by the lifecycle manager
//! - Bound the drain phase with the configured grace period

use std::future::IntoFuture;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServiceConfig;
use crate::http::handlers;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::observability::LogSinkHandle;
use crate::telemetry::Agent;

/// Application state injected into handlers and the hook chain.
#[derive(Clone)]
pub struct AppState {
    pub agent: Agent,
    pub log: LogSinkHandle,
    pub body_limit: usize,
}

/// Error type for the serve loop.
#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("drain grace period elapsed with requests still in flight")]
    DrainTimeout,
}

/// HTTP server for the service.
pub struct HttpServer {
    router: Router,
    config: ServiceConfig,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: ServiceConfig, agent: Agent, log: LogSinkHandle) -> Self {
        let state = AppState {
            agent,
            log,
            body_limit: config.limits.max_body_bytes,
        };
        let router = Self::build_router(&config, state);
        Self { router, config }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(config: &ServiceConfig, state: AppState) -> Router {
        Router::new()
            .route("/", get(handlers::root))
            .route("/echo", post(handlers::echo))
            .route("/submit-data", post(handlers::submit_data))
            .route("/test-post", post(handlers::test_post))
            .route("/test-error", get(handlers::test_error))
            .route("/health", get(handlers::health))
            .layer(middleware::from_fn_with_state(
                state.clone(),
                crate::hooks::hook_chain,
            ))
            .layer(TimeoutLayer::new(Duration::from_secs(
                config.limits.request_timeout_secs,
            )))
            .layer(DefaultBodyLimit::max(config.limits.max_body_bytes))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// The assembled router, for in-process tests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Run the server until the lifecycle drains it.
    ///
    /// Stops accepting on the Draining transition; in-flight requests get
    /// the configured grace period, after which the remainder is aborted
    /// and `DrainTimeout` is returned.
    pub async fn run(self, listener: TcpListener, lifecycle: Lifecycle) -> Result<(), ServeError> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");
        lifecycle.advance(LifecycleState::Listening);

        let grace = Duration::from_secs(self.config.shutdown.grace_period_secs);

        let drain_signal = {
            let lifecycle = lifecycle.clone();
            async move { lifecycle.draining().await }
        };
        let serve = axum::serve(listener, self.router)
            .with_graceful_shutdown(drain_signal)
            .into_future();

        let deadline = {
            let lifecycle = lifecycle.clone();
            async move {
                lifecycle.draining().await;
                tokio::time::sleep(grace).await;
            }
        };

        tokio::select! {
            result = serve => {
                result?;
                tracing::info!("HTTP server stopped");
                Ok(())
            }
            _ = deadline => {
                tracing::warn!(
                    grace_secs = grace.as_secs(),
                    "drain grace period elapsed; aborting remaining requests"
                );
                Err(ServeError::DrainTimeout)
            }
        }
    }
}
