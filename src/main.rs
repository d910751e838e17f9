//! Binary entry point.
//!
//! Startup order: logging → config → lifecycle + agent → panic hook →
//! log sink + metrics → bind listener → signal task → serve. Shutdown:
//! drain (bounded), flush telemetry and logs (bounded), exit with a code
//! reflecting whether shutdown was clean.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use traced_api::config::{load_config, ServiceConfig};
use traced_api::http::{HttpServer, ServeError};
use traced_api::lifecycle::{signals, Lifecycle, LifecycleState};
use traced_api::observability::{logsink, metrics};
use traced_api::telemetry::capture::{install_panic_hook, FaultClass};
use traced_api::telemetry::Agent;

#[derive(Parser)]
#[command(name = "traced-api", version, about = "Instrumented HTTP API service")]
struct Args {
    /// Path to a TOML configuration file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "traced_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("traced-api v{} starting", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();
    let config = match args.config {
        Some(path) => match load_config(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!(path = %path.display(), error = %err, "failed to load configuration");
                return ExitCode::FAILURE;
            }
        },
        None => ServiceConfig::default(),
    };

    tracing::info!(
        bind_address = %config.listener.bind_address,
        agent_active = config.agent.active,
        grace_period_secs = config.shutdown.grace_period_secs,
        "configuration loaded"
    );

    let lifecycle = Lifecycle::new();
    let agent = Agent::start(&config.agent);
    install_panic_hook(agent.capture().clone(), lifecycle.clone());

    let log = if config.log.enabled {
        logsink::spawn_log_sink(PathBuf::from(&config.log.path))
    } else {
        logsink::LogSinkHandle::disabled()
    };

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(err) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %err,
                "failed to parse metrics address"
            ),
        }
    }

    // Bind; any failure here is fatal.
    let listener = match TcpListener::bind(&config.listener.bind_address).await {
        Ok(listener) => listener,
        Err(err) => {
            let mut context = serde_json::Map::new();
            context.insert("phase".to_string(), serde_json::json!("startup"));
            context.insert("critical".to_string(), serde_json::json!(true));
            agent.capture().capture_process(
                FaultClass::Startup,
                format!(
                    "failed to bind {}: {}",
                    config.listener.bind_address, err
                ),
                context,
            );
            agent.flush(Duration::from_secs(1)).await;
            return ExitCode::FAILURE;
        }
    };

    tokio::spawn(signals::listen(lifecycle.clone()));

    let fatal_flush_delay = Duration::from_millis(config.shutdown.fatal_flush_delay_ms);
    let server = HttpServer::new(config, agent.clone(), log.clone());

    let exit = tokio::select! {
        result = server.run(listener, lifecycle.clone()) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(ServeError::DrainTimeout) => ExitCode::FAILURE,
            Err(ServeError::Io(err)) => {
                agent.capture().capture_process(
                    FaultClass::Shutdown,
                    format!("serve loop failed: {}", err),
                    serde_json::Map::new(),
                );
                ExitCode::FAILURE
            }
        },
        _ = lifecycle.fatal() => {
            // Process state is untrusted after an uncaught fault; give the
            // capture a moment to reach the emitter, then go down non-zero.
            tokio::time::sleep(fatal_flush_delay).await;
            ExitCode::FAILURE
        }
    };

    lifecycle.advance(LifecycleState::Stopped);
    agent.flush(Duration::from_secs(5)).await;
    log.flush(Duration::from_secs(1)).await;
    tracing::info!("shutdown complete");

    exit
}
