//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Telemetry agent settings.
    pub agent: AgentConfig,

    /// Request limits.
    pub limits: LimitsConfig,

    /// Shutdown behavior.
    pub shutdown: ShutdownConfig,

    /// Durable log sink settings.
    pub log: LogConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:3000").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
        }
    }
}

/// Telemetry agent configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Whether the agent records and emits anything at all.
    ///
    /// With `active = false` requests carry no correlation ids; every
    /// consumer tolerates that state.
    pub active: bool,

    /// Service name reported on every record.
    pub service_name: String,

    /// Deployment environment label.
    pub environment: String,

    /// Telemetry backend base URL.
    pub server_url: String,

    /// Seconds between batched deliveries to the backend.
    pub flush_interval_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            active: true,
            service_name: "traced-api".to_string(),
            environment: "development".to_string(),
            server_url: "http://apm-server:8200".to_string(),
            flush_interval_secs: 10,
        }
    }
}

/// Request limit configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout (total time for request/response) in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 1_048_576,
            request_timeout_secs: 30,
        }
    }
}

/// Shutdown configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Seconds in-flight requests get to finish once draining starts.
    pub grace_period_secs: u64,

    /// Milliseconds to wait for capture flush before a fatal-fault exit.
    pub fatal_flush_delay_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 30,
            fatal_flush_delay_ms: 1000,
        }
    }
}

/// Durable log sink configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// Enable the append-only JSON log file.
    pub enabled: bool,

    /// Path of the log file.
    pub path: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "logs/app.log".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
