//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parseable)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before the config is accepted into the system

use std::net::SocketAddr;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {problem}")]
pub struct ValidationError {
    pub field: String,
    pub problem: String,
}

impl ValidationError {
    fn new(field: &str, problem: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            problem: problem.into(),
        }
    }
}

/// Validate a loaded configuration, collecting every problem.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("not a socket address: {}", config.listener.bind_address),
        ));
    }

    if config.agent.active && config.agent.server_url.is_empty() {
        errors.push(ValidationError::new(
            "agent.server_url",
            "must be set when the agent is active",
        ));
    }
    if config.agent.service_name.is_empty() {
        errors.push(ValidationError::new("agent.service_name", "must not be empty"));
    }
    if config.agent.flush_interval_secs == 0 {
        errors.push(ValidationError::new(
            "agent.flush_interval_secs",
            "must be greater than zero",
        ));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new(
            "limits.max_body_bytes",
            "must be greater than zero",
        ));
    }
    if config.limits.request_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "limits.request_timeout_secs",
            "must be greater than zero",
        ));
    }

    if config.shutdown.grace_period_secs == 0 {
        errors.push(ValidationError::new(
            "shutdown.grace_period_secs",
            "must be greater than zero",
        ));
    }

    if config.log.enabled && config.log.path.is_empty() {
        errors.push(ValidationError::new(
            "log.path",
            "must be set when the log sink is enabled",
        ));
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!(
                "not a socket address: {}",
                config.observability.metrics_address
            ),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "nowhere".to_string();
        config.agent.server_url = String::new();
        config.shutdown.grace_period_secs = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().any(|e| e.field == "listener.bind_address"));
        assert!(errors.iter().any(|e| e.field == "agent.server_url"));
        assert!(errors.iter().any(|e| e.field == "shutdown.grace_period_secs"));
    }

    #[test]
    fn inactive_agent_does_not_require_server_url() {
        let mut config = ServiceConfig::default();
        config.agent.active = false;
        config.agent.server_url = String::new();
        assert!(validate_config(&config).is_ok());
    }
}
