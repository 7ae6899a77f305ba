//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, thresholds > 0)
//! - Validate addresses parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: PollerConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::PollerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &PollerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.poller.interval_ms == 0 {
        errors.push(ValidationError::new("poller.interval_ms", "must be greater than 0"));
    }
    if config.poller.max_concurrent_probes == 0 {
        errors.push(ValidationError::new("poller.max_concurrent_probes", "must be greater than 0"));
    }
    if config.breaker.failure_threshold == 0 {
        errors.push(ValidationError::new("breaker.failure_threshold", "must be greater than 0"));
    }
    if config.probe.timeout_ms == 0 {
        errors.push(ValidationError::new("probe.timeout_ms", "must be greater than 0"));
    }
    if config.fanout.queue_capacity == 0 {
        errors.push(ValidationError::new("fanout.queue_capacity", "must be greater than 0"));
    }
    if config.storage.path.as_deref().is_some_and(str::is_empty) {
        errors.push(ValidationError::new("storage.path", "must not be empty when set"));
    }
    if config.storage.flush_interval_ms == 0 {
        errors.push(ValidationError::new("storage.flush_interval_ms", "must be greater than 0"));
    }
    if config.api.enabled && config.api.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "api.bind_address",
            format!("invalid socket address '{}'", config.api.bind_address),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("invalid socket address '{}'", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
