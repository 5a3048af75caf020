//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate bind addresses and log level
//! - Detect duplicate subset definitions
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Instance addresses are not validated here: a bad address only drops that
//!   instance at resolution time

use std::collections::HashSet;
use std::net::SocketAddr;
use thiserror::Error;

use crate::config::schema::ServerConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field}: invalid bind address '{value}'")]
    BindAddress { field: &'static str, value: String },

    #[error("unknown log level '{0}'")]
    LogLevel(String),

    #[error("listener.outbound_buffer must be greater than zero")]
    OutboundBuffer,

    #[error("service #{0} has an empty hostname")]
    EmptyHostname(usize),

    #[error("service '{hostname}' has an instance with port 0")]
    ZeroPort { hostname: String },

    #[error("subset '{name}' of '{hostname}' is defined more than once")]
    DuplicateSubset { hostname: String, name: String },
}

/// Check a parsed configuration, collecting every problem.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let binds = [
        ("listener.bind_address", &config.listener.bind_address),
        ("admin.bind_address", &config.admin.bind_address),
        ("observability.metrics_address", &config.observability.metrics_address),
    ];
    for (field, value) in binds {
        if value.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::BindAddress {
                field,
                value: value.clone(),
            });
        }
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.as_str()) {
        errors.push(ValidationError::LogLevel(config.observability.log_level.clone()));
    }

    if config.listener.outbound_buffer == 0 {
        errors.push(ValidationError::OutboundBuffer);
    }

    for (i, svc) in config.services.iter().enumerate() {
        if svc.hostname.is_empty() {
            errors.push(ValidationError::EmptyHostname(i));
        }
        if svc.instances.iter().any(|inst| inst.port == 0) {
            errors.push(ValidationError::ZeroPort {
                hostname: svc.hostname.clone(),
            });
        }
    }

    let mut seen = HashSet::new();
    for subset in &config.subsets {
        if !seen.insert((subset.hostname.as_str(), subset.name.as_str())) {
            errors.push(ValidationError::DuplicateSubset {
                hostname: subset.hostname.clone(),
                name: subset.name.clone(),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
