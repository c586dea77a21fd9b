//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, status codes valid)
//! - Check addresses and header names parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use axum::http::HeaderName;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::GatewayConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
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

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    let url = &config.store.redis_url;
    if !(url.starts_with("redis://") || url.starts_with("rediss://") || url.starts_with("redis+unix://")) {
        errors.push(ValidationError::new(
            "store.redis_url",
            "must use the redis://, rediss:// or redis+unix:// scheme",
        ));
    }
    if config.store.key_prefix.is_empty() {
        errors.push(ValidationError::new("store.key_prefix", "must not be empty"));
    }
    if config.store.connect_timeout_ms == 0 {
        errors.push(ValidationError::new("store.connect_timeout_ms", "must be greater than 0"));
    }
    if config.store.command_timeout_ms == 0 {
        errors.push(ValidationError::new("store.command_timeout_ms", "must be greater than 0"));
    }
    if config.store.scan_count == 0 {
        errors.push(ValidationError::new("store.scan_count", "must be greater than 0"));
    }

    if HeaderName::from_bytes(config.waf.profile_header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "waf.profile_header",
            format!("'{}' is not a valid header name", config.waf.profile_header),
        ));
    }
    if config.waf.default_profile.is_empty() {
        errors.push(ValidationError::new("waf.default_profile", "must not be empty"));
    }
    for header in &config.waf.client_ip_headers {
        if HeaderName::from_bytes(header.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "waf.client_ip_headers",
                format!("'{}' is not a valid header name", header),
            ));
        }
    }
    if !(100..=599).contains(&config.waf.empty_ruleset_status) {
        errors.push(ValidationError::new(
            "waf.empty_ruleset_status",
            "must be an HTTP status between 100 and 599",
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
