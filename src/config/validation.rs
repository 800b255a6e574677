//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (budgets > 0, ports valid)
//! - Check the remote host fits the disguised header budget
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: TunnelConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::TunnelConfig;
use crate::framing::{HeaderWriter, Preamble, HEADER_BUDGET};

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

/// Check every section and collect all problems.
pub fn validate_config(config: &TunnelConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be > 0"));
    }

    let remote = &config.remote;
    if remote.host.is_empty() {
        errors.push(ValidationError::new("remote.host", "must not be empty"));
    } else {
        let preamble = Preamble::Request {
            path: remote.request_path.clone(),
            host: remote.host.clone(),
            port: remote.port,
        };
        if let Err(e) = HeaderWriter::new(&preamble) {
            errors.push(ValidationError::new("remote.host", e.to_string()));
        }
    }
    if remote.port == 0 {
        errors.push(ValidationError::new("remote.port", "must be > 0"));
    }
    if remote.connect_timeout_secs == 0 {
        errors.push(ValidationError::new("remote.connect_timeout_secs", "must be > 0"));
    }
    if remote.connect_attempts == 0 {
        errors.push(ValidationError::new("remote.connect_attempts", "must be > 0"));
    }
    if remote.backoff_base_ms > remote.backoff_max_ms {
        errors.push(ValidationError::new(
            "remote.backoff_base_ms",
            "must not exceed remote.backoff_max_ms",
        ));
    }

    let io = &config.io;
    if io.buffer_size <= HEADER_BUDGET {
        errors.push(ValidationError::new(
            "io.buffer_size",
            format!("must be larger than the {} byte header budget", HEADER_BUDGET),
        ));
    }
    if io.wait_ms == 0 || io.send_wait_ms == 0 {
        errors.push(ValidationError::new("io.wait_ms", "waits must be > 0"));
    }
    if io.max_retries == 0 || io.send_max_retries == 0 {
        errors.push(ValidationError::new("io.max_retries", "retry budgets must be > 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "is not a socket address",
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
    fn defaults_are_valid() {
        assert_eq!(validate_config(&TunnelConfig::default()), Ok(()));
    }

    #[test]
    fn long_host_is_rejected() {
        let mut config = TunnelConfig::default();
        config.remote.host = "a".repeat(300);
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "remote.host");
    }

    #[test]
    fn small_buffer_is_rejected() {
        let mut config = TunnelConfig::default();
        config.io.buffer_size = 64;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors.iter().any(|e| e.field == "io.buffer_size"));
    }

    #[test]
    fn collects_every_error() {
        let mut config = TunnelConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.remote.port = 0;
        config.remote.backoff_base_ms = 5000;
        config.io.max_retries = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
    }
}
