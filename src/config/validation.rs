//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (threads, backlog margin, multiplier, timeouts)
//! - Check that addresses parse before any socket is opened
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ReplayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use crate::config::schema::{ReplayConfig, Upstream, UpstreamAddressError};
use crate::replay::amplify::MAX_MULTIPLIER;

/// A single semantic violation in a loaded configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("upstream.threads must be at least 1")]
    NoWorkers,
    #[error("backlog.capacity must be at least 1")]
    EmptyBacklog,
    #[error(
        "backlog.breathing_space ({breathing_space}) must be below backlog.capacity ({capacity})"
    )]
    BreathingSpace {
        capacity: usize,
        breathing_space: usize,
    },
    #[error("traffic.multiplier must be between 0 and 1000, got {0}")]
    Multiplier(f64),
    #[error("upstream.address: {0}")]
    Upstream(#[from] UpstreamAddressError),
    #[error("observability.statsd `{0}` is not a host:port address")]
    Statsd(String),
    #[error("transport.unix_socket must not be empty")]
    SocketPath,
    #[error("timeouts.{0} must be greater than zero")]
    ZeroTimeout(&'static str),
}

/// Check every semantic constraint, collecting all violations.
pub fn validate_config(config: &ReplayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.transport.unix_socket.trim().is_empty() {
        errors.push(ValidationError::SocketPath);
    }

    if config.upstream.threads == 0 {
        errors.push(ValidationError::NoWorkers);
    }

    if let Err(e) = Upstream::parse(&config.upstream.address) {
        errors.push(e.into());
    }

    if config.backlog.capacity == 0 {
        errors.push(ValidationError::EmptyBacklog);
    } else if config.backlog.breathing_space >= config.backlog.capacity {
        errors.push(ValidationError::BreathingSpace {
            capacity: config.backlog.capacity,
            breathing_space: config.backlog.breathing_space,
        });
    }

    let multiplier = config.traffic.multiplier;
    if !(0.0..=MAX_MULTIPLIER).contains(&multiplier) {
        errors.push(ValidationError::Multiplier(multiplier));
    }

    if let Some(statsd) = &config.observability.statsd {
        let well_formed = statsd
            .rsplit_once(':')
            .is_some_and(|(host, port)| !host.is_empty() && port.parse::<u16>().is_ok());
        if !well_formed {
            errors.push(ValidationError::Statsd(statsd.clone()));
        }
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
