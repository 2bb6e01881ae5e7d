//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Map the configured `loglevel` onto a tracing filter
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - `RUST_LOG` wins over the configured level when set

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Error returned when the logging subsystem cannot be installed.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log level `{0}`")]
    Level(String),
    #[error("global subscriber already installed: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
}

/// Translate a configured level (`DEBUG`, `warning`, ...) into a filter directive.
pub fn level_directive(level: &str) -> Result<String, LoggingError> {
    let normalized = match level.trim().to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        other => other.to_string(),
    };
    match normalized.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" | "off" => {
            Ok(format!("shadow_replay={normalized},warn"))
        }
        _ => Err(LoggingError::Level(level.to_string())),
    }
}

/// Install the global tracing subscriber.
pub fn init_logging(level: &str) -> Result<(), LoggingError> {
    let directive = level_directive(level)?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()?;
    Ok(())
}
