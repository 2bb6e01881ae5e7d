//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)            command-line flags
//!     → loader.rs (parse & deserialize)   │
//!     → overrides applied by the binary ◀─┘
//!     → validation.rs (semantic checks)
//!     → ReplayConfig (validated, immutable)
//!     → handed to lifecycle::startup, which splits it per subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; the replay pipeline never reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use schema::BacklogConfig;
pub use schema::ObservabilityConfig;
pub use schema::ReplayConfig;
pub use schema::TimeoutConfig;
pub use schema::Upstream;
pub use schema::UpstreamConfig;
pub use validation::{validate_config, ValidationError};
