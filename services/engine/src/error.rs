//! services/engine/src/error.rs
//!
//! Defines the primary error type for the entire engine.

use crate::config::ConfigError;
use parent_coach_core::ports::PortError;

/// The primary error type for the `engine` library.
///
/// Note that the common resolver/aggregator paths deliberately do NOT return
/// this: component-internal failures are logged and degraded into safe
/// defaults. This type covers setup and the conditions explicitly surfaced
/// to the embedding shell.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents a (de)serialization failure for a persisted value.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Represents a standard Input/Output error (e.g., the file-backed store).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}
