//! services/engine/src/config.rs
//!
//! Defines the engine's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::time::Duration;

use chrono_tz::Tz;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
///
/// `reference_tz` is the single authoritative timezone for every "today"
/// computation. Device-local time is never consulted: a travelling user
/// crossing midnight must not flip historical streak days.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub reference_tz: Tz,
    pub report_poll_interval: Duration,
    pub report_poll_max_attempts: u32,
    pub log_level: Level,
    pub store_path: PathBuf,
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let tz_str = std::env::var("REFERENCE_TIMEZONE")
            .unwrap_or_else(|_| "America/New_York".to_string());
        let reference_tz = tz_str.parse::<Tz>().map_err(|_| {
            ConfigError::InvalidValue(
                "REFERENCE_TIMEZONE".to_string(),
                format!("'{}' is not a recognized IANA timezone", tz_str),
            )
        })?;

        let poll_secs_str =
            std::env::var("REPORT_POLL_INTERVAL_SECS").unwrap_or_else(|_| "3".to_string());
        let poll_secs = poll_secs_str.parse::<u64>().map_err(|e| {
            ConfigError::InvalidValue("REPORT_POLL_INTERVAL_SECS".to_string(), e.to_string())
        })?;

        let max_attempts_str =
            std::env::var("REPORT_POLL_MAX_ATTEMPTS").unwrap_or_else(|_| "20".to_string());
        let report_poll_max_attempts = max_attempts_str.parse::<u32>().map_err(|e| {
            ConfigError::InvalidValue("REPORT_POLL_MAX_ATTEMPTS".to_string(), e.to_string())
        })?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let store_path = std::env::var("STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./parent_coach_store.json"));

        Ok(Self {
            reference_tz,
            report_poll_interval: Duration::from_secs(poll_secs),
            report_poll_max_attempts,
            log_level,
            store_path,
        })
    }
}
