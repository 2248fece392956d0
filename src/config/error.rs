//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number for {0}")]
    InvalidPort(&'static str),

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid timeout for {0}")]
    InvalidTimeout(&'static str),

    #[error("Invalid Redis URL format")]
    InvalidRedisUrl,

    #[error("Mail pool size must be between 1 and {max}, got {actual}")]
    InvalidPoolSize { max: usize, actual: usize },

    #[error("Invalid from email address")]
    InvalidFromEmail,

    #[error("{field} must be greater than zero")]
    MustBePositive { field: &'static str },

    #[error(
        "delivery job timeout ({job_timeout_secs}s) must exceed the mail send timeout ({send_timeout_secs}s)"
    )]
    JobTimeoutTooShort {
        job_timeout_secs: u64,
        send_timeout_secs: u64,
    },
}
