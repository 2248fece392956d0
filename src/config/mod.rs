//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `NOTIFICATION_HUB` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use notification_hub::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Server running on {}:{}", config.server.host, config.server.port);
//! ```

mod delivery;
mod email;
mod error;
mod redis;
mod server;
mod websocket;

pub use delivery::DeliveryConfig;
pub use email::{EmailConfig, MAX_POOL_SIZE};
pub use error::{ConfigError, ValidationError};
pub use redis::RedisConfig;
pub use server::{Environment, ServerConfig};
pub use websocket::WebSocketConfig;

use serde::Deserialize;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, identity)
    #[serde(default)]
    pub server: ServerConfig,

    /// Redis configuration (pub/sub and job store)
    #[serde(default)]
    pub redis: RedisConfig,

    /// Outbound mail service
    #[serde(default)]
    pub email: EmailConfig,

    /// Delivery queue, workers and circuit breaker
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// WebSocket connections and inbound rate limits
    #[serde(default)]
    pub websocket: WebSocketConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `NOTIFICATION_HUB` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `NOTIFICATION_HUB__SERVER__PORT=8080` -> `server.port = 8080`
    /// - `NOTIFICATION_HUB__EMAIL__HOST=mail.example.com` -> `email.host = ...`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if values cannot be parsed into expected types.
    /// Missing credentials are reported by [`validate`](Self::validate).
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::with_prefix("NOTIFICATION_HUB")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// Runs before any service is built. A missing mail credential pair, an
    /// empty host, a zero port or an out-of-range pool size stops startup.
    /// The job timeout must leave room for a whole mail send, so the relay's
    /// own timeout fires before the worker abandons the attempt.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.redis.validate()?;
        self.email.validate()?;
        self.delivery.validate()?;
        self.websocket.validate()?;

        if self.delivery.job_timeout_secs <= self.email.timeout_secs {
            return Err(ValidationError::JobTimeoutTooShort {
                job_timeout_secs: self.delivery.job_timeout_secs,
                send_timeout_secs: self.email.timeout_secs,
            });
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
