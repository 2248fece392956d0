//! Delivery queue and worker pool configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::delivery::{DeliveryQueueConfig, WorkerPoolConfig};
use crate::ports::CircuitBreakerConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Worker tasks pulling from the queue
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Token bucket: at most `rate_limit_max` sends per window
    #[serde(default = "default_rate_limit_max")]
    pub rate_limit_max: u32,
    #[serde(default = "default_rate_limit_window_ms")]
    pub rate_limit_window_ms: u64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_job_timeout_secs")]
    pub job_timeout_secs: u64,

    #[serde(default = "default_completed_retention_secs")]
    pub completed_retention_secs: u64,
    #[serde(default = "default_failed_retention_secs")]
    pub failed_retention_secs: u64,

    /// Circuit breaker on the mail transport
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_recovery_secs")]
    pub recovery_secs: u64,
}

impl DeliveryConfig {
    pub fn queue_config(&self) -> DeliveryQueueConfig {
        DeliveryQueueConfig {
            queue_name: self.queue_name.clone(),
            ..DeliveryQueueConfig::default()
        }
        .with_max_attempts(self.max_attempts)
        .with_backoff_base(Duration::from_millis(self.backoff_base_ms))
        .with_retention(
            Duration::from_secs(self.completed_retention_secs),
            Duration::from_secs(self.failed_retention_secs),
        )
    }

    pub fn worker_config(&self) -> WorkerPoolConfig {
        WorkerPoolConfig::default()
            .with_concurrency(self.concurrency)
            .with_rate_limit(
                self.rate_limit_max,
                Duration::from_millis(self.rate_limit_window_ms),
            )
            .with_job_timeout(Duration::from_secs(self.job_timeout_secs))
    }

    pub fn breaker_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig::new(
            self.failure_threshold,
            Duration::from_secs(self.recovery_secs),
        )
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.queue_name.trim().is_empty() {
            return Err(ValidationError::MissingRequired("DELIVERY__QUEUE_NAME"));
        }
        let positive = [
            ("concurrency", self.concurrency as u64),
            ("rate_limit_max", u64::from(self.rate_limit_max)),
            ("rate_limit_window_ms", self.rate_limit_window_ms),
            ("max_attempts", u64::from(self.max_attempts)),
            ("job_timeout_secs", self.job_timeout_secs),
            ("failure_threshold", u64::from(self.failure_threshold)),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ValidationError::MustBePositive { field });
            }
        }
        Ok(())
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_name: default_queue_name(),
            concurrency: default_concurrency(),
            rate_limit_max: default_rate_limit_max(),
            rate_limit_window_ms: default_rate_limit_window_ms(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            job_timeout_secs: default_job_timeout_secs(),
            completed_retention_secs: default_completed_retention_secs(),
            failed_retention_secs: default_failed_retention_secs(),
            failure_threshold: default_failure_threshold(),
            recovery_secs: default_recovery_secs(),
        }
    }
}

fn default_queue_name() -> String {
    "email-notifications".to_string()
}

fn default_concurrency() -> usize {
    5
}

fn default_rate_limit_max() -> u32 {
    100
}

fn default_rate_limit_window_ms() -> u64 {
    60_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_job_timeout_secs() -> u64 {
    30
}

fn default_completed_retention_secs() -> u64 {
    24 * 60 * 60
}

fn default_failed_retention_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_recovery_secs() -> u64 {
    60
}
