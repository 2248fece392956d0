//! Rate limiting port for inbound client traffic.
//!
//! Bounds how many control frames (subscribe, unsubscribe, ping) a client
//! may send over its live connections per window.

use async_trait::async_trait;

use crate::domain::foundation::{Timestamp, UserId};

/// Port for rate limiting operations.
///
/// Implementations should be thread-safe and support concurrent access.
/// The rate limiter uses a fixed-window counter algorithm for simplicity.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Check if request is allowed, consuming a slot if so.
    ///
    /// Returns `Allowed` with remaining quota or `Denied` with retry info.
    async fn check(&self, key: RateLimitKey) -> Result<RateLimitResult, RateLimitError>;
}

/// Key identifying what to rate limit.
///
/// Limits are per user, so every connection of the same user shares one
/// budget.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct RateLimitKey {
    pub user_id: String,
    /// Optional resource for finer-grained limits (e.g., "ws_control").
    pub resource: Option<String>,
}

impl RateLimitKey {
    pub fn user(user_id: &UserId) -> Self {
        Self {
            user_id: user_id.to_string(),
            resource: None,
        }
    }

    pub fn user_resource(user_id: &UserId, resource: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            resource: Some(resource.to_string()),
        }
    }

    /// Flat string form, used as the arena key.
    pub fn to_key_string(&self) -> String {
        match &self.resource {
            Some(resource) => format!("ratelimit:user:{}:{}", self.user_id, resource),
            None => format!("ratelimit:user:{}", self.user_id),
        }
    }
}

/// Result of a rate limit check.
#[derive(Debug, Clone)]
pub enum RateLimitResult {
    /// Request is allowed; includes current status.
    Allowed(RateLimitStatus),
    /// Request is denied; includes denial details.
    Denied(RateLimitDenied),
}

impl RateLimitResult {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitResult::Allowed(_))
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, RateLimitResult::Denied(_))
    }
}

/// Current rate limit status.
#[derive(Debug, Clone)]
pub struct RateLimitStatus {
    /// Maximum requests allowed in the window.
    pub limit: u32,
    /// Remaining requests in the current window.
    pub remaining: u32,
    /// When the current window resets.
    pub reset_at: Timestamp,
}

/// Details of a rate limit denial.
#[derive(Debug, Clone)]
pub struct RateLimitDenied {
    pub limit: u32,
    /// Seconds until the client should retry.
    pub retry_after_secs: u32,
    /// Human-readable message sent back to the client.
    pub message: String,
}

/// Errors that can occur during rate limiting operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// Rate limiter backend is unavailable.
    #[error("rate limiter unavailable: {0}")]
    Unavailable(String),
}
