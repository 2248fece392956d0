//! In-memory rate limiter for inbound WebSocket control frames.
//!
//! Uses a fixed-window counter algorithm over a HashMap arena keyed by
//! client identity. Expired windows are dropped by a dedicated sweeper task
//! with its own shutdown signal.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

use crate::domain::foundation::Timestamp;
use crate::ports::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter,
};

/// In-memory fixed-window rate limiter.
///
/// Every key gets the same `limit` per `window`.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    limit: u32,
    window: Duration,
    /// Per-key window state.
    windows: RwLock<HashMap<String, WindowState>>,
}

/// State for a single rate limit window.
#[derive(Debug, Clone)]
struct WindowState {
    /// Number of requests in the current window.
    count: u32,
    /// When the current window started.
    window_start: Instant,
}

impl WindowState {
    fn expires_at(&self, window: Duration) -> Instant {
        self.window_start + window
    }
}

impl InMemoryRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit: limit.max(1),
            window,
            windows: RwLock::new(HashMap::new()),
        }
    }

    fn reset_at(&self, state: &WindowState, now: Instant) -> Timestamp {
        let remaining = state.expires_at(self.window).saturating_duration_since(now);
        Timestamp::now().plus(remaining)
    }

    /// Drop every window that has expired. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut windows = self.windows.write().await;
        let before = windows.len();
        windows.retain(|_, state| state.expires_at(self.window) > now);
        before - windows.len()
    }

    /// Number of keys currently tracked.
    pub async fn tracked_keys(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Start the sweeper task. It stops when `shutdown` turns true or its sender drops.
    pub fn spawn_sweeper(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        let removed = self.sweep_expired().await;
                        if removed > 0 {
                            tracing::debug!(removed, "Swept expired rate limit windows");
                        }
                    }
                }
            }
            tracing::debug!("Rate limit sweeper stopped");
        })
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: RateLimitKey) -> Result<RateLimitResult, RateLimitError> {
        let arena_key = key.to_key_string();
        let now = Instant::now();

        let mut windows = self.windows.write().await;

        // Get or create window state
        let state = windows.entry(arena_key).or_insert_with(|| WindowState {
            count: 0,
            window_start: now,
        });

        // Check if window has expired
        if now >= state.expires_at(self.window) {
            state.count = 0;
            state.window_start = now;
        }

        if state.count >= self.limit {
            let retry_after = state
                .expires_at(self.window)
                .saturating_duration_since(now)
                .as_secs() as u32;

            return Ok(RateLimitResult::Denied(RateLimitDenied {
                limit: self.limit,
                retry_after_secs: retry_after.max(1),
                message: format!(
                    "Rate limit exceeded. Retry after {} seconds.",
                    retry_after.max(1)
                ),
            }));
        }

        state.count += 1;
        let remaining = self.limit.saturating_sub(state.count);
        let reset_at = self.reset_at(state, now);

        Ok(RateLimitResult::Allowed(RateLimitStatus {
            limit: self.limit,
            remaining,
            reset_at,
        }))
    }
}
