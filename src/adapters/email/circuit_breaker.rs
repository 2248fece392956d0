//! In-process circuit breaker guarding the mail transport.
//!
//! All state sits behind one mutex so the check-then-act sequence
//! (`should_allow` followed by `record_*`) cannot interleave badly: every
//! failure is counted and only one caller wins the half-open trial.
//!
//! A trial whose outcome never arrives (its caller was cancelled) expires
//! after `recovery_timeout`, and the next caller claims a fresh trial.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::ports::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
    trial_claimed_at: Option<Instant>,
    total_successes: u64,
    total_failures: u64,
    total_rejected: u64,
    times_opened: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            last_failure_at: None,
            trial_claimed_at: None,
            total_successes: 0,
            total_failures: 0,
            total_rejected: 0,
            times_opened: 0,
        }
    }
}

/// Consecutive-failure circuit breaker.
#[derive(Debug)]
pub struct InMemoryCircuitBreaker {
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
}

impl InMemoryCircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(BreakerState::new()),
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cooldown_elapsed(&self, state: &BreakerState, now: Instant) -> bool {
        state
            .last_failure_at
            .map(|at| now >= at + self.config.recovery_timeout)
            .unwrap_or(true)
    }

    fn trial_expired(&self, state: &BreakerState, now: Instant) -> bool {
        state
            .trial_claimed_at
            .map(|at| now >= at + self.config.recovery_timeout)
            .unwrap_or(true)
    }

    /// Time left before another attempt is let through.
    ///
    /// Open: until the cooldown ends. Half-open: until the outstanding trial
    /// expires. Closed: `None`.
    pub fn retry_after_at(&self, now: Instant) -> Option<Duration> {
        let state = self.lock();
        let since = match state.state {
            CircuitState::Closed => return None,
            CircuitState::Open => state.last_failure_at?,
            CircuitState::HalfOpen => state.trial_claimed_at?,
        };
        Some((since + self.config.recovery_timeout).saturating_duration_since(now))
    }

    pub fn state_at(&self, now: Instant) -> CircuitState {
        let state = self.lock();
        if state.state == CircuitState::Open && self.cooldown_elapsed(&state, now) {
            CircuitState::HalfOpen
        } else {
            state.state
        }
    }

    pub fn should_allow_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        let current = state.state;
        match current {
            CircuitState::Closed => true,
            CircuitState::Open if self.cooldown_elapsed(&state, now) => {
                // This caller takes the trial; others wait for its outcome.
                state.state = CircuitState::HalfOpen;
                state.trial_claimed_at = Some(now);
                tracing::info!("Mail circuit half-open, allowing trial");
                true
            }
            CircuitState::HalfOpen if self.trial_expired(&state, now) => {
                state.trial_claimed_at = Some(now);
                tracing::warn!("Mail circuit trial never reported back, allowing a new trial");
                true
            }
            CircuitState::Open | CircuitState::HalfOpen => {
                state.total_rejected += 1;
                false
            }
        }
    }

    pub fn record_failure_at(&self, now: Instant) {
        let mut state = self.lock();
        state.total_failures += 1;
        state.consecutive_failures += 1;
        state.last_failure_at = Some(now);
        state.trial_claimed_at = None;

        let current = state.state;
        match current {
            CircuitState::HalfOpen => {
                state.state = CircuitState::Open;
                state.times_opened += 1;
                tracing::warn!("Mail circuit trial failed, reopening");
            }
            CircuitState::Closed if state.consecutive_failures >= self.config.failure_threshold => {
                state.state = CircuitState::Open;
                state.times_opened += 1;
                tracing::warn!(
                    failures = state.consecutive_failures,
                    recovery_secs = self.config.recovery_timeout.as_secs(),
                    "Mail circuit opened"
                );
            }
            _ => {}
        }
    }

    fn metrics_at(&self, now: Instant) -> CircuitBreakerMetrics {
        let state = self.lock();
        let time_until_half_open = match (state.state, state.last_failure_at) {
            (CircuitState::Open, Some(at)) => {
                Some((at + self.config.recovery_timeout).saturating_duration_since(now))
            }
            _ => None,
        };
        CircuitBreakerMetrics {
            state: Some(state.state),
            total_successes: state.total_successes,
            total_failures: state.total_failures,
            total_rejected: state.total_rejected,
            times_opened: state.times_opened,
            current_failures: state.consecutive_failures,
            time_until_half_open,
        }
    }
}

impl Default for InMemoryCircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

impl CircuitBreaker for InMemoryCircuitBreaker {
    fn state(&self) -> CircuitState {
        self.state_at(Instant::now())
    }

    fn should_allow(&self) -> bool {
        self.should_allow_at(Instant::now())
    }

    fn record_success(&self) {
        let mut state = self.lock();
        state.total_successes += 1;
        state.consecutive_failures = 0;
        state.trial_claimed_at = None;
        if state.state != CircuitState::Closed {
            tracing::info!("Mail circuit closed");
        }
        state.state = CircuitState::Closed;
    }

    fn record_failure(&self) {
        self.record_failure_at(Instant::now());
    }

    fn reset(&self) {
        let mut state = self.lock();
        state.state = CircuitState::Closed;
        state.consecutive_failures = 0;
        state.last_failure_at = None;
        state.trial_claimed_at = None;
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after_at(Instant::now())
    }

    fn metrics(&self) -> CircuitBreakerMetrics {
        self.metrics_at(Instant::now())
    }
}
