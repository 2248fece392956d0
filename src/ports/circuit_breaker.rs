//! CircuitBreaker port - Interface for outbound transport resilience.
//!
//! The circuit breaker stops calling a failing mail transport for a cooldown
//! period after repeated failures, so a struggling downstream is not buried
//! under retries and the worker pool does not stall on slow sends.
//!
//! ## States
//!
//! - **Closed**: Normal operation, requests flow through
//! - **Open**: Too many failures, requests rejected immediately
//! - **Half-Open**: Cooldown elapsed, exactly one trial request allowed
//!
//! ## Transitions
//!
//! ```text
//! Closed --[failure_threshold consecutive failures]--> Open
//! Open --[recovery_timeout elapsed since last failure]--> Half-Open
//! Half-Open --[trial succeeds]--> Closed (failure count zeroed)
//! Half-Open --[trial fails]--> Open (cooldown restarts)
//! ```

use std::time::Duration;

/// Circuit breaker states for external service protection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation - requests flow through to the service.
    Closed,

    /// Too many failures - requests rejected immediately without calling service.
    /// The circuit will transition to HalfOpen after recovery_timeout.
    Open,

    /// Cooldown elapsed - the next request is let through as a trial.
    /// Success → Closed, Failure → Open.
    HalfOpen,
}

impl CircuitState {
    /// Check if the circuit allows requests through.
    pub fn allows_requests(&self) -> bool {
        matches!(self, CircuitState::Closed | CircuitState::HalfOpen)
    }
}

/// Configuration for circuit breaker behavior.
///
/// Fixed at construction; the breaker does not adapt these.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Number of consecutive failures before opening circuit.
    ///
    /// Default: 5 failures
    pub failure_threshold: u32,

    /// Time after the last failure before a trial is allowed.
    ///
    /// Default: 60 seconds
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new(failure_threshold: u32, recovery_timeout: Duration) -> Self {
        Self {
            failure_threshold: failure_threshold.max(1),
            recovery_timeout,
        }
    }
}

/// Port for circuit breaker functionality.
///
/// Implementations must make `should_allow` and the `record_*` calls atomic
/// with respect to each other: concurrent callers may never both claim the
/// half-open trial, and every failure must be counted.
///
/// # Example
///
/// ```ignore
/// if !breaker.should_allow() {
///     let retry_after = breaker.retry_after().unwrap_or_default();
///     return Err(SendError::TemporarilyUnavailable { retry_after });
/// }
/// match transport.send(&email).await {
///     Ok(receipt) => { breaker.record_success(); Ok(receipt) }
///     Err(e) => { breaker.record_failure(); Err(e.into()) }
/// }
/// ```
pub trait CircuitBreaker: Send + Sync {
    /// Get the current state of the circuit.
    fn state(&self) -> CircuitState;

    /// Check if a request should be allowed through.
    ///
    /// Returns `true` if the circuit is closed, or if the cooldown has
    /// elapsed and this caller claimed the single half-open trial.
    /// Returns `false` if the circuit is open.
    fn should_allow(&self) -> bool;

    /// Record a successful request.
    ///
    /// Zeroes the consecutive failure count and closes the circuit.
    fn record_success(&self);

    /// Record a failed request.
    ///
    /// In closed state, this counts toward the failure threshold.
    /// In half-open state, this immediately reopens the circuit.
    fn record_failure(&self);

    /// Force reset the circuit to closed state.
    ///
    /// Use sparingly - typically for administrative intervention.
    fn reset(&self);

    /// Time until the breaker lets another attempt through.
    ///
    /// `None` while closed. While open this is the rest of the cooldown;
    /// while half-open, the time until the outstanding trial expires.
    fn retry_after(&self) -> Option<Duration>;

    /// Get metrics about the circuit breaker.
    fn metrics(&self) -> CircuitBreakerMetrics;
}

/// Metrics about circuit breaker behavior.
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerMetrics {
    /// Current state
    pub state: Option<CircuitState>,

    /// Total successful requests since creation
    pub total_successes: u64,

    /// Total failed requests since creation
    pub total_failures: u64,

    /// Requests refused while open
    pub total_rejected: u64,

    /// Times the circuit has opened
    pub times_opened: u64,

    /// Current consecutive failure count
    pub current_failures: u32,

    /// Time until circuit transitions to half-open (when open)
    pub time_until_half_open: Option<Duration>,
}
