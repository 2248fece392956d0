//! MessageBroker port - publish/subscribe transport between instances.
//!
//! The broker carries live events from the instance where they happened to
//! every other instance, so each can fan them out to its own connections.
//! Delivery is best-effort: nothing is buffered while the broker is down.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;

/// A message received from a subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerMessage {
    /// Concrete channel the message was published on.
    pub channel: String,
    /// Raw payload (a JSON envelope for this subsystem).
    pub payload: String,
}

/// Stream of messages from a pattern subscription.
///
/// The stream ending means the subscription was lost.
pub type BrokerStream = Pin<Box<dyn Stream<Item = BrokerMessage> + Send>>;

/// Errors from broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// The broker could not be reached or dropped the connection.
    #[error("broker unavailable: {0}")]
    Unavailable(String),

    /// The broker did not answer in time.
    #[error("broker operation timed out")]
    Timeout,

    /// The broker refused the command.
    #[error("broker command failed: {0}")]
    Command(String),
}

/// Port for a pub/sub message broker.
#[async_trait]
pub trait MessageBroker: Send + Sync {
    /// Publish a payload to a single channel.
    ///
    /// Returns once the broker accepted it; says nothing about receivers.
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError>;

    /// Subscribe to every channel matching any of the glob patterns.
    async fn subscribe(&self, patterns: &[String]) -> Result<BrokerStream, BrokerError>;
}

/// Glob match with `*` (any run) and `?` (any one character).
///
/// Same dialect as Redis `PSUBSCRIBE`, minus character classes.
pub fn pattern_matches(pattern: &str, channel: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let c: Vec<char> = channel.chars().collect();
    let (mut pi, mut ci) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut star_ci = 0usize;

    while ci < c.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == c[ci]) {
            pi += 1;
            ci += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some(pi);
            star_ci = ci;
            pi += 1;
        } else if let Some(s) = star {
            pi = s + 1;
            star_ci += 1;
            ci = star_ci;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}
