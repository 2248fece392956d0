//! DeliveryHandler port - what a worker does with a job.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::notification::JobRecord;

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Sent; the job completes.
    Delivered,
    /// Transient failure; the job is retried with backoff until the cap.
    Retry(String),
    /// The channel is paused and nothing was attempted. The job runs again
    /// after `retry_after` without spending an attempt.
    Defer { reason: String, retry_after: Duration },
    /// The job can never succeed; it goes straight to the dead state.
    Reject(String),
}

/// Handles a single attempt of a delivery job.
///
/// Called with the record as it stands before the attempt;
/// `attempts_made` counts previous attempts only.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, record: &JobRecord) -> DeliveryOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn DeliveryHandler) {}
}
