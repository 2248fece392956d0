//! JobStore port - durable storage behind the delivery queue.
//!
//! The queue keeps its scheduling state in memory and writes every record
//! change through to a store, so a restarted process can pick up where the
//! previous one stopped.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::foundation::JobId;
use crate::domain::notification::JobRecord;

#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job store unavailable: {0}")]
    Unavailable(String),

    #[error("job record could not be encoded: {0}")]
    Serialization(String),
}

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert or overwrite a record.
    ///
    /// `retain_for` is set for terminal records; the store may drop the
    /// record once it elapses.
    async fn save(&self, record: &JobRecord, retain_for: Option<Duration>)
        -> Result<(), JobStoreError>;

    /// Every record still held by the store.
    async fn load_all(&self) -> Result<Vec<JobRecord>, JobStoreError>;

    async fn remove(&self, id: &JobId) -> Result<(), JobStoreError>;
}
