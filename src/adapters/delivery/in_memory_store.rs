//! In-memory job store for tests and single-node development.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::foundation::JobId;
use crate::domain::notification::JobRecord;
use crate::ports::{JobStore, JobStoreError};

#[derive(Debug, Clone)]
struct StoredJob {
    record: JobRecord,
    retain_for: Option<Duration>,
}

/// Keeps job records in a map. Retention hints are recorded but not enforced;
/// the queue's own purge removes records.
#[derive(Debug)]
pub struct InMemoryJobStore {
    jobs: Mutex<HashMap<JobId, StoredJob>>,
    available: AtomicBool,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    /// Simulate an outage (false) or recovery (true).
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.lock().get(id).map(|stored| stored.record.clone())
    }

    /// Retention hint passed with the last save of `id`.
    pub fn retention_of(&self, id: &JobId) -> Option<Duration> {
        self.lock().get(id).and_then(|stored| stored.retain_for)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<JobId, StoredJob>> {
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ensure_available(&self) -> Result<(), JobStoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(JobStoreError::Unavailable("in-memory store offline".into()))
        }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn save(
        &self,
        record: &JobRecord,
        retain_for: Option<Duration>,
    ) -> Result<(), JobStoreError> {
        self.ensure_available()?;
        self.lock().insert(
            record.id.clone(),
            StoredJob {
                record: record.clone(),
                retain_for,
            },
        );
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        self.ensure_available()?;
        let mut records: Vec<JobRecord> =
            self.lock().values().map(|s| s.record.clone()).collect();
        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }

    async fn remove(&self, id: &JobId) -> Result<(), JobStoreError> {
        self.ensure_available()?;
        self.lock().remove(id);
        Ok(())
    }
}
