//! DeliveryQueue - priority-ordered, retrying, idempotent job queue.
//!
//! Scheduling state (ready heap, delayed heap, records) lives in memory behind
//! one async mutex; every record change is written through to a [`JobStore`]
//! so a restarted process can resume with [`DeliveryQueue::restore`].
//!
//! The mutex is never held across a store write. `enqueue` reserves the key
//! under the lock, saves without it, then publishes the record. A reservation
//! is released when its `enqueue` finishes or is dropped.
//!
//! ## Job lifecycle
//!
//! ```text
//! enqueue ──► Enqueued ──dequeue──► Active ──complete──► Completed
//!                ▲                    │
//!                │ backoff elapsed    ├──fail (attempts < max)──► Retrying
//!                └────────────────────┤
//!                                     ├──defer (attempt not spent)──► Retrying
//!                                     ├──fail (attempts = max)──► Dead
//!                                     └──reject─────────────────► Dead
//! ```

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{Arc, Mutex as SyncMutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use crate::domain::foundation::{JobId, Timestamp, ValidationError};
use crate::domain::notification::{DeliveryJob, JobRecord, JobStatus, Priority};
use crate::ports::{JobStore, JobStoreError};

/// Errors returned by queue operations.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("job rejected: {0}")]
    InvalidJob(#[from] ValidationError),

    #[error("job store error: {0}")]
    Store(#[from] JobStoreError),

    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("queue is closed")]
    Closed,
}

/// Configuration for [`DeliveryQueue`].
#[derive(Debug, Clone)]
pub struct DeliveryQueueConfig {
    pub queue_name: String,
    /// Attempts before a job is declared dead.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles per attempt.
    pub backoff_base: Duration,
    /// How long completed jobs stay queryable (and block duplicates).
    pub completed_retention: Duration,
    /// How long dead jobs stay queryable.
    pub failed_retention: Duration,
}

impl Default for DeliveryQueueConfig {
    fn default() -> Self {
        Self {
            queue_name: "email-notifications".to_string(),
            max_attempts: 3,
            backoff_base: Duration::from_secs(2),
            completed_retention: Duration::from_secs(24 * 60 * 60),
            failed_retention: Duration::from_secs(7 * 24 * 60 * 60),
        }
    }
}

impl DeliveryQueueConfig {
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    pub fn with_retention(mut self, completed: Duration, failed: Duration) -> Self {
        self.completed_retention = completed;
        self.failed_retention = failed;
        self
    }

    /// Delay before the attempt following `attempts_made` failures.
    pub fn backoff_for(&self, attempts_made: u32) -> Duration {
        let exponent = attempts_made.saturating_sub(1).min(31);
        self.backoff_base.saturating_mul(1u32 << exponent)
    }
}

/// Result of [`DeliveryQueue::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnqueueOutcome {
    pub job_id: JobId,
    /// True when an unfinished job with the same key already existed.
    pub duplicate: bool,
}

/// Job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub enqueued: usize,
    pub active: usize,
    pub retrying: usize,
    pub completed: usize,
    pub dead: usize,
}

#[derive(Debug, PartialEq, Eq)]
struct ReadyEntry {
    priority: Priority,
    sequence: u64,
    id: JobId,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority first, then lower sequence (FIFO).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Default)]
struct QueueState {
    records: HashMap<JobId, JobRecord>,
    ready: BinaryHeap<ReadyEntry>,
    delayed: BinaryHeap<Reverse<(Instant, u64, JobId)>>,
    next_sequence: u64,
    closed: bool,
}

impl QueueState {
    fn push_ready(&mut self, record: &JobRecord) {
        self.ready.push(ReadyEntry {
            priority: record.priority(),
            sequence: record.sequence,
            id: record.id.clone(),
        });
    }

    fn promote_due(&mut self, now: Instant) {
        while let Some(Reverse((due, _, _))) = self.delayed.peek() {
            if *due > now {
                break;
            }
            let Some(Reverse((_, _, id))) = self.delayed.pop() else {
                break;
            };
            if let Some(record) = self.records.get(&id) {
                if record.status == JobStatus::Retrying {
                    let entry = ReadyEntry {
                        priority: record.priority(),
                        sequence: record.sequence,
                        id,
                    };
                    self.ready.push(entry);
                }
            }
        }
    }

    fn pop_ready(&mut self) -> Option<JobId> {
        while let Some(entry) = self.ready.pop() {
            let runnable = self
                .records
                .get(&entry.id)
                .map(|r| matches!(r.status, JobStatus::Enqueued | JobStatus::Retrying))
                .unwrap_or(false);
            if runnable {
                return Some(entry.id);
            }
        }
        None
    }

    fn next_wakeup(&self) -> Option<Instant> {
        self.delayed.peek().map(|Reverse((due, _, _))| *due)
    }
}

/// Keys whose first save is in flight.
#[derive(Debug, Default)]
struct Reservations(SyncMutex<HashSet<JobId>>);

impl Reservations {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashSet<JobId>> {
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn contains(&self, id: &JobId) -> bool {
        self.lock().contains(id)
    }

    fn claim(&self, id: JobId) -> Reservation<'_> {
        self.lock().insert(id.clone());
        Reservation { owner: self, id }
    }
}

struct Reservation<'a> {
    owner: &'a Reservations,
    id: JobId,
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        self.owner.lock().remove(&self.id);
    }
}

/// Durable, priority-ordered delivery queue.
pub struct DeliveryQueue {
    config: DeliveryQueueConfig,
    store: Arc<dyn JobStore>,
    state: Mutex<QueueState>,
    reserved: Reservations,
    changed: Notify,
}

impl DeliveryQueue {
    pub fn new(config: DeliveryQueueConfig, store: Arc<dyn JobStore>) -> Self {
        Self {
            config,
            store,
            state: Mutex::new(QueueState::default()),
            reserved: Reservations::default(),
            changed: Notify::new(),
        }
    }

    pub fn config(&self) -> &DeliveryQueueConfig {
        &self.config
    }

    /// Add a job. A key that is already queued, running, retrying or dead is
    /// reported as a duplicate; a key whose job completed starts a new job.
    pub async fn enqueue(&self, job: DeliveryJob) -> Result<EnqueueOutcome, QueueError> {
        job.validate()?;
        let id = job.idempotency_key.clone();

        let (record, reservation) = {
            let mut state = self.state.lock().await;
            if state.closed {
                return Err(QueueError::Closed);
            }

            let unfinished = state
                .records
                .get(&id)
                .map(|existing| existing.status != JobStatus::Completed)
                .unwrap_or(false);
            if unfinished || self.reserved.contains(&id) {
                tracing::debug!(job_id = %id, "Duplicate delivery job ignored");
                return Ok(EnqueueOutcome {
                    job_id: id,
                    duplicate: true,
                });
            }

            let record = JobRecord::new(job, state.next_sequence);
            state.next_sequence += 1;
            (record, self.reserved.claim(id.clone()))
        };

        self.store.save(&record, None).await?;

        let mut state = self.state.lock().await;

        state.push_ready(&record);
        tracing::debug!(
            queue = %self.config.queue_name,
            job_id = %id,
            priority = %record.priority(),
            "Delivery job enqueued"
        );
        state.records.insert(id.clone(), record);
        drop(reservation);
        drop(state);

        self.changed.notify_waiters();
        Ok(EnqueueOutcome {
            job_id: id,
            duplicate: false,
        })
    }

    /// Wait for the next runnable job and mark it active.
    ///
    /// Returns `None` once the queue is closed.
    pub async fn dequeue(&self) -> Option<JobRecord> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);

            let wakeup = {
                let mut state = self.state.lock().await;
                if state.closed {
                    return None;
                }

                state.promote_due(Instant::now());
                if let Some(id) = state.pop_ready() {
                    let Some(record) = state.records.get_mut(&id) else {
                        continue;
                    };
                    record.status = JobStatus::Active;
                    let snapshot = record.clone();
                    drop(state);

                    self.persist(&snapshot, None).await;
                    return Some(snapshot);
                }

                // Register before releasing the lock so no wakeup is missed.
                notified.as_mut().enable();
                state.next_wakeup()
            };

            match wakeup {
                Some(due) => {
                    tokio::select! {
                        _ = &mut notified => {}
                        _ = tokio::time::sleep_until(due) => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Mark an active job as delivered.
    pub async fn complete(&self, id: &JobId) -> Result<(), QueueError> {
        let retention = self.config.completed_retention;
        let snapshot = {
            let mut state = self.state.lock().await;
            let record = state
                .records
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            record.attempts_made += 1;
            record.status = JobStatus::Completed;
            record.last_error = None;
            record.finished_at = Some(Timestamp::now());
            record.clone()
        };

        tracing::info!(job_id = %id, attempt = snapshot.attempts_made, "Delivery job completed");
        self.store.save(&snapshot, Some(retention)).await?;
        Ok(())
    }

    /// Record a failed attempt. Schedules a retry with backoff, or moves the
    /// job to `Dead` when the attempt cap is reached. Returns the new status.
    pub async fn fail(&self, id: &JobId, reason: &str) -> Result<JobStatus, QueueError> {
        let (snapshot, retention) = {
            let mut state = self.state.lock().await;
            let record = state
                .records
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            record.attempts_made += 1;
            record.last_error = Some(reason.to_string());

            if record.attempts_made >= self.config.max_attempts {
                record.status = JobStatus::Dead;
                record.finished_at = Some(Timestamp::now());
                (record.clone(), Some(self.config.failed_retention))
            } else {
                let delay = self.config.backoff_for(record.attempts_made);
                record.status = JobStatus::Retrying;
                record.available_at = Timestamp::now().plus(delay);
                let snapshot = record.clone();
                state
                    .delayed
                    .push(Reverse((Instant::now() + delay, snapshot.sequence, id.clone())));
                (snapshot, None)
            }
        };

        if snapshot.status == JobStatus::Dead {
            tracing::error!(
                job_id = %id,
                attempt = snapshot.attempts_made,
                error = %reason,
                "Delivery job exhausted its attempts"
            );
        } else {
            tracing::warn!(
                job_id = %id,
                attempt = snapshot.attempts_made,
                error = %reason,
                "Delivery attempt failed, retry scheduled"
            );
            self.changed.notify_waiters();
        }

        self.store.save(&snapshot, retention).await?;
        Ok(snapshot.status)
    }

    /// Put an active job back after `delay` without spending an attempt.
    ///
    /// Used when the channel itself is paused (circuit open) and the job
    /// never reached the provider.
    pub async fn defer(&self, id: &JobId, reason: &str, delay: Duration) -> Result<(), QueueError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let record = state
                .records
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            record.status = JobStatus::Retrying;
            record.last_error = Some(reason.to_string());
            record.available_at = Timestamp::now().plus(delay);
            let snapshot = record.clone();
            state
                .delayed
                .push(Reverse((Instant::now() + delay, snapshot.sequence, id.clone())));
            snapshot
        };

        tracing::debug!(
            job_id = %id,
            attempt = snapshot.attempts_made,
            delay_ms = delay.as_millis() as u64,
            "Delivery job deferred"
        );
        self.changed.notify_waiters();
        self.store.save(&snapshot, None).await?;
        Ok(())
    }

    /// Move a job straight to `Dead` without further attempts.
    pub async fn reject(&self, id: &JobId, reason: &str) -> Result<(), QueueError> {
        let snapshot = {
            let mut state = self.state.lock().await;
            let record = state
                .records
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.clone()))?;
            record.attempts_made += 1;
            record.status = JobStatus::Dead;
            record.last_error = Some(reason.to_string());
            record.finished_at = Some(Timestamp::now());
            record.clone()
        };

        tracing::error!(job_id = %id, error = %reason, "Delivery job rejected");
        self.store
            .save(&snapshot, Some(self.config.failed_retention))
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &JobId) -> Option<JobRecord> {
        self.state.lock().await.records.get(id).cloned()
    }

    /// Dead jobs in enqueue order, for operator inspection.
    pub async fn dead_jobs(&self) -> Vec<JobRecord> {
        let state = self.state.lock().await;
        let mut dead: Vec<JobRecord> = state
            .records
            .values()
            .filter(|r| r.status == JobStatus::Dead)
            .cloned()
            .collect();
        dead.sort_by_key(|r| r.sequence);
        dead
    }

    pub async fn stats(&self) -> QueueStats {
        let state = self.state.lock().await;
        let mut stats = QueueStats::default();
        for record in state.records.values() {
            match record.status {
                JobStatus::Enqueued => stats.enqueued += 1,
                JobStatus::Active => stats.active += 1,
                JobStatus::Retrying => stats.retrying += 1,
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Dead => stats.dead += 1,
            }
        }
        stats
    }

    /// Drop terminal records whose retention window has passed.
    pub async fn purge_expired(&self) -> usize {
        let now = Timestamp::now();
        let expired: Vec<JobId> = {
            let mut state = self.state.lock().await;
            let expired: Vec<JobId> = state
                .records
                .values()
                .filter(|r| self.retention_elapsed(r, &now))
                .map(|r| r.id.clone())
                .collect();
            for id in &expired {
                state.records.remove(id);
            }
            expired
        };

        for id in &expired {
            if let Err(e) = self.store.remove(id).await {
                tracing::warn!(job_id = %id, error = %e, "Failed to remove purged job");
            }
        }
        if !expired.is_empty() {
            tracing::debug!(purged = expired.len(), "Purged expired delivery jobs");
        }
        expired.len()
    }

    /// Reload records from the store. Jobs that were active when the previous
    /// process stopped are queued again. Returns the number of runnable jobs.
    pub async fn restore(&self) -> Result<usize, QueueError> {
        let records = self.store.load_all().await?;
        let now_ts = Timestamp::now();
        let now = Instant::now();
        let mut requeued = Vec::new();
        let mut runnable = 0;

        {
            let mut state = self.state.lock().await;
            for mut record in records {
                if state.records.contains_key(&record.id) || self.reserved.contains(&record.id) {
                    continue;
                }
                state.next_sequence = state.next_sequence.max(record.sequence + 1);

                match record.status {
                    JobStatus::Active | JobStatus::Enqueued => {
                        if record.status == JobStatus::Active {
                            record.status = JobStatus::Enqueued;
                            requeued.push(record.clone());
                        }
                        state.push_ready(&record);
                        runnable += 1;
                    }
                    JobStatus::Retrying => {
                        let wait = record
                            .available_at
                            .duration_since(&now_ts)
                            .to_std()
                            .unwrap_or(Duration::ZERO);
                        state
                            .delayed
                            .push(Reverse((now + wait, record.sequence, record.id.clone())));
                        runnable += 1;
                    }
                    JobStatus::Completed | JobStatus::Dead => {}
                }
                state.records.insert(record.id.clone(), record);
            }
        }

        for record in &requeued {
            self.store.save(record, None).await?;
        }
        tracing::info!(
            queue = %self.config.queue_name,
            runnable,
            requeued = requeued.len(),
            "Delivery queue restored"
        );
        self.changed.notify_waiters();
        Ok(runnable)
    }

    /// Stop handing out jobs. Waiting `dequeue` calls return `None`.
    pub async fn close(&self) {
        self.state.lock().await.closed = true;
        self.changed.notify_waiters();
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }

    fn retention_elapsed(&self, record: &JobRecord, now: &Timestamp) -> bool {
        let retention = match record.status {
            JobStatus::Completed => self.config.completed_retention,
            JobStatus::Dead => self.config.failed_retention,
            _ => return false,
        };
        record
            .finished_at
            .map(|finished| !finished.plus(retention).is_after(now))
            .unwrap_or(false)
    }

    async fn persist(&self, record: &JobRecord, retain_for: Option<Duration>) {
        if let Err(e) = self.store.save(record, retain_for).await {
            tracing::warn!(job_id = %record.id, error = %e, "Failed to persist job state");
        }
    }
}
