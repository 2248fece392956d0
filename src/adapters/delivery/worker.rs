//! DeliveryWorkerPool - bounded-concurrency consumers for the delivery queue.
//!
//! ## Per-job flow
//!
//! 1. Take the highest-priority ready job (`DeliveryQueue::dequeue`)
//! 2. Wait for a token from the shared token bucket
//! 3. Run the [`DeliveryHandler`] under the job timeout
//! 4. Complete, retry, defer or terminalize according to the outcome
//!
//! Each job occupies one worker for its whole attempt; a slow or failing job
//! never holds up the other workers.
//!
//! ## Graceful Shutdown
//!
//! [`WorkerPoolHandle::shutdown`] closes the queue, lets every worker finish
//! its current attempt, and stops the maintenance task.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::queue::DeliveryQueue;
use crate::domain::notification::JobRecord;
use crate::ports::{DeliveryHandler, DeliveryOutcome};

/// Configuration for [`DeliveryWorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent workers.
    pub concurrency: usize,
    /// Jobs allowed per `rate_limit_window`.
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    /// Upper bound for a single attempt.
    pub job_timeout: Duration,
    /// How often expired terminal jobs are purged.
    pub purge_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(60),
            job_timeout: Duration::from_secs(30),
            purge_interval: Duration::from_secs(60),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_rate_limit(mut self, max: u32, window: Duration) -> Self {
        self.rate_limit_max = max;
        self.rate_limit_window = window;
        self
    }

    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Token bucket allowing a burst of `rate_limit_max`, refilled evenly
    /// across the window.
    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.rate_limit_max).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(self.rate_limit_window / burst.get())
            .map(|quota| quota.allow_burst(burst))
            .unwrap_or_else(|| Quota::per_second(burst))
    }
}

/// Spawns the worker tasks.
pub struct DeliveryWorkerPool;

impl DeliveryWorkerPool {
    /// Start `concurrency` workers and one maintenance task.
    pub fn start(
        queue: Arc<DeliveryQueue>,
        handler: Arc<dyn DeliveryHandler>,
        config: WorkerPoolConfig,
    ) -> WorkerPoolHandle {
        let limiter = Arc::new(RateLimiter::direct(config.quota()));
        let (stop_tx, stop_rx) = watch::channel(false);

        let mut workers = Vec::with_capacity(config.concurrency);
        for worker_id in 0..config.concurrency.max(1) {
            let worker = Worker {
                id: worker_id,
                queue: queue.clone(),
                handler: handler.clone(),
                limiter: limiter.clone(),
                job_timeout: config.job_timeout,
            };
            workers.push(tokio::spawn(worker.run()));
        }

        let maintenance = tokio::spawn(run_maintenance(
            queue.clone(),
            config.purge_interval,
            stop_rx,
        ));

        tracing::info!(
            workers = workers.len(),
            rate_limit_max = config.rate_limit_max,
            rate_limit_window_ms = config.rate_limit_window.as_millis() as u64,
            "Delivery worker pool started"
        );

        WorkerPoolHandle {
            queue,
            workers,
            maintenance,
            stop: stop_tx,
        }
    }
}

/// Running pool. Dropping it without calling `shutdown` leaves the tasks running.
pub struct WorkerPoolHandle {
    queue: Arc<DeliveryQueue>,
    workers: Vec<JoinHandle<()>>,
    maintenance: JoinHandle<()>,
    stop: watch::Sender<bool>,
}

impl WorkerPoolHandle {
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Close the queue and wait for in-flight attempts to finish.
    pub async fn shutdown(self) {
        self.queue.close().await;
        let _ = self.stop.send(true);

        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Delivery worker panicked");
            }
        }
        if let Err(e) = self.maintenance.await {
            tracing::error!(error = %e, "Queue maintenance task panicked");
        }
        tracing::info!("Delivery worker pool stopped");
    }
}

struct Worker {
    id: usize,
    queue: Arc<DeliveryQueue>,
    handler: Arc<dyn DeliveryHandler>,
    limiter: Arc<DefaultDirectRateLimiter>,
    job_timeout: Duration,
}

impl Worker {
    async fn run(self) {
        tracing::debug!(worker = self.id, "Delivery worker started");

        while let Some(record) = self.queue.dequeue().await {
            self.limiter.until_ready().await;
            self.process(record).await;
        }

        tracing::debug!(worker = self.id, "Delivery worker stopped");
    }

    async fn process(&self, record: JobRecord) {
        let attempt = record.attempts_made + 1;
        tracing::debug!(
            worker = self.id,
            job_id = %record.id,
            attempt,
            "Processing delivery job"
        );

        let outcome = match tokio::time::timeout(self.job_timeout, self.handler.handle(&record)).await
        {
            Ok(outcome) => outcome,
            Err(_) => DeliveryOutcome::Retry(format!(
                "attempt timed out after {}ms",
                self.job_timeout.as_millis()
            )),
        };

        let result = match outcome {
            DeliveryOutcome::Delivered => self.queue.complete(&record.id).await,
            DeliveryOutcome::Retry(reason) => {
                self.queue.fail(&record.id, &reason).await.map(|_| ())
            }
            DeliveryOutcome::Defer {
                reason,
                retry_after,
            } => self.queue.defer(&record.id, &reason, retry_after).await,
            DeliveryOutcome::Reject(reason) => self.queue.reject(&record.id, &reason).await,
        };

        if let Err(e) = result {
            tracing::warn!(job_id = %record.id, attempt, error = %e, "Failed to record job outcome");
        }
    }
}

async fn run_maintenance(
    queue: Arc<DeliveryQueue>,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            changed = stop.changed() => {
                if changed.is_err() || *stop.borrow() {
                    break;
                }
            }
            _ = ticker.tick() => {
                queue.purge_expired().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::delivery::{DeliveryQueueConfig, InMemoryJobStore};
    use crate::domain::foundation::{JobId, UserId};
    use crate::domain::notification::{
        ChannelType, DeliveryJob, DeliveryRecipient, JobStatus, NotificationContent,
        NotificationKind, Priority,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

    /// Fails the first `failures` attempts of every job, then delivers.
    struct ScriptedHandler {
        failures: u32,
        delay: Duration,
        calls: AtomicU32,
        delivered: AtomicU32,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl ScriptedHandler {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                delay: Duration::ZERO,
                calls: AtomicU32::new(0),
                delivered: AtomicU32::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    #[async_trait]
    impl DeliveryHandler for ScriptedHandler {
        async fn handle(&self, record: &JobRecord) -> DeliveryOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if record.attempts_made < self.failures {
                DeliveryOutcome::Retry("transport unavailable".into())
            } else {
                self.delivered.fetch_add(1, Ordering::SeqCst);
                DeliveryOutcome::Delivered
            }
        }
    }

    struct RejectingHandler;

    #[async_trait]
    impl DeliveryHandler for RejectingHandler {
        async fn handle(&self, _record: &JobRecord) -> DeliveryOutcome {
            DeliveryOutcome::Reject("invalid recipient".into())
        }
    }

    /// Defers the first `deferrals` calls, then delivers.
    struct PausedChannelHandler {
        deferrals: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl DeliveryHandler for PausedChannelHandler {
        async fn handle(&self, _record: &JobRecord) -> DeliveryOutcome {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.deferrals {
                DeliveryOutcome::Defer {
                    reason: "channel paused".into(),
                    retry_after: Duration::from_millis(5),
                }
            } else {
                DeliveryOutcome::Delivered
            }
        }
    }

    fn job(key: &str) -> DeliveryJob {
        DeliveryJob {
            idempotency_key: JobId::new(key).unwrap(),
            recipient: DeliveryRecipient {
                user_id: UserId::new("bob").unwrap(),
                address: "bob@example.com".to_string(),
                display_name: None,
            },
            channel: ChannelType::Email,
            content: NotificationContent {
                kind: NotificationKind::TaskAssigned {
                    task_id: "t1".into(),
                    task_title: "Ship".into(),
                    project_id: "p1".into(),
                },
                title: "Assigned".into(),
                message: "You were assigned".into(),
                actor_name: None,
                link: None,
            },
            priority: Priority::Normal,
        }
    }

    fn queue(max_attempts: u32) -> Arc<DeliveryQueue> {
        Arc::new(DeliveryQueue::new(
            DeliveryQueueConfig::default()
                .with_max_attempts(max_attempts)
                .with_backoff_base(Duration::from_millis(5)),
            Arc::new(InMemoryJobStore::new()),
        ))
    }

    fn fast_config() -> WorkerPoolConfig {
        WorkerPoolConfig::default().with_rate_limit(1000, Duration::from_secs(1))
    }

    async fn wait_for_terminal(queue: &DeliveryQueue, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let stats = queue.stats().await;
                if stats.completed + stats.dead == expected {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("jobs should reach a terminal state");
    }

    #[tokio::test]
    async fn retry_then_success_completes_with_one_send() {
        let queue = queue(3);
        let handler = Arc::new(ScriptedHandler::new(2));
        let pool = DeliveryWorkerPool::start(queue.clone(), handler.clone(), fast_config());

        queue.enqueue(job("n-1")).await.unwrap();
        wait_for_terminal(&queue, 1).await;

        let record = queue.get(&JobId::new("n-1").unwrap()).await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.attempts_made, 3);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        assert_eq!(handler.delivered.load(Ordering::SeqCst), 1);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn job_failing_every_attempt_ends_dead() {
        let queue = queue(3);
        let handler = Arc::new(ScriptedHandler::new(u32::MAX));
        let pool = DeliveryWorkerPool::start(queue.clone(), handler.clone(), fast_config());

        queue.enqueue(job("n-1")).await.unwrap();
        wait_for_terminal(&queue, 1).await;
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
        let dead = queue.dead_jobs().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].last_error.as_deref(), Some("transport unavailable"));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn rejected_job_is_not_retried() {
        let queue = queue(5);
        let pool =
            DeliveryWorkerPool::start(queue.clone(), Arc::new(RejectingHandler), fast_config());

        queue.enqueue(job("n-1")).await.unwrap();
        wait_for_terminal(&queue, 1).await;

        let record = queue.get(&JobId::new("n-1").unwrap()).await.unwrap();
        assert_eq!(record.status, JobStatus::Dead);
        assert_eq!(record.attempts_made, 1);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn deferred_job_is_rerun_without_spending_attempts() {
        let queue = queue(1);
        let handler = Arc::new(PausedChannelHandler {
            deferrals: 4,
            calls: AtomicU32::new(0),
        });
        let pool = DeliveryWorkerPool::start(queue.clone(), handler.clone(), fast_config());

        queue.enqueue(job("n-1")).await.unwrap();
        wait_for_terminal(&queue, 1).await;

        let record = queue.get(&JobId::new("n-1").unwrap()).await.unwrap();
        assert_eq!(record.status, JobStatus::Completed);
        assert_eq!(record.attempts_made, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 5);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let queue = queue(1);
        let handler = Arc::new(ScriptedHandler::new(0).with_delay(Duration::from_millis(20)));
        let pool = DeliveryWorkerPool::start(
            queue.clone(),
            handler.clone(),
            fast_config().with_concurrency(2),
        );
        assert_eq!(pool.worker_count(), 2);

        for i in 0..6 {
            queue.enqueue(job(&format!("n-{}", i))).await.unwrap();
        }
        wait_for_terminal(&queue, 6).await;

        assert!(handler.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(handler.delivered.load(Ordering::SeqCst), 6);

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn token_bucket_spaces_jobs() {
        let queue = queue(1);
        let handler = Arc::new(ScriptedHandler::new(0));
        let config = WorkerPoolConfig::default()
            .with_concurrency(3)
            .with_rate_limit(1, Duration::from_millis(100));
        let pool = DeliveryWorkerPool::start(queue.clone(), handler.clone(), config);

        let started = std::time::Instant::now();
        for i in 0..3 {
            queue.enqueue(job(&format!("n-{}", i))).await.unwrap();
        }
        wait_for_terminal(&queue, 3).await;

        assert!(started.elapsed() >= Duration::from_millis(150));
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn attempt_exceeding_timeout_is_retried() {
        let queue = queue(1);
        let handler = Arc::new(ScriptedHandler::new(0).with_delay(Duration::from_millis(200)));
        let pool = DeliveryWorkerPool::start(
            queue.clone(),
            handler,
            fast_config().with_job_timeout(Duration::from_millis(20)),
        );

        queue.enqueue(job("n-1")).await.unwrap();
        wait_for_terminal(&queue, 1).await;

        let record = queue.get(&JobId::new("n-1").unwrap()).await.unwrap();
        assert_eq!(record.status, JobStatus::Dead);
        assert!(record.last_error.unwrap().contains("timed out"));

        pool.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_queue() {
        let queue = queue(1);
        let pool = DeliveryWorkerPool::start(
            queue.clone(),
            Arc::new(ScriptedHandler::new(0)),
            fast_config(),
        );

        tokio::time::timeout(Duration::from_secs(1), pool.shutdown())
            .await
            .expect("shutdown should not hang");
        assert!(queue.is_closed().await);
    }

    #[test]
    fn quota_falls_back_for_zero_window() {
        let config = WorkerPoolConfig::default().with_rate_limit(10, Duration::ZERO);
        assert_eq!(config.quota().burst_size().get(), 10);
    }
}
