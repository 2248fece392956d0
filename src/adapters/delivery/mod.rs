//! Side-channel delivery: durable queue, job stores and worker pool.
//!
//! ## Components
//!
//! - [`DeliveryQueue`] - priority-ordered, idempotent, retrying job queue
//! - [`DeliveryWorkerPool`] - bounded-concurrency, token-bucket limited consumers
//! - [`RedisJobStore`] / [`InMemoryJobStore`] - `JobStore` implementations

mod in_memory_store;
mod queue;
mod redis_store;
mod worker;

pub use in_memory_store::InMemoryJobStore;
pub use queue::{DeliveryQueue, DeliveryQueueConfig, EnqueueOutcome, QueueError, QueueStats};
pub use redis_store::RedisJobStore;
pub use worker::{DeliveryWorkerPool, WorkerPoolConfig, WorkerPoolHandle};
