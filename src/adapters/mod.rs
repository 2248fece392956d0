//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `websocket` - Connection registry, event router, axum upgrade handler
//! - `pubsub` - Cross-instance fanout (Redis, in-memory)
//! - `delivery` - Durable delivery queue and worker pool
//! - `email` - Mail channel sender, circuit breaker, transports
//! - `persistence` - Notification records
//! - `rate_limiter` - Inbound control-frame limits
//! - `auth` - Session resolution at the upgrade boundary
//! - `http` - Health endpoint and internal notification routes

pub mod auth;
pub mod delivery;
pub mod email;
pub mod http;
pub mod persistence;
pub mod pubsub;
pub mod rate_limiter;
pub mod websocket;

pub use delivery::{DeliveryQueue, DeliveryWorkerPool, InMemoryJobStore, RedisJobStore};
pub use email::{EmailChannelSender, HttpMailTransport, InMemoryCircuitBreaker, MockMailTransport};
pub use persistence::InMemoryNotificationRepository;
pub use pubsub::{InMemoryBroker, PubSubBridge, RedisBroker};
pub use rate_limiter::InMemoryRateLimiter;
pub use websocket::{ConnectionRegistry, EventRouter};
