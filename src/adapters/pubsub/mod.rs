//! Pub/sub adapters for cross-instance event fanout.
//!
//! - [`bridge`] - Publishes local events and re-broadcasts remote ones
//! - [`redis`] - Redis `PUBLISH`/`PSUBSCRIBE` broker
//! - [`in_memory`] - Process-local broker for tests and development

pub mod bridge;
pub mod in_memory;
pub mod redis;

pub use bridge::{BrokerEnvelope, PubSubBridge, PubSubBridgeConfig, SUBSCRIBED_PATTERNS};
pub use in_memory::InMemoryBroker;
pub use self::redis::RedisBroker;
