//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Realtime Ports
//!
//! - `MessageBroker` - Cross-instance pub/sub transport
//! - `SessionResolver` - Identity of a connecting client
//! - `RateLimiter` - Inbound control-frame limits
//!
//! ## Delivery Ports
//!
//! - `JobStore` - Durable storage behind the delivery queue
//! - `DeliveryHandler` - Per-job delivery attempt
//! - `MailTransport` - Outbound email service
//! - `CircuitBreaker` - Transport resilience pattern
//!
//! ## Persistence Ports
//!
//! - `NotificationRepository` - Notification records and watcher lookup

mod circuit_breaker;
mod delivery_handler;
mod job_store;
mod mail_transport;
mod message_broker;
mod notification_repository;
mod rate_limiter;
mod session_resolver;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState};
pub use delivery_handler::{DeliveryHandler, DeliveryOutcome};
pub use job_store::{JobStore, JobStoreError};
pub use mail_transport::{MailTransport, OutboundEmail, TransportError, TransportReceipt};
pub use message_broker::{pattern_matches, BrokerError, BrokerMessage, BrokerStream, MessageBroker};
pub use notification_repository::{NotificationRepository, RepositoryError};
pub use rate_limiter::{
    RateLimitDenied, RateLimitError, RateLimitKey, RateLimitResult, RateLimitStatus, RateLimiter,
};
pub use session_resolver::{SessionError, SessionIdentity, SessionResolver};
