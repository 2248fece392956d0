//! Email channel adapters.
//!
//! - [`EmailChannelSender`] - validate, breaker check, render, send
//! - [`InMemoryCircuitBreaker`] - consecutive-failure breaker
//! - [`HttpMailTransport`] - pooled HTTP relay client
//! - [`MockMailTransport`] - scripted transport for tests
//! - [`EmailDeliveryHandler`] - plugs the sender into the delivery worker pool

mod circuit_breaker;
mod handler;
mod http_transport;
mod mock_transport;
mod sender;
pub mod templates;

pub use circuit_breaker::InMemoryCircuitBreaker;
pub use handler::EmailDeliveryHandler;
pub use http_transport::{HttpMailTransport, HttpMailTransportConfig};
pub use mock_transport::MockMailTransport;
pub use sender::{EmailChannelSender, EmailSenderConfig, SendError};
