//! HTTP adapters - operational and internal endpoints.
//!
//! - [`health`] - `GET /health`
//! - [`notifications`] - internal calls from the owning services

pub mod health;
pub mod notifications;

pub use health::{health_router, HealthResponse, HealthState};
pub use notifications::{notifications_router, ApiError, NotificationsState};
