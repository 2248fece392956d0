//! Application layer - use cases that coordinate domain, ports, and adapters.

mod errors;
pub mod notification_service;

pub use notification_service::{
    FanoutReport, NotificationService, NOTIFICATION_CREATED, NOTIFICATION_READ,
};
