//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps and error types that form the
//! vocabulary of the notification subsystem.

mod errors;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ConnectionId, JobId, NotificationId, ServerId, UserId, WorkspaceId};
pub use timestamp::Timestamp;
