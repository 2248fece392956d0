//! NotificationRepository port - persistence of notification records.
//!
//! The schema and transactions belong to the data layer; this subsystem
//! only needs the operations below.

use async_trait::async_trait;

use crate::domain::foundation::{NotificationId, UserId};
use crate::domain::notification::{EntityRef, Notification, Recipient};

/// Errors from the persistence collaborator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("notification {0} not found")]
    NotFound(NotificationId),

    /// The caller does not own the notification.
    #[error("notification {0} belongs to another user")]
    Forbidden(NotificationId),

    #[error("database error: {0}")]
    Database(String),
}

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), RepositoryError>;

    async fn find(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError>;

    /// Marks one notification read, atomically checking that `user_id` owns it.
    ///
    /// Already-read notifications are returned unchanged.
    async fn mark_read(
        &self,
        id: NotificationId,
        user_id: &UserId,
    ) -> Result<Notification, RepositoryError>;

    /// Marks every unread notification of the user read; returns how many changed.
    async fn mark_all_read(&self, user_id: &UserId) -> Result<u64, RepositoryError>;

    async fn unread_count(&self, user_id: &UserId) -> Result<u64, RepositoryError>;

    /// Users following an entity (assignees, commenters, project members).
    async fn find_watchers(&self, entity: &EntityRef) -> Result<Vec<Recipient>, RepositoryError>;
}
