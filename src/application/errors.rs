//! Conversions from port and adapter errors into [`DomainError`].

use crate::adapters::delivery::QueueError;
use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::RepositoryError;

impl From<RepositoryError> for DomainError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(id) => {
                DomainError::new(ErrorCode::NotificationNotFound, "Notification not found")
                    .with_detail("notification_id", id.to_string())
            }
            RepositoryError::Forbidden(id) => DomainError::new(
                ErrorCode::Forbidden,
                "Notification belongs to another user",
            )
            .with_detail("notification_id", id.to_string()),
            RepositoryError::Database(message) => {
                DomainError::new(ErrorCode::DatabaseError, message)
            }
        }
    }
}

impl From<QueueError> for DomainError {
    fn from(err: QueueError) -> Self {
        match err {
            QueueError::InvalidJob(validation) => validation.into(),
            QueueError::Store(e) => DomainError::new(ErrorCode::QueueUnavailable, e.to_string()),
            QueueError::Closed => {
                DomainError::new(ErrorCode::QueueUnavailable, "Delivery queue is closed")
            }
            QueueError::NotFound(id) => {
                DomainError::new(ErrorCode::InternalError, "Delivery job vanished")
                    .with_detail("job_id", id.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{NotificationId, ValidationError};

    #[test]
    fn repository_errors_map_to_codes() {
        let id = NotificationId::new();
        assert_eq!(
            DomainError::from(RepositoryError::NotFound(id)).code,
            ErrorCode::NotificationNotFound
        );
        assert_eq!(
            DomainError::from(RepositoryError::Forbidden(id)).code,
            ErrorCode::Forbidden
        );
        assert_eq!(
            DomainError::from(RepositoryError::Database("down".into())).code,
            ErrorCode::DatabaseError
        );
    }

    #[test]
    fn queue_errors_map_to_codes() {
        assert_eq!(
            DomainError::from(QueueError::Closed).code,
            ErrorCode::QueueUnavailable
        );
        let invalid = QueueError::InvalidJob(ValidationError::empty_field("email"));
        assert_eq!(DomainError::from(invalid).code, ErrorCode::EmptyField);
    }
}
