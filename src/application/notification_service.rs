//! NotificationService - creates notifications and pushes them out.
//!
//! ## Fan-out
//!
//! `notify` runs one independent task per recipient:
//!
//! 1. Persist the notification record
//! 2. Push `notification.new` (with the unread count) to the recipient's personal room
//! 3. Enqueue an email delivery job when the recipient has an address
//!
//! Tasks are joined and failures are collected into a [`FanoutReport`]; one
//! recipient's failure never affects another's.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tokio::task::JoinSet;

use crate::adapters::delivery::{DeliveryQueue, QueueError};
use crate::adapters::websocket::EventRouter;
use crate::domain::foundation::{DomainError, ErrorCode, JobId, NotificationId, UserId};
use crate::domain::notification::{
    ChannelType, DeliveryJob, DeliveryRecipient, EntityRef, Notification, NotificationContent,
    NotificationDraft, Recipient,
};
use crate::domain::realtime::{EventKind, RealtimeEvent};
use crate::ports::NotificationRepository;

pub const NOTIFICATION_CREATED: &str = "notification.new";
pub const NOTIFICATION_READ: &str = "notification.read";

/// Summary of one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FanoutReport {
    /// Records persisted.
    pub created: usize,
    /// Recipients whose record could not be created.
    pub failed: usize,
    /// Email jobs newly accepted by the delivery queue.
    pub enqueued: usize,
}

#[derive(Debug)]
struct RecipientOutcome {
    enqueued: bool,
}

/// Shared collaborators, cloned into every fan-out task.
#[derive(Clone)]
struct Collaborators {
    repository: Arc<dyn NotificationRepository>,
    router: Arc<EventRouter>,
    queue: Arc<DeliveryQueue>,
}

pub struct NotificationService {
    inner: Collaborators,
}

impl NotificationService {
    pub fn new(
        repository: Arc<dyn NotificationRepository>,
        router: Arc<EventRouter>,
        queue: Arc<DeliveryQueue>,
    ) -> Self {
        Self {
            inner: Collaborators {
                repository,
                router,
                queue,
            },
        }
    }

    /// Create `draft` for every recipient except the actor.
    pub async fn notify(&self, recipients: Vec<Recipient>, draft: NotificationDraft) -> FanoutReport {
        let actor = draft.actor.as_ref().map(|a| a.user_id.clone());
        let draft = Arc::new(draft);
        let mut seen = HashSet::new();
        let mut tasks = JoinSet::new();

        for recipient in recipients {
            if actor.as_ref() == Some(&recipient.user_id) {
                continue;
            }
            if !seen.insert(recipient.user_id.clone()) {
                continue;
            }
            let inner = self.inner.clone();
            let draft = Arc::clone(&draft);
            tasks.spawn(async move {
                let user_id = recipient.user_id.clone();
                (user_id, inner.deliver_one(recipient, &draft).await)
            });
        }

        let mut report = FanoutReport::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((_, Ok(outcome))) => {
                    report.created += 1;
                    if outcome.enqueued {
                        report.enqueued += 1;
                    }
                }
                Ok((user_id, Err(e))) => {
                    report.failed += 1;
                    tracing::warn!(user_id = %user_id, error = %e, "Notification fan-out failed for recipient");
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::error!(error = %e, "Notification fan-out task aborted");
                }
            }
        }

        tracing::info!(
            notification_type = draft.kind.type_name(),
            created = report.created,
            failed = report.failed,
            enqueued = report.enqueued,
            "Notification fan-out finished"
        );
        report
    }

    /// Notify everyone watching `entity`.
    pub async fn notify_watchers(
        &self,
        entity: &EntityRef,
        draft: NotificationDraft,
    ) -> Result<FanoutReport, DomainError> {
        let watchers = self.inner.repository.find_watchers(entity).await?;
        Ok(self.notify(watchers, draft).await)
    }

    /// Mark one notification read and tell the owner's other tabs.
    pub async fn mark_read(
        &self,
        id: NotificationId,
        user_id: &UserId,
    ) -> Result<Notification, DomainError> {
        let notification = self.inner.repository.mark_read(id, user_id).await?;
        let unread = self.inner.unread_count(user_id).await;

        self.inner
            .router
            .emit(RealtimeEvent::notification(
                user_id,
                NOTIFICATION_READ,
                json!({ "notificationId": id, "unreadCount": unread }),
            ))
            .await;
        Ok(notification)
    }

    /// Mark all of a user's notifications read. Returns how many changed.
    pub async fn mark_all_read(&self, user_id: &UserId) -> Result<u64, DomainError> {
        let changed = self.inner.repository.mark_all_read(user_id).await?;

        self.inner
            .router
            .emit(RealtimeEvent::notification(
                user_id,
                NOTIFICATION_READ,
                json!({ "all": true, "count": changed, "unreadCount": 0 }),
            ))
            .await;
        Ok(changed)
    }

    /// Broadcast an entity change through the event router.
    pub async fn publish_change(&self, event: RealtimeEvent) -> Result<usize, DomainError> {
        if !matches!(event.kind, EventKind::EntityChange(_)) {
            return Err(DomainError::new(
                ErrorCode::ValidationFailed,
                "Only entity-change events can be published as changes",
            )
            .with_detail("event_type", event.event_type));
        }
        Ok(self.inner.router.emit(event).await)
    }
}

impl Collaborators {
    async fn deliver_one(
        &self,
        recipient: Recipient,
        draft: &NotificationDraft,
    ) -> Result<RecipientOutcome, DomainError> {
        let notification = Notification::from_draft(recipient.user_id.clone(), draft);
        self.repository.insert(&notification).await?;

        let unread = self.unread_count(&recipient.user_id).await;
        self.router
            .emit(RealtimeEvent::notification(
                &recipient.user_id,
                NOTIFICATION_CREATED,
                json!({ "notification": &notification, "unreadCount": unread }),
            ))
            .await;

        let Some(address) = recipient.email.clone() else {
            return Ok(RecipientOutcome { enqueued: false });
        };

        let job = DeliveryJob {
            idempotency_key: JobId::from(notification.id),
            recipient: DeliveryRecipient {
                user_id: recipient.user_id.clone(),
                address,
                display_name: recipient.display_name.clone(),
            },
            channel: ChannelType::Email,
            content: NotificationContent {
                kind: draft.kind.clone(),
                title: draft.title.clone(),
                message: draft.message.clone(),
                actor_name: draft.actor.as_ref().map(|a| a.display_name.clone()),
                link: draft.link.clone(),
            },
            priority: draft.kind.default_priority(),
        };

        // The record exists either way; a queue problem only costs the email.
        let enqueued = match self.queue.enqueue(job).await {
            Ok(outcome) => !outcome.duplicate,
            Err(QueueError::InvalidJob(e)) => {
                tracing::warn!(
                    user_id = %recipient.user_id,
                    notification_id = %notification.id,
                    error = %e,
                    "Email job rejected"
                );
                false
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %recipient.user_id,
                    notification_id = %notification.id,
                    error = %e,
                    "Email job could not be enqueued"
                );
                false
            }
        };
        Ok(RecipientOutcome { enqueued })
    }

    async fn unread_count(&self, user_id: &UserId) -> Option<u64> {
        match self.repository.unread_count(user_id).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Unread count unavailable");
                None
            }
        }
    }
}
