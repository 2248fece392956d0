//! In-memory notification repository for tests and development.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::foundation::{NotificationId, Timestamp, UserId};
use crate::domain::notification::{EntityRef, Notification, Recipient};
use crate::ports::{NotificationRepository, RepositoryError};

/// Stores notifications and watcher lists in maps.
///
/// Inserts for users registered with [`fail_inserts_for`](Self::fail_inserts_for)
/// return a database error, which lets tests exercise partial fan-out failure.
#[derive(Debug, Default)]
pub struct InMemoryNotificationRepository {
    notifications: RwLock<HashMap<NotificationId, Notification>>,
    watchers: RwLock<HashMap<EntityRef, Vec<Recipient>>>,
    failing_users: RwLock<HashSet<UserId>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `recipient` as a watcher of `entity`. Re-adding replaces the entry.
    pub async fn add_watcher(&self, entity: EntityRef, recipient: Recipient) {
        let mut watchers = self.watchers.write().await;
        let list = watchers.entry(entity).or_default();
        list.retain(|r| r.user_id != recipient.user_id);
        list.push(recipient);
    }

    pub async fn fail_inserts_for(&self, user_id: UserId) {
        self.failing_users.write().await.insert(user_id);
    }

    /// Notifications owned by `user_id`, oldest first.
    pub async fn for_user(&self, user_id: &UserId) -> Vec<Notification> {
        let mut owned: Vec<Notification> = self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.is_owned_by(user_id))
            .cloned()
            .collect();
        owned.sort_by_key(|n| n.created_at);
        owned
    }

    pub async fn len(&self) -> usize {
        self.notifications.read().await.len()
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert(&self, notification: &Notification) -> Result<(), RepositoryError> {
        if self.failing_users.read().await.contains(&notification.user_id) {
            return Err(RepositoryError::Database(format!(
                "insert refused for {}",
                notification.user_id
            )));
        }
        self.notifications
            .write()
            .await
            .insert(notification.id, notification.clone());
        Ok(())
    }

    async fn find(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError> {
        Ok(self.notifications.read().await.get(&id).cloned())
    }

    async fn mark_read(
        &self,
        id: NotificationId,
        user_id: &UserId,
    ) -> Result<Notification, RepositoryError> {
        let mut notifications = self.notifications.write().await;
        let notification = notifications
            .get_mut(&id)
            .ok_or(RepositoryError::NotFound(id))?;
        if !notification.is_owned_by(user_id) {
            return Err(RepositoryError::Forbidden(id));
        }
        notification.mark_read(Timestamp::now());
        Ok(notification.clone())
    }

    async fn mark_all_read(&self, user_id: &UserId) -> Result<u64, RepositoryError> {
        let now = Timestamp::now();
        let mut changed = 0;
        for notification in self.notifications.write().await.values_mut() {
            if notification.is_owned_by(user_id) && notification.mark_read(now) {
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn unread_count(&self, user_id: &UserId) -> Result<u64, RepositoryError> {
        let count = self
            .notifications
            .read()
            .await
            .values()
            .filter(|n| n.is_owned_by(user_id) && !n.read)
            .count();
        Ok(count as u64)
    }

    async fn find_watchers(&self, entity: &EntityRef) -> Result<Vec<Recipient>, RepositoryError> {
        Ok(self
            .watchers
            .read()
            .await
            .get(entity)
            .cloned()
            .unwrap_or_default())
    }
}
