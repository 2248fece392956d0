//! Redis-backed job store.
//!
//! Layout per queue:
//!
//! | Key | Type | Content |
//! |-----|------|---------|
//! | `{queue}:job:{id}` | string | JSON `JobRecord`, expiring once terminal |
//! | `{queue}:jobs` | set | ids of every stored record |
//!
//! Index entries whose record has expired are pruned on `load_all`.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::domain::foundation::JobId;
use crate::domain::notification::JobRecord;
use crate::ports::{JobStore, JobStoreError};

pub struct RedisJobStore {
    client: redis::Client,
    queue_name: String,
    conn: Mutex<Option<MultiplexedConnection>>,
    timeout: Duration,
}

impl RedisJobStore {
    /// Create a store for `queue_name`. Does not connect yet.
    pub fn new(url: &str, queue_name: &str, timeout: Duration) -> Result<Self, JobStoreError> {
        let client = redis::Client::open(url)
            .map_err(|e: redis::RedisError| JobStoreError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            queue_name: queue_name.to_string(),
            conn: Mutex::new(None),
            timeout,
        })
    }

    fn job_key(&self, id: &str) -> String {
        format!("{}:job:{}", self.queue_name, id)
    }

    fn index_key(&self) -> String {
        format!("{}:jobs", self.queue_name)
    }

    async fn connection(&self) -> Result<MultiplexedConnection, JobStoreError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(self.timeout, self.client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| JobStoreError::Unavailable("connect timed out".into()))?
            .map_err(|e: redis::RedisError| JobStoreError::Unavailable(e.to_string()))?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    /// Run a command, dropping the connection after any failure.
    async fn run<T, F, Fut>(&self, op: F) -> Result<T, JobStoreError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: std::future::Future<Output = redis::RedisResult<T>>,
    {
        let conn = self.connection().await?;
        match tokio::time::timeout(self.timeout, op(conn)).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                *self.conn.lock().await = None;
                Err(JobStoreError::Unavailable(e.to_string()))
            }
            Err(_) => {
                *self.conn.lock().await = None;
                Err(JobStoreError::Unavailable("command timed out".into()))
            }
        }
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn save(
        &self,
        record: &JobRecord,
        retain_for: Option<Duration>,
    ) -> Result<(), JobStoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| JobStoreError::Serialization(e.to_string()))?;
        let job_key = self.job_key(record.id.as_str());
        let index_key = self.index_key();
        let id = record.id.as_str().to_string();

        self.run(|mut conn| async move {
            let mut set = redis::cmd("SET");
            set.arg(&job_key).arg(&json);
            if let Some(retain) = retain_for {
                set.arg("EX").arg(retain.as_secs().max(1));
            }

            redis::pipe()
                .atomic()
                .add_command(set)
                .ignore()
                .cmd("SADD")
                .arg(&index_key)
                .arg(&id)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await?;

        tracing::trace!(job_id = %record.id, status = %record.status, "Job record saved");
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<JobRecord>, JobStoreError> {
        let index_key = self.index_key();
        let ids: Vec<String> = self
            .run(|mut conn| {
                let index_key = index_key.clone();
                async move {
                    redis::cmd("SMEMBERS")
                        .arg(&index_key)
                        .query_async::<_, Vec<String>>(&mut conn)
                        .await
                }
            })
            .await?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = ids.iter().map(|id| self.job_key(id)).collect();
        let values: Vec<Option<String>> = self
            .run(|mut conn| async move {
                redis::cmd("MGET")
                    .arg(&keys)
                    .query_async::<_, Vec<Option<String>>>(&mut conn)
                    .await
            })
            .await?;

        let mut records = Vec::with_capacity(values.len());
        let mut expired = Vec::new();
        for (id, value) in ids.into_iter().zip(values) {
            match value {
                Some(json) => {
                    let record: JobRecord = serde_json::from_str(&json)
                        .map_err(|e| JobStoreError::Serialization(e.to_string()))?;
                    records.push(record);
                }
                None => expired.push(id),
            }
        }

        if !expired.is_empty() {
            let pruned = expired.len();
            self.run(|mut conn| async move {
                redis::cmd("SREM")
                    .arg(&index_key)
                    .arg(&expired)
                    .query_async::<_, ()>(&mut conn)
                    .await
            })
            .await?;
            tracing::debug!(pruned, "Pruned expired job ids from index");
        }

        records.sort_by_key(|r| r.sequence);
        Ok(records)
    }

    async fn remove(&self, id: &JobId) -> Result<(), JobStoreError> {
        let job_key = self.job_key(id.as_str());
        let index_key = self.index_key();
        let id = id.as_str().to_string();

        self.run(|mut conn| async move {
            redis::pipe()
                .atomic()
                .cmd("DEL")
                .arg(&job_key)
                .ignore()
                .cmd("SREM")
                .arg(&index_key)
                .arg(&id)
                .ignore()
                .query_async::<_, ()>(&mut conn)
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RedisJobStore {
        RedisJobStore::new(
            "redis://127.0.0.1:6379",
            "email-notifications",
            Duration::from_secs(1),
        )
        .unwrap()
    }

    #[test]
    fn keys_are_namespaced_by_queue() {
        let store = store();
        assert_eq!(store.job_key("n-1"), "email-notifications:job:n-1");
        assert_eq!(store.index_key(), "email-notifications:jobs");
    }

    #[test]
    fn invalid_url_is_rejected() {
        let result = RedisJobStore::new("not a url", "q", Duration::from_secs(1));
        assert!(matches!(result, Err(JobStoreError::Unavailable(_))));
    }
}
