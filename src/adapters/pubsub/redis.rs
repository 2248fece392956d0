//! Redis-backed message broker for multi-instance deployments.
//!
//! Publishing goes through a shared multiplexed connection. Each
//! subscription opens its own pub/sub connection and issues `PSUBSCRIBE`
//! for every pattern.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::ports::{BrokerError, BrokerMessage, BrokerStream, MessageBroker};

/// Redis pub/sub broker.
///
/// The publish connection is created lazily and dropped after any error, so
/// the next publish reconnects instead of reusing a broken socket.
pub struct RedisBroker {
    client: redis::Client,
    publisher: Mutex<Option<MultiplexedConnection>>,
    timeout: Duration,
}

impl RedisBroker {
    /// Create a broker for `url`. Does not connect yet.
    pub fn new(url: &str, timeout: Duration) -> Result<Self, BrokerError> {
        let client = redis::Client::open(url)
            .map_err(|e: redis::RedisError| BrokerError::Unavailable(e.to_string()))?;
        Ok(Self {
            client,
            publisher: Mutex::new(None),
            timeout,
        })
    }

    async fn publish_connection(&self) -> Result<MultiplexedConnection, BrokerError> {
        let mut slot = self.publisher.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(self.timeout, self.client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| BrokerError::Timeout)?
            .map_err(|e: redis::RedisError| BrokerError::Unavailable(e.to_string()))?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn discard_publish_connection(&self) {
        *self.publisher.lock().await = None;
    }
}

#[async_trait]
impl MessageBroker for RedisBroker {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        let mut conn = self.publish_connection().await?;

        let result = tokio::time::timeout(self.timeout, conn.publish::<_, _, i64>(channel, payload)).await;
        match result {
            Ok(Ok(receivers)) => {
                tracing::trace!(channel = %channel, receivers, "Published to Redis");
                Ok(())
            }
            Ok(Err(e)) => {
                self.discard_publish_connection().await;
                Err(BrokerError::Unavailable(e.to_string()))
            }
            Err(_) => {
                self.discard_publish_connection().await;
                Err(BrokerError::Timeout)
            }
        }
    }

    async fn subscribe(&self, patterns: &[String]) -> Result<BrokerStream, BrokerError> {
        // Subscriptions need a dedicated connection; the multiplexed one
        // cannot enter pub/sub mode.
        let mut pubsub = tokio::time::timeout(self.timeout, self.client.get_async_connection())
            .await
            .map_err(|_| BrokerError::Timeout)?
            .map_err(|e: redis::RedisError| BrokerError::Unavailable(e.to_string()))?
            .into_pubsub();

        for pattern in patterns {
            tokio::time::timeout(self.timeout, pubsub.psubscribe(pattern.as_str()))
                .await
                .map_err(|_| BrokerError::Timeout)?
                .map_err(|e: redis::RedisError| BrokerError::Command(e.to_string()))?;
        }
        tracing::debug!(patterns = ?patterns, "Redis pattern subscription established");

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let channel = msg.get_channel_name().to_string();
            match msg.get_payload::<String>() {
                Ok(payload) => Some(BrokerMessage { channel, payload }),
                Err(e) => {
                    tracing::warn!(channel = %channel, error = %e, "Dropping non-text Redis message");
                    None
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

impl std::fmt::Debug for RedisBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisBroker")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
