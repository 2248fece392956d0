//! Process-local message broker.
//!
//! Stands in for Redis in tests and single-node development. Several
//! bridges sharing one `InMemoryBroker` behave like several instances
//! sharing one Redis. An outage switch simulates the broker going away.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::ports::{pattern_matches, BrokerError, BrokerMessage, BrokerStream, MessageBroker};

const BUFFER: usize = 1024;

pub struct InMemoryBroker {
    sender: Mutex<broadcast::Sender<BrokerMessage>>,
    available: AtomicBool,
    published: Mutex<Vec<BrokerMessage>>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUFFER);
        Self {
            sender: Mutex::new(sender),
            available: AtomicBool::new(true),
            published: Mutex::new(Vec::new()),
        }
    }

    /// Simulate an outage (false) or recovery (true).
    ///
    /// Going unavailable also ends every open subscription.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
        if !available {
            self.disconnect_all();
        }
    }

    /// End every open subscription stream.
    pub fn disconnect_all(&self) {
        let (fresh, _) = broadcast::channel(BUFFER);
        let mut sender = self.sender.lock().unwrap_or_else(|e| e.into_inner());
        *sender = fresh;
    }

    /// Everything successfully published so far.
    pub fn published(&self) -> Vec<BrokerMessage> {
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Number of live subscription streams.
    pub fn subscriber_count(&self) -> usize {
        self.sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .receiver_count()
    }

    fn ensure_available(&self) -> Result<(), BrokerError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("in-memory broker offline".into()))
        }
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn publish(&self, channel: &str, payload: &str) -> Result<(), BrokerError> {
        self.ensure_available()?;
        let message = BrokerMessage {
            channel: channel.to_string(),
            payload: payload.to_string(),
        };
        self.published
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message.clone());
        // No subscribers is fine, same as Redis PUBLISH returning 0.
        let _ = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .send(message);
        Ok(())
    }

    async fn subscribe(&self, patterns: &[String]) -> Result<BrokerStream, BrokerError> {
        self.ensure_available()?;
        let receiver = self
            .sender
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .subscribe();
        let patterns = patterns.to_vec();

        let stream = futures::stream::unfold((receiver, patterns), |(mut rx, patterns)| async move {
            loop {
                match rx.recv().await {
                    Ok(message) => {
                        if patterns.iter().any(|p| pattern_matches(p, &message.channel)) {
                            return Some((message, (rx, patterns)));
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "In-memory subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}
