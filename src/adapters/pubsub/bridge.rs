//! Pub/Sub bridge between instances.
//!
//! Publishes locally produced live events to the broker and re-broadcasts
//! events from other instances into the local connection registry.
//!
//! # Event Flow
//!
//! ```text
//! Instance A                       Broker                 Instance B
//! EventRouter ──publish──▶ task:1 ─────────▶ PubSubBridge ──▶ ConnectionRegistry
//!     │                                          │
//!     └─▶ local registry                   skips own echoes
//! ```
//!
//! # Degradation
//!
//! While the broker is unreachable `connected` is false, `publish` is a
//! no-op and the instance behaves as a single node. Events produced during
//! an outage are not replayed after reconnecting.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::adapters::websocket::messages::{EventMessage, ServerMessage};
use crate::adapters::websocket::rooms::ConnectionRegistry;
use crate::domain::foundation::{ServerId, Timestamp, UserId};
use crate::domain::realtime::{RealtimeEvent, Room};
use crate::ports::{BrokerMessage, MessageBroker};

/// Channel patterns every instance listens on.
pub const SUBSCRIBED_PATTERNS: &[&str] = &[
    "task:*",
    "project:*",
    "comment:*",
    "workspace:*",
    "notifications:*",
    "presence:*",
];

/// Wire format of an event on the broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrokerEnvelope {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub room: Room,
    pub origin_user_id: Option<UserId>,
    pub origin_server: ServerId,
    pub occurred_at: Timestamp,
}

impl BrokerEnvelope {
    pub fn from_event(event: &RealtimeEvent, origin_server: &ServerId) -> Self {
        Self {
            event_type: event.event_type.clone(),
            data: event.payload.clone(),
            room: event.target_room.clone(),
            origin_user_id: event.origin_user_id.clone(),
            origin_server: origin_server.clone(),
            occurred_at: event.occurred_at,
        }
    }

    fn to_server_message(&self) -> ServerMessage {
        ServerMessage::Event(EventMessage {
            event: self.event_type.clone(),
            room: self.room.to_string(),
            data: self.data.clone(),
            timestamp: self.occurred_at.as_datetime().to_rfc3339(),
        })
    }
}

/// Reconnect policy and subscription set.
#[derive(Debug, Clone)]
pub struct PubSubBridgeConfig {
    pub patterns: Vec<String>,
    /// Delay before the first reconnect attempt.
    pub reconnect_initial: Duration,
    /// Upper bound for the doubling reconnect delay.
    pub reconnect_max: Duration,
}

impl Default for PubSubBridgeConfig {
    fn default() -> Self {
        Self {
            patterns: SUBSCRIBED_PATTERNS.iter().map(|p| p.to_string()).collect(),
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(30),
        }
    }
}

/// Cross-instance fanout over a [`MessageBroker`].
pub struct PubSubBridge {
    broker: Arc<dyn MessageBroker>,
    registry: Arc<ConnectionRegistry>,
    server_id: ServerId,
    connected: AtomicBool,
    config: PubSubBridgeConfig,
}

impl PubSubBridge {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        registry: Arc<ConnectionRegistry>,
        server_id: ServerId,
    ) -> Self {
        Self::with_config(broker, registry, server_id, PubSubBridgeConfig::default())
    }

    pub fn with_config(
        broker: Arc<dyn MessageBroker>,
        registry: Arc<ConnectionRegistry>,
        server_id: ServerId,
        config: PubSubBridgeConfig,
    ) -> Self {
        Self {
            broker,
            registry,
            server_id,
            connected: AtomicBool::new(false),
            config,
        }
    }

    /// True while a broker subscription is live.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn server_id(&self) -> &ServerId {
        &self.server_id
    }

    /// Best-effort publish of an event on its derived channel.
    ///
    /// No-op while disconnected. Failures are logged and swallowed: the
    /// caller has already delivered locally. Returns whether the broker
    /// accepted the message.
    pub async fn publish(&self, event: &RealtimeEvent) -> bool {
        if !self.is_connected() {
            tracing::trace!(event_type = %event.event_type, "Broker disconnected, skipping publish");
            return false;
        }

        let channel = event.channel();
        let envelope = BrokerEnvelope::from_event(event, &self.server_id);
        let payload = match serde_json::to_string(&envelope) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(channel = %channel, error = %e, "Failed to encode broker envelope");
                return false;
            }
        };

        match self.broker.publish(&channel, &payload).await {
            Ok(()) => {
                tracing::trace!(channel = %channel, event_type = %event.event_type, "Event published");
                true
            }
            Err(e) => {
                tracing::warn!(
                    channel = %channel,
                    event_type = %event.event_type,
                    error = %e,
                    "Broker publish failed; other instances miss this event"
                );
                false
            }
        }
    }

    /// Re-broadcast one broker message to the local registry.
    ///
    /// Skips messages this instance published and anything malformed.
    /// Returns how many local connections received it.
    pub async fn handle_message(&self, message: BrokerMessage) -> usize {
        let envelope: BrokerEnvelope = match serde_json::from_str(&message.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(channel = %message.channel, error = %e, "Ignoring malformed broker message");
                return 0;
            }
        };

        if envelope.origin_server == self.server_id {
            return 0;
        }

        let delivered = self
            .registry
            .broadcast(
                &envelope.room,
                &envelope.to_server_message(),
                envelope.origin_user_id.as_ref(),
            )
            .await;

        tracing::debug!(
            channel = %message.channel,
            room = %envelope.room,
            origin_server = %envelope.origin_server,
            delivered,
            "Remote event fanned out"
        );
        delivered
    }

    /// Subscribe and pump broker messages until shutdown.
    ///
    /// Reconnects with a doubling delay whenever the subscription fails or
    /// ends. `connected` tracks the subscription state throughout.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut delay = self.config.reconnect_initial;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.broker.subscribe(&self.config.patterns).await {
                Ok(mut stream) => {
                    self.connected.store(true, Ordering::Release);
                    delay = self.config.reconnect_initial;
                    tracing::info!(server_id = %self.server_id, "Pub/sub bridge connected");

                    loop {
                        tokio::select! {
                            _ = wait_for_shutdown(&mut shutdown) => {
                                self.connected.store(false, Ordering::Release);
                                tracing::info!("Pub/sub bridge stopped");
                                return;
                            }
                            next = stream.next() => match next {
                                Some(message) => {
                                    self.handle_message(message).await;
                                }
                                None => break,
                            }
                        }
                    }

                    self.connected.store(false, Ordering::Release);
                    tracing::warn!(
                        retry_in_ms = delay.as_millis() as u64,
                        "Pub/sub subscription lost, running single-instance"
                    );
                }
                Err(e) => {
                    self.connected.store(false, Ordering::Release);
                    tracing::warn!(
                        error = %e,
                        retry_in_ms = delay.as_millis() as u64,
                        "Pub/sub connect failed, running single-instance"
                    );
                }
            }

            tokio::select! {
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
            delay = (delay * 2).min(self.config.reconnect_max);
        }

        self.connected.store(false, Ordering::Release);
        tracing::info!("Pub/sub bridge stopped");
    }
}

/// Resolves once the flag turns true or the sender is gone.
async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
