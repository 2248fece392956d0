//! Event router: one entry point for live events.
//!
//! # Event Flow
//!
//! ```text
//! RealtimeEvent
//!      │
//!      ├──▶ ConnectionRegistry.broadcast(target room, exclude origin)   (awaited)
//!      │
//!      └──▶ PubSubBridge.publish(channel)                               (spawned, if connected)
//! ```
//!
//! Local delivery never waits on the broker. Nothing is retried: a client
//! that misses a live event re-fetches current state on reconnect.

use std::sync::Arc;

use crate::adapters::pubsub::PubSubBridge;
use crate::domain::realtime::RealtimeEvent;

use super::messages::ServerMessage;
use super::rooms::ConnectionRegistry;

pub struct EventRouter {
    registry: Arc<ConnectionRegistry>,
    bridge: Option<Arc<PubSubBridge>>,
}

impl EventRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, bridge: Arc<PubSubBridge>) -> Self {
        Self {
            registry,
            bridge: Some(bridge),
        }
    }

    /// Router for a single instance with no broker.
    pub fn local_only(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            bridge: None,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub fn bridge(&self) -> Option<&Arc<PubSubBridge>> {
        self.bridge.as_ref()
    }

    /// Whether events currently reach other instances.
    pub fn is_distributed(&self) -> bool {
        self.bridge.as_ref().is_some_and(|b| b.is_connected())
    }

    /// Deliver an event locally, then hand it to the bridge in the background.
    ///
    /// Returns the number of local connections that received it. Never fails.
    pub async fn emit(&self, event: RealtimeEvent) -> usize {
        let message = ServerMessage::event(&event);
        let delivered = self
            .registry
            .broadcast(&event.target_room, &message, event.origin_user_id.as_ref())
            .await;

        tracing::debug!(
            event_type = %event.event_type,
            room = %event.target_room,
            delivered,
            "Event delivered locally"
        );

        if let Some(bridge) = &self.bridge {
            if bridge.is_connected() {
                let bridge = Arc::clone(bridge);
                tokio::spawn(async move {
                    bridge.publish(&event).await;
                });
            }
        }

        delivered
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::pubsub::InMemoryBroker;
    use crate::adapters::websocket::rooms::ConnectionHandle;
    use crate::domain::foundation::{ServerId, UserId, WorkspaceId};
    use crate::domain::realtime::{EntityType, Room};
    use serde_json::json;
    use tokio::sync::mpsc;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    async fn join(
        registry: &ConnectionRegistry,
        id: &str,
        room: &Room,
    ) -> mpsc::Receiver<Arc<str>> {
        let (handle, rx) = ConnectionHandle::channel(user(id), WorkspaceId::new("w").unwrap(), 8);
        let conn = handle.id;
        registry.add_connection(handle).await;
        registry.join_room(&conn, room.clone()).await.unwrap();
        rx
    }

    fn event(origin: &str) -> RealtimeEvent {
        RealtimeEvent::entity_change(
            EntityType::Task,
            "task.created",
            Room::project(1),
            json!({"id": "t9"}),
            Some(user(origin)),
        )
    }

    #[tokio::test]
    async fn emit_skips_origin_actor_and_reaches_others() {
        let registry = Arc::new(ConnectionRegistry::new());
        let room = Room::project(1);
        let mut a1 = join(&registry, "alice", &room).await;
        let mut a2 = join(&registry, "alice", &room).await;
        let mut b = join(&registry, "bob", &room).await;
        let router = EventRouter::local_only(registry);

        let delivered = router.emit(event("alice")).await;

        assert_eq!(delivered, 1);
        assert!(a1.try_recv().is_err());
        assert!(a2.try_recv().is_err());
        let frame: serde_json::Value = serde_json::from_str(&b.try_recv().unwrap()).unwrap();
        assert_eq!(frame["data"]["id"], "t9");
    }

    #[tokio::test]
    async fn emit_with_disconnected_bridge_still_delivers_locally() {
        let registry = Arc::new(ConnectionRegistry::new());
        let mut b = join(&registry, "bob", &Room::project(1)).await;
        let broker = Arc::new(InMemoryBroker::new());
        let bridge = Arc::new(PubSubBridge::new(
            broker.clone(),
            registry.clone(),
            ServerId::new("a"),
        ));
        let router = EventRouter::new(registry, bridge);

        assert!(!router.is_distributed());
        assert_eq!(router.emit(event("alice")).await, 1);
        assert!(b.try_recv().is_ok());
        assert!(broker.published().is_empty());
    }
}
