//! Integration tests for live fan-out across instances.
//!
//! Two hub instances share one in-memory broker. Each has its own
//! connection registry, event router and pub/sub bridge, which is exactly
//! the shape of a multi-node deployment behind a load balancer.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::{mpsc, watch};

use notification_hub::adapters::auth::TrustedHeaderSessionResolver;
use notification_hub::adapters::pubsub::{InMemoryBroker, PubSubBridge};
use notification_hub::adapters::rate_limiter::InMemoryRateLimiter;
use notification_hub::adapters::websocket::handler::{
    close_connection, handle_client_frame, open_connection,
};
use notification_hub::adapters::websocket::{
    ConnectionHandle, ConnectionRegistry, EventRouter, ServerMessage, WebSocketState,
};
use notification_hub::domain::foundation::{ServerId, UserId, WorkspaceId};
use notification_hub::domain::realtime::{EntityType, RealtimeEvent, Room};

// =============================================================================
// Test Infrastructure
// =============================================================================

struct Instance {
    registry: Arc<ConnectionRegistry>,
    router: Arc<EventRouter>,
    bridge: Arc<PubSubBridge>,
}

impl Instance {
    fn start(broker: &Arc<InMemoryBroker>, name: &str, shutdown: watch::Receiver<bool>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let bridge = Arc::new(PubSubBridge::new(
            broker.clone(),
            registry.clone(),
            ServerId::new(name),
        ));
        tokio::spawn(bridge.clone().run(shutdown));
        let router = Arc::new(EventRouter::new(registry.clone(), bridge.clone()));
        Self {
            registry,
            router,
            bridge,
        }
    }

    fn ws_state(&self, frames_per_window: u32) -> WebSocketState {
        WebSocketState::new(
            self.router.clone(),
            Arc::new(InMemoryRateLimiter::new(
                frames_per_window,
                Duration::from_secs(60),
            )),
            Arc::new(TrustedHeaderSessionResolver::default()),
            32,
        )
    }

    async fn connect(&self, user: &str, rooms: &[Room]) -> mpsc::Receiver<Arc<str>> {
        let (handle, rx) = ConnectionHandle::channel(user_id(user), workspace(), 32);
        let id = handle.id;
        self.registry.add_connection(handle).await;
        for room in rooms {
            self.registry.join_room(&id, room.clone()).await.unwrap();
        }
        rx
    }
}

fn user_id(id: &str) -> UserId {
    UserId::new(id).unwrap()
}

fn workspace() -> WorkspaceId {
    WorkspaceId::new("w1").unwrap()
}

async fn wait_until_connected(bridges: &[&Arc<PubSubBridge>]) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !bridges.iter().all(|b| b.is_connected()) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("bridges connect");
}

async fn next_frame(rx: &mut mpsc::Receiver<Arc<str>>) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("frame arrives")
        .expect("channel open");
    serde_json::from_str(&frame).unwrap()
}

async fn assert_silent(rx: &mut mpsc::Receiver<Arc<str>>) {
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err(), "unexpected frame");
}

fn task_updated(origin: &str) -> RealtimeEvent {
    RealtimeEvent::entity_change(
        EntityType::Task,
        "task.updated",
        Room::project(1),
        json!({ "id": "t1", "status": "done" }),
        Some(user_id(origin)),
    )
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn event_reaches_members_on_both_instances_exactly_once() {
    let broker = Arc::new(InMemoryBroker::new());
    let (stop, shutdown) = watch::channel(false);
    let a = Instance::start(&broker, "node-a", shutdown.clone());
    let b = Instance::start(&broker, "node-b", shutdown);
    wait_until_connected(&[&a.bridge, &b.bridge]).await;

    let room = [Room::project(1)];
    let mut alice = a.connect("alice", &room).await;
    let mut carol = a.connect("carol", &room).await;
    let mut bob = b.connect("bob", &room).await;

    let delivered_locally = a.router.emit(task_updated("alice")).await;
    assert_eq!(delivered_locally, 1);

    let on_a = next_frame(&mut carol).await;
    let on_b = next_frame(&mut bob).await;
    assert_eq!(on_a["event"], "task.updated");
    assert_eq!(on_b["event"], "task.updated");
    assert_eq!(on_b["room"], "project:1");
    assert_eq!(on_b["data"]["status"], "done");

    // The originating actor gets no echo and node-a ignores its own broker copy.
    assert_silent(&mut alice).await;
    assert_silent(&mut carol).await;
    assert_silent(&mut bob).await;

    let published = broker.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].channel, "task:1");

    let _ = stop.send(true);
}

#[tokio::test]
async fn personal_notification_reaches_every_tab_across_instances() {
    let broker = Arc::new(InMemoryBroker::new());
    let (stop, shutdown) = watch::channel(false);
    let a = Instance::start(&broker, "node-a", shutdown.clone());
    let b = Instance::start(&broker, "node-b", shutdown);
    wait_until_connected(&[&a.bridge, &b.bridge]).await;

    let mut tab_on_a = a.connect("bob", &[]).await;
    let mut tab_on_b = b.connect("bob", &[]).await;

    a.router
        .emit(RealtimeEvent::notification(
            &user_id("bob"),
            "notification.new",
            json!({ "unreadCount": 3 }),
        ))
        .await;

    assert_eq!(next_frame(&mut tab_on_a).await["data"]["unreadCount"], 3);
    assert_eq!(next_frame(&mut tab_on_b).await["data"]["unreadCount"], 3);
    assert_eq!(broker.published()[0].channel, "notifications:bob");

    let _ = stop.send(true);
}

#[tokio::test]
async fn broker_outage_degrades_to_local_delivery() {
    let broker = Arc::new(InMemoryBroker::new());
    let (stop, shutdown) = watch::channel(false);
    let a = Instance::start(&broker, "node-a", shutdown.clone());
    let b = Instance::start(&broker, "node-b", shutdown);
    wait_until_connected(&[&a.bridge, &b.bridge]).await;

    let room = [Room::project(1)];
    let mut carol = a.connect("carol", &room).await;
    let mut bob = b.connect("bob", &room).await;

    broker.set_available(false);
    tokio::time::timeout(Duration::from_secs(2), async {
        while a.bridge.is_connected() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("bridge notices outage");

    assert_eq!(a.router.emit(task_updated("alice")).await, 1);
    assert_eq!(next_frame(&mut carol).await["event"], "task.updated");
    assert_silent(&mut bob).await;

    let _ = stop.send(true);
}

#[tokio::test]
async fn presence_offline_waits_for_last_connection() {
    let broker = Arc::new(InMemoryBroker::new());
    let (stop, shutdown) = watch::channel(false);
    let a = Instance::start(&broker, "node-a", shutdown);
    let state = a.ws_state(100);

    let mut watcher = a
        .connect("carol", &[Room::workspace(&workspace())])
        .await;

    let (tab1, mut rx1) = ConnectionHandle::channel(user_id("bob"), workspace(), 8);
    let (tab2, _rx2) = ConnectionHandle::channel(user_id("bob"), workspace(), 8);
    open_connection(&state, &tab1).await;
    open_connection(&state, &tab2).await;

    assert_eq!(next_frame(&mut rx1).await["type"], "connected");
    assert_eq!(next_frame(&mut watcher).await["event"], "presence.online");
    assert_eq!(next_frame(&mut watcher).await["event"], "presence.online");

    close_connection(&state, &tab1.id).await;
    assert_silent(&mut watcher).await;

    close_connection(&state, &tab2.id).await;
    let offline = next_frame(&mut watcher).await;
    assert_eq!(offline["event"], "presence.offline");
    assert_eq!(offline["data"]["userId"], "bob");

    // Closing twice is harmless.
    close_connection(&state, &tab2.id).await;
    assert_silent(&mut watcher).await;
    assert_eq!(a.registry.connection_count().await, 1);

    let _ = stop.send(true);
}

#[tokio::test]
async fn control_frames_are_answered_and_rate_limited() {
    let broker = Arc::new(InMemoryBroker::new());
    let (stop, shutdown) = watch::channel(false);
    let a = Instance::start(&broker, "node-a", shutdown);
    let state = a.ws_state(3);

    let (handle, _rx) = ConnectionHandle::channel(user_id("bob"), workspace(), 8);
    open_connection(&state, &handle).await;

    let reply = handle_client_frame(&state, &handle, r#"{"type":"subscribe","room":"project:9"}"#).await;
    assert!(matches!(reply, Some(ServerMessage::Subscribed(_))));
    assert!(a
        .registry
        .rooms_of(&handle.id)
        .await
        .contains(&Room::project(9)));

    let reply = handle_client_frame(&state, &handle, r#"{"type":"subscribe","room":"user:alice"}"#).await;
    match reply {
        Some(ServerMessage::Error(error)) => assert_eq!(error.code, "FORBIDDEN_ROOM"),
        other => panic!("expected error, got {other:?}"),
    }

    let reply = handle_client_frame(&state, &handle, "not json").await;
    assert!(matches!(reply, Some(ServerMessage::Error(_))));

    let reply = handle_client_frame(&state, &handle, r#"{"type":"ping"}"#).await;
    match reply {
        Some(ServerMessage::Error(error)) => assert_eq!(error.code, "rate_limited"),
        other => panic!("expected rate limit, got {other:?}"),
    }

    let _ = stop.send(true);
}
