//! Connection registry: live connections grouped into rooms.
//!
//! Every connection belongs to its owner's personal room (`user:{id}`) plus
//! any rooms it joins. Broadcasts serialize once and hand the frame to each
//! member's outbound channel.
//!
//! # Architecture
//!
//! ```text
//! Room: project:1      Room: user:alice     Room: user:bob
//! ├── conn-a (alice)   ├── conn-a           └── conn-c
//! ├── conn-b (alice)   └── conn-b
//! └── conn-c (bob)
//! ```
//!
//! Both directions of membership live under one `RwLock`, so every mutation
//! updates them together and `connection ∈ room ⇔ room ∈ connection.rooms`
//! holds at every point a reader can observe. Broadcasts only take the read
//! lock, long enough to collect the member senders.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{mpsc, RwLock};

use crate::domain::foundation::{ConnectionId, UserId, WorkspaceId};
use crate::domain::realtime::Room;

use super::messages::ServerMessage;

/// Outbound half of a live connection.
///
/// Frames are pre-serialized JSON shared between all recipients of a broadcast.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub user_id: UserId,
    pub workspace_id: WorkspaceId,
    sender: mpsc::Sender<Arc<str>>,
}

impl ConnectionHandle {
    pub fn new(
        id: ConnectionId,
        user_id: UserId,
        workspace_id: WorkspaceId,
        sender: mpsc::Sender<Arc<str>>,
    ) -> Self {
        Self {
            id,
            user_id,
            workspace_id,
            sender,
        }
    }

    /// Create a handle with a fresh bounded outbound channel.
    pub fn channel(
        user_id: UserId,
        workspace_id: WorkspaceId,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(ConnectionId::new(), user_id, workspace_id, tx), rx)
    }

    /// Queue a message for this connection alone.
    pub fn send(&self, message: &ServerMessage) -> bool {
        match serialize(message) {
            Some(frame) => self.deliver(&frame),
            None => false,
        }
    }

    /// Queue a frame without waiting. False if the connection is closed or full.
    fn deliver(&self, frame: &Arc<str>) -> bool {
        self.sender.try_send(Arc::clone(frame)).is_ok()
    }
}

/// Errors from membership changes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("connection {0} is not registered")]
    NotRegistered(ConnectionId),

    /// Personal rooms are fixed: a connection cannot leave its own or join another's.
    #[error("personal room {0} cannot be joined or left")]
    PersonalRoom(Room),
}

struct ConnectionEntry {
    handle: ConnectionHandle,
    rooms: HashSet<Room>,
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<Room, HashSet<ConnectionId>>,
    users: HashMap<UserId, HashSet<ConnectionId>>,
}

impl RegistryState {
    fn link(&mut self, id: ConnectionId, room: Room) -> bool {
        let Some(entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if !entry.rooms.insert(room.clone()) {
            return false;
        }
        self.rooms.entry(room).or_default().insert(id);
        true
    }

    fn unlink(&mut self, id: ConnectionId, room: &Room) -> bool {
        let Some(entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if !entry.rooms.remove(room) {
            return false;
        }
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
        true
    }

    fn senders_in(&self, room: &Room, exclude: Option<&UserId>) -> Vec<ConnectionHandle> {
        let Some(members) = self.rooms.get(room) else {
            return Vec::new();
        };
        members
            .iter()
            .filter_map(|id| self.connections.get(id))
            .filter(|entry| exclude != Some(&entry.handle.user_id))
            .map(|entry| entry.handle.clone())
            .collect()
    }
}

/// In-process table of live connections and their rooms.
///
/// # Thread Safety
///
/// Uses `RwLock` since broadcasts (reads) vastly outnumber joins/leaves
/// (writes). Sends happen after the lock is released.
#[derive(Default)]
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and put it in its personal room.
    ///
    /// Returns false if the connection was already registered.
    pub async fn add_connection(&self, handle: ConnectionHandle) -> bool {
        let mut state = self.state.write().await;
        let id = handle.id;
        if state.connections.contains_key(&id) {
            return false;
        }

        let personal = Room::user(&handle.user_id);
        let user_id = handle.user_id.clone();
        state.connections.insert(
            id,
            ConnectionEntry {
                handle,
                rooms: HashSet::new(),
            },
        );
        state.users.entry(user_id.clone()).or_default().insert(id);
        state.link(id, personal);

        tracing::debug!(connection_id = %id, user_id = %user_id, "Connection registered");
        true
    }

    /// Drop a connection from every room and the user index.
    ///
    /// Returns the removed handle, or None if it was not registered.
    pub async fn remove_connection(&self, id: &ConnectionId) -> Option<ConnectionHandle> {
        let mut state = self.state.write().await;
        let rooms: Vec<Room> = state.connections.get(id)?.rooms.iter().cloned().collect();
        for room in &rooms {
            state.unlink(*id, room);
        }

        let entry = state.connections.remove(id)?;
        let user_id = &entry.handle.user_id;
        if let Some(ids) = state.users.get_mut(user_id) {
            ids.remove(id);
            if ids.is_empty() {
                state.users.remove(user_id);
            }
        }

        tracing::debug!(
            connection_id = %id,
            user_id = %user_id,
            rooms = rooms.len(),
            "Connection removed"
        );
        Some(entry.handle)
    }

    /// Add a connection to a room. Returns false if it was already a member.
    pub async fn join_room(&self, id: &ConnectionId, room: Room) -> Result<bool, RegistryError> {
        let mut state = self.state.write().await;
        let entry = state
            .connections
            .get(id)
            .ok_or(RegistryError::NotRegistered(*id))?;
        if room.is_personal() && !room.is_personal_room_of(&entry.handle.user_id) {
            return Err(RegistryError::PersonalRoom(room));
        }
        let joined = state.link(*id, room.clone());
        if joined {
            tracing::trace!(connection_id = %id, room = %room, "Joined room");
        }
        Ok(joined)
    }

    /// Remove a connection from a room. Returns false if it was not a member.
    pub async fn leave_room(&self, id: &ConnectionId, room: &Room) -> Result<bool, RegistryError> {
        let mut state = self.state.write().await;
        let entry = state
            .connections
            .get(id)
            .ok_or(RegistryError::NotRegistered(*id))?;
        if room.is_personal_room_of(&entry.handle.user_id) {
            return Err(RegistryError::PersonalRoom(room.clone()));
        }
        let left = state.unlink(*id, room);
        if left {
            tracing::trace!(connection_id = %id, room = %room, "Left room");
        }
        Ok(left)
    }

    /// Send a message to every member of a room except `exclude`'s connections.
    ///
    /// Serializes once. A full or closed member is skipped; the others still
    /// get the frame. Returns how many connections accepted it.
    pub async fn broadcast(
        &self,
        room: &Room,
        message: &ServerMessage,
        exclude: Option<&UserId>,
    ) -> usize {
        let Some(frame) = serialize(message) else {
            return 0;
        };
        let targets = self.state.read().await.senders_in(room, exclude);
        deliver_all(&targets, &frame)
    }

    /// Send a message to all of a user's connections on this instance.
    ///
    /// A user with no connections is not an error; returns 0.
    pub async fn send_to_user(&self, user_id: &UserId, message: &ServerMessage) -> usize {
        let targets: Vec<ConnectionHandle> = {
            let state = self.state.read().await;
            match state.users.get(user_id) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| state.connections.get(id))
                    .map(|entry| entry.handle.clone())
                    .collect(),
                None => return 0,
            }
        };
        let Some(frame) = serialize(message) else {
            return 0;
        };
        deliver_all(&targets, &frame)
    }

    /// Connections currently in a room.
    pub async fn room_members(&self, room: &Room) -> Vec<ConnectionId> {
        self.state
            .read()
            .await
            .rooms
            .get(room)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Rooms a connection is in (empty if unknown).
    pub async fn rooms_of(&self, id: &ConnectionId) -> Vec<Room> {
        self.state
            .read()
            .await
            .connections
            .get(id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Rooms with at least one member.
    pub async fn room_count(&self) -> usize {
        self.state.read().await.rooms.len()
    }

    pub async fn is_user_connected(&self, user_id: &UserId) -> bool {
        self.state.read().await.users.contains_key(user_id)
    }

    pub async fn user_connection_count(&self, user_id: &UserId) -> usize {
        self.state
            .read()
            .await
            .users
            .get(user_id)
            .map(HashSet::len)
            .unwrap_or(0)
    }
}

fn serialize(message: &ServerMessage) -> Option<Arc<str>> {
    match serde_json::to_string(message) {
        Ok(json) => Some(Arc::from(json)),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize server message");
            None
        }
    }
}

fn deliver_all(targets: &[ConnectionHandle], frame: &Arc<str>) -> usize {
    let mut delivered = 0;
    for handle in targets {
        if handle.deliver(frame) {
            delivered += 1;
        } else {
            tracing::debug!(connection_id = %handle.id, "Skipped closed or saturated connection");
        }
    }
    delivered
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn ws() -> WorkspaceId {
        WorkspaceId::new("ws-1").unwrap()
    }

    fn connect(id: &str) -> (ConnectionHandle, mpsc::Receiver<Arc<str>>) {
        ConnectionHandle::channel(user(id), ws(), 16)
    }

    fn drain(rx: &mut mpsc::Receiver<Arc<str>>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn add_connection_joins_personal_room() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = connect("alice");
        let id = handle.id;

        assert!(registry.add_connection(handle).await);

        assert_eq!(registry.rooms_of(&id).await, vec![Room::user(&user("alice"))]);
        assert_eq!(registry.connection_count().await, 1);
        assert!(registry.is_user_connected(&user("alice")).await);
    }

    #[tokio::test]
    async fn add_connection_is_idempotent() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = connect("alice");

        assert!(registry.add_connection(handle.clone()).await);
        assert!(!registry.add_connection(handle).await);

        assert_eq!(registry.connection_count().await, 1);
        assert_eq!(registry.user_connection_count(&user("alice")).await, 1);
    }

    #[tokio::test]
    async fn join_and_leave_are_idempotent() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = connect("alice");
        let id = handle.id;
        registry.add_connection(handle).await;
        let room = Room::project(1);

        assert!(registry.join_room(&id, room.clone()).await.unwrap());
        assert!(!registry.join_room(&id, room.clone()).await.unwrap());
        assert_eq!(registry.room_members(&room).await, vec![id]);

        assert!(registry.leave_room(&id, &room).await.unwrap());
        assert!(!registry.leave_room(&id, &room).await.unwrap());
        assert!(registry.room_members(&room).await.is_empty());
    }

    #[tokio::test]
    async fn last_member_leaving_removes_room() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = connect("alice");
        let id = handle.id;
        registry.add_connection(handle).await;

        registry.join_room(&id, Room::project(1)).await.unwrap();
        assert_eq!(registry.room_count().await, 2);

        registry.leave_room(&id, &Room::project(1)).await.unwrap();
        assert_eq!(registry.room_count().await, 1);
    }

    #[tokio::test]
    async fn personal_rooms_cannot_be_left_or_borrowed() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = connect("alice");
        let id = handle.id;
        registry.add_connection(handle).await;

        let own = registry.leave_room(&id, &Room::user(&user("alice"))).await;
        assert!(matches!(own, Err(RegistryError::PersonalRoom(_))));

        let other = registry.join_room(&id, Room::user(&user("bob"))).await;
        assert!(matches!(other, Err(RegistryError::PersonalRoom(_))));
    }

    #[tokio::test]
    async fn join_unknown_connection_fails() {
        let registry = ConnectionRegistry::new();
        let result = registry.join_room(&ConnectionId::new(), Room::project(1)).await;
        assert!(matches!(result, Err(RegistryError::NotRegistered(_))));
    }

    #[tokio::test]
    async fn remove_connection_clears_every_room() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = connect("alice");
        let id = handle.id;
        registry.add_connection(handle).await;
        registry.join_room(&id, Room::project(1)).await.unwrap();
        registry.join_room(&id, Room::task("t1")).await.unwrap();

        assert!(registry.remove_connection(&id).await.is_some());

        assert_eq!(registry.connection_count().await, 0);
        assert_eq!(registry.room_count().await, 0);
        assert!(!registry.is_user_connected(&user("alice")).await);
        assert!(registry.remove_connection(&id).await.is_none());
    }

    #[tokio::test]
    async fn broadcast_excludes_every_connection_of_the_excluded_user() {
        let registry = ConnectionRegistry::new();
        let room = Room::project(1);
        let (a1, mut rx_a1) = connect("alice");
        let (a2, mut rx_a2) = connect("alice");
        let (b, mut rx_b) = connect("bob");
        for handle in [a1.clone(), a2.clone(), b.clone()] {
            registry.add_connection(handle.clone()).await;
            registry.join_room(&handle.id, room.clone()).await.unwrap();
        }

        let delivered = registry
            .broadcast(&room, &ServerMessage::pong(), Some(&user("alice")))
            .await;

        assert_eq!(delivered, 1);
        assert!(drain(&mut rx_a1).is_empty());
        assert!(drain(&mut rx_a2).is_empty());
        assert_eq!(drain(&mut rx_b).len(), 1);
    }

    #[tokio::test]
    async fn broadcast_skips_closed_connections() {
        let registry = ConnectionRegistry::new();
        let room = Room::project(1);
        let (dead, rx_dead) = connect("alice");
        let (live, mut rx_live) = connect("bob");
        for handle in [dead.clone(), live.clone()] {
            registry.add_connection(handle.clone()).await;
            registry.join_room(&handle.id, room.clone()).await.unwrap();
        }
        drop(rx_dead);

        let delivered = registry.broadcast(&room, &ServerMessage::pong(), None).await;

        assert_eq!(delivered, 1);
        assert_eq!(drain(&mut rx_live).len(), 1);
    }

    #[tokio::test]
    async fn broadcast_to_empty_room_is_noop() {
        let registry = ConnectionRegistry::new();
        let delivered = registry
            .broadcast(&Room::project(99), &ServerMessage::pong(), None)
            .await;
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn send_to_user_reaches_all_their_connections() {
        let registry = ConnectionRegistry::new();
        let (a1, mut rx_a1) = connect("alice");
        let (a2, mut rx_a2) = connect("alice");
        registry.add_connection(a1).await;
        registry.add_connection(a2).await;

        let delivered = registry
            .send_to_user(&user("alice"), &ServerMessage::pong())
            .await;

        assert_eq!(delivered, 2);
        assert_eq!(drain(&mut rx_a1)[0]["type"], "pong");
        assert_eq!(drain(&mut rx_a2).len(), 1);
    }

    #[tokio::test]
    async fn send_to_absent_user_is_silent() {
        let registry = ConnectionRegistry::new();
        let delivered = registry
            .send_to_user(&user("nobody"), &ServerMessage::pong())
            .await;
        assert_eq!(delivered, 0);
    }

    // ----- room consistency under random operation sequences -----

    #[derive(Debug, Clone)]
    enum Op {
        Add(usize, usize),
        Remove(usize),
        Join(usize, usize),
        Leave(usize, usize),
    }

    const USERS: [&str; 3] = ["u0", "u1", "u2"];
    const SLOTS: usize = 5;
    const ROOMS: usize = 4;

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..SLOTS, 0..USERS.len()).prop_map(|(s, u)| Op::Add(s, u)),
            (0..SLOTS).prop_map(Op::Remove),
            (0..SLOTS, 0..ROOMS).prop_map(|(s, r)| Op::Join(s, r)),
            (0..SLOTS, 0..ROOMS).prop_map(|(s, r)| Op::Leave(s, r)),
        ]
    }

    fn room_for(index: usize) -> Room {
        if index == 0 {
            Room::user(&user(USERS[0]))
        } else {
            Room::project(index)
        }
    }

    async fn assert_consistent(registry: &ConnectionRegistry) {
        let state = registry.state.read().await;
        for (id, entry) in &state.connections {
            assert!(entry.rooms.contains(&Room::user(&entry.handle.user_id)));
            for room in &entry.rooms {
                assert!(state.rooms.get(room).is_some_and(|m| m.contains(id)));
            }
            assert!(state
                .users
                .get(&entry.handle.user_id)
                .is_some_and(|ids| ids.contains(id)));
        }
        for (room, members) in &state.rooms {
            assert!(!members.is_empty());
            for id in members {
                let entry = state.connections.get(id).expect("member must be registered");
                assert!(entry.rooms.contains(room));
            }
        }
        for (user_id, ids) in &state.users {
            assert!(!ids.is_empty());
            for id in ids {
                assert_eq!(&state.connections[id].handle.user_id, user_id);
            }
        }
    }

    proptest! {
        #[test]
        fn membership_stays_bidirectionally_consistent(ops in prop::collection::vec(op_strategy(), 1..60)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let registry = ConnectionRegistry::new();
                let mut slots: Vec<Option<(ConnectionHandle, mpsc::Receiver<Arc<str>>)>> =
                    (0..SLOTS).map(|_| None).collect();

                for op in ops {
                    match op {
                        Op::Add(slot, u) => {
                            if slots[slot].is_none() {
                                let (handle, rx) = connect(USERS[u]);
                                registry.add_connection(handle.clone()).await;
                                slots[slot] = Some((handle, rx));
                            }
                        }
                        Op::Remove(slot) => {
                            if let Some((handle, _)) = slots[slot].take() {
                                registry.remove_connection(&handle.id).await;
                            }
                        }
                        Op::Join(slot, r) => {
                            if let Some((handle, _)) = &slots[slot] {
                                let _ = registry.join_room(&handle.id, room_for(r)).await;
                            }
                        }
                        Op::Leave(slot, r) => {
                            if let Some((handle, _)) = &slots[slot] {
                                let _ = registry.leave_room(&handle.id, &room_for(r)).await;
                            }
                        }
                    }
                    assert_consistent(&registry).await;
                }

                let live = slots.iter().filter(|s| s.is_some()).count();
                assert_eq!(registry.connection_count().await, live);
            });
        }
    }
}
