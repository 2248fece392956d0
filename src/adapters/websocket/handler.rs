//! WebSocket upgrade handler for live notification connections.
//!
//! Handles the HTTP → WebSocket upgrade and manages the connection lifecycle:
//! 1. Resolve the already-authenticated session (401 without one)
//! 2. Upgrade to WebSocket
//! 3. Register the connection, join the workspace room, announce presence
//! 4. Pump outbound frames and inbound control messages until disconnect
//! 5. Remove the connection exactly once and announce offline if it was the last

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};

use crate::domain::foundation::ConnectionId;
use crate::domain::realtime::{RealtimeEvent, Room};
use crate::ports::{
    RateLimitKey, RateLimitResult, RateLimiter, SessionError, SessionIdentity, SessionResolver,
};

use super::event_router::EventRouter;
use super::messages::{
    ClientMessage, ConnectedMessage, ServerMessage, ERROR_FORBIDDEN_ROOM, ERROR_INVALID_MESSAGE,
    ERROR_INVALID_ROOM, ERROR_RATE_LIMITED,
};
use super::rooms::{ConnectionHandle, ConnectionRegistry, RegistryError};

/// Rate-limit resource name for inbound control frames.
pub const CONTROL_RESOURCE: &str = "ws_control";

/// State required for WebSocket handling.
#[derive(Clone)]
pub struct WebSocketState {
    pub registry: Arc<ConnectionRegistry>,
    pub router: Arc<EventRouter>,
    pub limiter: Arc<dyn RateLimiter>,
    pub sessions: Arc<dyn SessionResolver>,
    /// Outbound frames buffered per connection before it counts as saturated.
    pub channel_capacity: usize,
}

impl WebSocketState {
    pub fn new(
        router: Arc<EventRouter>,
        limiter: Arc<dyn RateLimiter>,
        sessions: Arc<dyn SessionResolver>,
        channel_capacity: usize,
    ) -> Self {
        Self {
            registry: Arc::clone(router.registry()),
            router,
            limiter,
            sessions,
            channel_capacity,
        }
    }
}

/// Handle WebSocket upgrade requests.
///
/// Route: `GET /ws`
pub async fn ws_handler(
    State(state): State<WebSocketState>,
    headers: HeaderMap,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    let identity = match state.sessions.resolve(&headers).await {
        Ok(identity) => identity,
        Err(SessionError::Unavailable(reason)) => {
            tracing::error!(error = %reason, "Session resolver unavailable");
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        Err(e) => {
            tracing::debug!(error = %e, "Rejected WebSocket upgrade without session");
            return (StatusCode::UNAUTHORIZED, "unauthorized").into_response();
        }
    };

    let Some(ws) = ws else {
        return (StatusCode::UPGRADE_REQUIRED, "websocket upgrade required").into_response();
    };

    ws.on_upgrade(move |socket| handle_socket(socket, identity, state))
}

/// Handle an established WebSocket connection.
async fn handle_socket(socket: WebSocket, identity: SessionIdentity, state: WebSocketState) {
    let (mut sink, mut stream) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::channel(
        identity.user_id,
        identity.workspace_id,
        state.channel_capacity,
    );
    let connection_id = handle.id;

    open_connection(&state, &handle).await;

    // Forward queued frames to the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                tracing::debug!(connection_id = %connection_id, error = %e, "Send error, closing connection");
                break;
            }
        }
    });

    // Handle incoming messages from client
    let recv_state = state.clone();
    let recv_handle = handle.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = stream.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    if let Some(reply) = handle_client_frame(&recv_state, &recv_handle, &text).await {
                        recv_handle.send(&reply);
                    }
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!(connection_id = %connection_id, "Received unsupported binary message");
                    recv_handle.send(&ServerMessage::error(
                        ERROR_INVALID_MESSAGE,
                        "binary frames are not supported",
                    ));
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                    // Protocol-level heartbeats are answered by axum
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(connection_id = %connection_id, "Client sent close frame");
                    break;
                }
                Err(e) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "Receive error");
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    close_connection(&state, &connection_id).await;
}

/// Register a connection and announce it.
///
/// Joins the personal room (implicitly) and the workspace room, sends the
/// `connected` frame, then emits `presence.online` to the workspace.
pub async fn open_connection(state: &WebSocketState, handle: &ConnectionHandle) {
    state.registry.add_connection(handle.clone()).await;
    if let Err(e) = state
        .registry
        .join_room(&handle.id, Room::workspace(&handle.workspace_id))
        .await
    {
        tracing::warn!(connection_id = %handle.id, error = %e, "Failed to join workspace room");
    }

    handle.send(&ServerMessage::Connected(ConnectedMessage::new(
        handle.id,
        &handle.user_id,
        &handle.workspace_id,
    )));

    tracing::info!(
        connection_id = %handle.id,
        user_id = %handle.user_id,
        workspace_id = %handle.workspace_id,
        "WebSocket connected"
    );

    state
        .router
        .emit(RealtimeEvent::presence(&handle.workspace_id, &handle.user_id, true))
        .await;
}

/// Remove a connection; emits `presence.offline` if it was the user's last here.
pub async fn close_connection(state: &WebSocketState, connection_id: &ConnectionId) {
    let Some(handle) = state.registry.remove_connection(connection_id).await else {
        return;
    };

    tracing::info!(connection_id = %connection_id, user_id = %handle.user_id, "WebSocket disconnected");

    if !state.registry.is_user_connected(&handle.user_id).await {
        state
            .router
            .emit(RealtimeEvent::presence(&handle.workspace_id, &handle.user_id, false))
            .await;
    }
}

/// Process one inbound text frame. Returns the reply to send, if any.
///
/// Malformed frames produce an `error` reply; the connection stays open.
pub async fn handle_client_frame(
    state: &WebSocketState,
    handle: &ConnectionHandle,
    text: &str,
) -> Option<ServerMessage> {
    let key = RateLimitKey::user_resource(&handle.user_id, CONTROL_RESOURCE);
    match state.limiter.check(key).await {
        Ok(RateLimitResult::Denied(denied)) => {
            tracing::debug!(connection_id = %handle.id, user_id = %handle.user_id, "Control frame rate limited");
            return Some(ServerMessage::error(ERROR_RATE_LIMITED, denied.message));
        }
        Ok(RateLimitResult::Allowed(_)) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Rate limiter unavailable, allowing frame");
        }
    }

    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::debug!(connection_id = %handle.id, error = %e, "Ignoring malformed client message");
            return Some(ServerMessage::error(ERROR_INVALID_MESSAGE, "unrecognized message"));
        }
    };

    match message {
        ClientMessage::Ping => Some(ServerMessage::pong()),
        ClientMessage::Subscribe { room } => {
            let room = match Room::parse(room) {
                Ok(room) => room,
                Err(e) => return Some(ServerMessage::error(ERROR_INVALID_ROOM, e.to_string())),
            };
            match state.registry.join_room(&handle.id, room.clone()).await {
                Ok(_) => Some(ServerMessage::subscribed(&room)),
                Err(e) => Some(registry_error_reply(e)),
            }
        }
        ClientMessage::Unsubscribe { room } => {
            let room = match Room::parse(room) {
                Ok(room) => room,
                Err(e) => return Some(ServerMessage::error(ERROR_INVALID_ROOM, e.to_string())),
            };
            match state.registry.leave_room(&handle.id, &room).await {
                Ok(_) => Some(ServerMessage::unsubscribed(&room)),
                Err(e) => Some(registry_error_reply(e)),
            }
        }
    }
}

fn registry_error_reply(error: RegistryError) -> ServerMessage {
    match error {
        RegistryError::PersonalRoom(_) => ServerMessage::error(ERROR_FORBIDDEN_ROOM, error.to_string()),
        RegistryError::NotRegistered(_) => ServerMessage::error(ERROR_INVALID_MESSAGE, error.to_string()),
    }
}

/// Create axum router for the WebSocket endpoint.
pub fn websocket_router() -> axum::Router<WebSocketState> {
    use axum::routing::get;

    axum::Router::new().route("/ws", get(ws_handler))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::auth::TrustedHeaderSessionResolver;
    use crate::adapters::rate_limiter::InMemoryRateLimiter;
    use crate::domain::foundation::{UserId, WorkspaceId};
    use axum::body::Body;
    use http::Request;
    use std::sync::Arc as StdArc;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    fn state_with_limit(max: u32) -> WebSocketState {
        let registry = StdArc::new(ConnectionRegistry::new());
        WebSocketState::new(
            StdArc::new(EventRouter::local_only(registry)),
            StdArc::new(InMemoryRateLimiter::new(max, Duration::from_secs(60))),
            StdArc::new(TrustedHeaderSessionResolver::default()),
            16,
        )
    }

    fn connection(user: &str) -> (ConnectionHandle, mpsc::Receiver<StdArc<str>>) {
        ConnectionHandle::channel(
            UserId::new(user).unwrap(),
            WorkspaceId::new("w1").unwrap(),
            16,
        )
    }

    fn frames(rx: &mut mpsc::Receiver<StdArc<str>>) -> Vec<serde_json::Value> {
        let mut out = Vec::new();
        while let Ok(frame) = rx.try_recv() {
            out.push(serde_json::from_str(&frame).unwrap());
        }
        out
    }

    #[tokio::test]
    async fn open_connection_sends_connected_and_joins_workspace() {
        let state = state_with_limit(10);
        let (handle, mut rx) = connection("alice");

        open_connection(&state, &handle).await;

        let rooms = state.registry.rooms_of(&handle.id).await;
        assert!(rooms.contains(&Room::workspace(&handle.workspace_id)));
        assert!(rooms.contains(&Room::user(&handle.user_id)));
        assert_eq!(frames(&mut rx)[0]["type"], "connected");
    }

    #[tokio::test]
    async fn presence_reaches_other_workspace_members() {
        let state = state_with_limit(10);
        let (bob, mut bob_rx) = connection("bob");
        open_connection(&state, &bob).await;
        frames(&mut bob_rx);

        let (alice, _alice_rx) = connection("alice");
        open_connection(&state, &alice).await;
        let online = frames(&mut bob_rx);
        assert_eq!(online[0]["event"], "presence.online");

        close_connection(&state, &alice.id).await;
        let offline = frames(&mut bob_rx);
        assert_eq!(offline[0]["event"], "presence.offline");
        assert_eq!(offline[0]["data"]["userId"], "alice");
    }

    #[tokio::test]
    async fn offline_waits_for_last_connection() {
        let state = state_with_limit(10);
        let (bob, mut bob_rx) = connection("bob");
        open_connection(&state, &bob).await;
        let (tab1, _rx1) = connection("alice");
        let (tab2, _rx2) = connection("alice");
        open_connection(&state, &tab1).await;
        open_connection(&state, &tab2).await;
        frames(&mut bob_rx);

        close_connection(&state, &tab1.id).await;
        assert!(frames(&mut bob_rx).is_empty());

        close_connection(&state, &tab2.id).await;
        assert_eq!(frames(&mut bob_rx).len(), 1);
    }

    #[tokio::test]
    async fn close_connection_twice_is_harmless() {
        let state = state_with_limit(10);
        let (handle, _rx) = connection("alice");
        open_connection(&state, &handle).await;

        close_connection(&state, &handle.id).await;
        close_connection(&state, &handle.id).await;

        assert_eq!(state.registry.connection_count().await, 0);
    }

    #[tokio::test]
    async fn subscribe_and_unsubscribe_round_trip() {
        let state = state_with_limit(10);
        let (handle, _rx) = connection("alice");
        open_connection(&state, &handle).await;

        let reply = handle_client_frame(&state, &handle, r#"{"type":"subscribe","room":"project:7"}"#)
            .await
            .unwrap();
        assert_eq!(reply, ServerMessage::subscribed(&Room::project(7)));
        assert!(state.registry.rooms_of(&handle.id).await.contains(&Room::project(7)));

        let reply = handle_client_frame(&state, &handle, r#"{"type":"unsubscribe","room":"project:7"}"#)
            .await
            .unwrap();
        assert_eq!(reply, ServerMessage::unsubscribed(&Room::project(7)));
    }

    #[tokio::test]
    async fn ping_gets_pong() {
        let state = state_with_limit(10);
        let (handle, _rx) = connection("alice");
        open_connection(&state, &handle).await;

        let reply = handle_client_frame(&state, &handle, r#"{"type":"ping"}"#).await.unwrap();
        assert!(matches!(reply, ServerMessage::Pong(_)));
    }

    #[tokio::test]
    async fn malformed_frame_gets_error_reply() {
        let state = state_with_limit(10);
        let (handle, _rx) = connection("alice");
        open_connection(&state, &handle).await;

        let reply = handle_client_frame(&state, &handle, "{nope").await.unwrap();
        match reply {
            ServerMessage::Error(err) => assert_eq!(err.code, ERROR_INVALID_MESSAGE),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(state.registry.connection_count().await, 1);
    }

    #[tokio::test]
    async fn foreign_personal_room_is_refused() {
        let state = state_with_limit(10);
        let (handle, _rx) = connection("alice");
        open_connection(&state, &handle).await;

        let reply = handle_client_frame(&state, &handle, r#"{"type":"subscribe","room":"user:bob"}"#)
            .await
            .unwrap();
        match reply {
            ServerMessage::Error(err) => assert_eq!(err.code, ERROR_FORBIDDEN_ROOM),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn invalid_room_name_is_refused() {
        let state = state_with_limit(10);
        let (handle, _rx) = connection("alice");
        open_connection(&state, &handle).await;

        let reply = handle_client_frame(&state, &handle, r#"{"type":"subscribe","room":"lobby"}"#)
            .await
            .unwrap();
        match reply {
            ServerMessage::Error(err) => assert_eq!(err.code, ERROR_INVALID_ROOM),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn control_frames_are_rate_limited() {
        let state = state_with_limit(2);
        let (handle, _rx) = connection("alice");
        open_connection(&state, &handle).await;

        for _ in 0..2 {
            let reply = handle_client_frame(&state, &handle, r#"{"type":"ping"}"#).await.unwrap();
            assert!(matches!(reply, ServerMessage::Pong(_)));
        }
        let reply = handle_client_frame(&state, &handle, r#"{"type":"ping"}"#).await.unwrap();
        match reply {
            ServerMessage::Error(err) => assert_eq!(err.code, ERROR_RATE_LIMITED),
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn upgrade_without_identity_is_unauthorized() {
        let app = websocket_router().with_state(state_with_limit(10));
        let response = app
            .oneshot(Request::builder().uri("/ws").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn plain_http_with_identity_requires_upgrade() {
        let app = websocket_router().with_state(state_with_limit(10));
        let request = Request::builder()
            .uri("/ws")
            .header("x-user-id", "alice")
            .header("x-workspace-id", "w1")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UPGRADE_REQUIRED);
    }
}
