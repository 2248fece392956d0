//! WebSocket adapters for live event delivery.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │   NotificationService / domain services                              │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                     │ emit(RealtimeEvent)
//!                                     ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         EventRouter                                  │
//! │   1. local broadcast (awaited)     2. broker publish (spawned)       │
//! └─────────────────────────────────────────────────────────────────────┘
//!            │                                        │
//!            ▼                                        ▼
//! ┌──────────────────────────┐          ┌──────────────────────────────┐
//! │   ConnectionRegistry     │◀─────────│  PubSubBridge (other hosts)  │
//! │   project:1  user:alice  │          └──────────────────────────────┘
//! │   ├── conn-a ├── conn-a  │
//! │   └── conn-c └── conn-b  │
//! └──────────────────────────┘
//! ```
//!
//! # Components
//!
//! - [`messages`] - WebSocket message protocol types
//! - [`rooms`] - Connection registry and room membership
//! - [`event_router`] - Local-then-remote event fanout
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod event_router;
pub mod handler;
pub mod messages;
pub mod rooms;

pub use event_router::EventRouter;
pub use handler::{websocket_router, ws_handler, WebSocketState};
pub use messages::{ClientMessage, ConnectedMessage, ErrorMessage, EventMessage, ServerMessage};
pub use rooms::{ConnectionHandle, ConnectionRegistry, RegistryError};
