//! Realtime domain - rooms and live events.

mod event;
mod room;

pub use event::{EntityType, EventKind, RealtimeEvent, NOTIFICATION_CHANNEL, PRESENCE_CHANNEL};
pub use room::{Room, PERSONAL_NAMESPACE};
