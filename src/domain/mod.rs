//! Domain layer - pure types shared by every component.
//!
//! - `foundation` - identifiers, timestamps, error types
//! - `realtime` - rooms and live events
//! - `notification` - notification records, kinds and delivery jobs

pub mod foundation;
pub mod notification;
pub mod realtime;
