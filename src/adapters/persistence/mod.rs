//! Persistence adapters for notification records.

mod in_memory;

pub use in_memory::InMemoryNotificationRepository;
