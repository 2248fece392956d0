//! Notification domain - records, kinds and side-channel delivery jobs.

mod delivery;
mod email;
mod kind;
mod record;

pub use delivery::{
    ChannelType, DeliveryJob, DeliveryRecipient, JobRecord, JobStatus, NotificationContent,
    Priority,
};
pub use email::EmailAddress;
pub use kind::NotificationKind;
pub use record::{
    Actor, EntityRef, Notification, NotificationDraft, Recipient, MAX_MESSAGE_LEN, MAX_TITLE_LEN,
};
