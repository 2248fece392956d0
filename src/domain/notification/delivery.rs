//! Side-channel delivery jobs.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{EmailAddress, NotificationKind, MAX_MESSAGE_LEN, MAX_TITLE_LEN};
use crate::domain::foundation::{JobId, Timestamp, UserId, ValidationError};

/// Scheduling priority. Declared low to high so `Ord` puts Critical on top.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Email,
}

/// Where a job is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRecipient {
    pub user_id: UserId,
    /// Raw address; validated before any transport work.
    pub address: String,
    pub display_name: Option<String>,
}

/// What gets rendered into the outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationContent {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub actor_name: Option<String>,
    pub link: Option<String>,
}

/// A request to deliver one notification through one side channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryJob {
    /// Usually the notification id; doubles as the job id.
    pub idempotency_key: JobId,
    pub recipient: DeliveryRecipient,
    pub channel: ChannelType,
    pub content: NotificationContent,
    pub priority: Priority,
}

impl DeliveryJob {
    /// Rejects jobs that could never be delivered.
    pub fn validate(&self) -> Result<EmailAddress, ValidationError> {
        let address = match self.channel {
            ChannelType::Email => EmailAddress::parse(&self.recipient.address)?,
        };
        if self.content.title.trim().is_empty() {
            return Err(ValidationError::empty_field("title"));
        }
        let title_len = self.content.title.chars().count();
        if title_len > MAX_TITLE_LEN {
            return Err(ValidationError::out_of_range(
                "title",
                1,
                MAX_TITLE_LEN as i64,
                title_len as i64,
            ));
        }
        let message_len = self.content.message.chars().count();
        if message_len > MAX_MESSAGE_LEN {
            return Err(ValidationError::out_of_range(
                "message",
                0,
                MAX_MESSAGE_LEN as i64,
                message_len as i64,
            ));
        }
        Ok(address)
    }
}

/// Lifecycle of a job: `Enqueued -> Active -> Completed | Retrying | Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Enqueued,
    Active,
    Retrying,
    Completed,
    Dead,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Dead)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Enqueued => "enqueued",
            JobStatus::Active => "active",
            JobStatus::Retrying => "retrying",
            JobStatus::Completed => "completed",
            JobStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

/// Queue bookkeeping around a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    pub id: JobId,
    pub job: DeliveryJob,
    pub status: JobStatus,
    pub attempts_made: u32,
    pub last_error: Option<String>,
    pub enqueued_at: Timestamp,
    /// Earliest time the next attempt may start.
    pub available_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    /// Monotonic enqueue order; breaks ties within a priority band.
    pub sequence: u64,
}

impl JobRecord {
    pub fn new(job: DeliveryJob, sequence: u64) -> Self {
        let now = Timestamp::now();
        Self {
            id: job.idempotency_key.clone(),
            job,
            status: JobStatus::Enqueued,
            attempts_made: 0,
            last_error: None,
            enqueued_at: now,
            available_at: now,
            finished_at: None,
            sequence,
        }
    }

    pub fn priority(&self) -> Priority {
        self.job.priority
    }
}
