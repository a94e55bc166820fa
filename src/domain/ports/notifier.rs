use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::models::{PriorityClass, TriggerReason};

/// Notification delivery errors
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Notification channel unavailable: {0}")]
    Unavailable(String),

    #[error("Notification rejected: {0}")]
    Rejected(String),
}

/// Alert sent to the human-operator queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub ticket_id: Uuid,
    pub request_id: Uuid,
    pub reason: TriggerReason,
    pub priority: PriorityClass,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

/// Port for human-escalation alerts. Fire-and-forget from the engine's view.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, channel: &str, notification: &Notification) -> Result<(), NotifyError>;
}
