//! EventStore trait for the append-only lifecycle log.
//!
//! Every event published on the [`EventBus`](super::event_bus::EventBus) lands
//! here; the Harmony Monitor derives its metrics by reading it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::event_bus::{EventCategory, EventSeverity, SequenceNumber, UnifiedEvent};

/// Error type for EventStore operations.
#[derive(Debug, Error)]
pub enum EventStoreError {
    #[error("Failed to append event: {0}")]
    AppendError(String),

    #[error("Failed to query events: {0}")]
    QueryError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),
}

/// Query parameters for event retrieval.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Filter by minimum sequence number (inclusive).
    pub since_sequence: Option<SequenceNumber>,
    /// Filter by request ID.
    pub request_id: Option<Uuid>,
    /// Filter by category.
    pub category: Option<EventCategory>,
    /// Filter by minimum severity.
    pub min_severity: Option<EventSeverity>,
    /// Filter by timestamp (events at or after this time).
    pub since_time: Option<DateTime<Utc>>,
    /// Filter by timestamp (events at or before this time).
    pub until_time: Option<DateTime<Utc>>,
    /// Maximum number of events to return.
    pub limit: Option<u32>,
    /// Sort order (true = ascending by sequence, false = descending).
    pub ascending: bool,
}

impl EventQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn since_sequence(mut self, seq: SequenceNumber) -> Self {
        self.since_sequence = Some(seq);
        self
    }

    pub fn request_id(mut self, id: Uuid) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn category(mut self, category: EventCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn min_severity(mut self, severity: EventSeverity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    pub fn since_time(mut self, time: DateTime<Utc>) -> Self {
        self.since_time = Some(time);
        self
    }

    pub fn until_time(mut self, time: DateTime<Utc>) -> Self {
        self.until_time = Some(time);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn ascending(mut self) -> Self {
        self.ascending = true;
        self
    }

    /// Whether an event passes every filter in this query.
    pub fn matches(&self, event: &UnifiedEvent) -> bool {
        if let Some(seq) = self.since_sequence {
            if event.sequence < seq {
                return false;
            }
        }
        if let Some(request_id) = self.request_id {
            if event.request_id != Some(request_id) {
                return false;
            }
        }
        if let Some(category) = self.category {
            if event.category != category {
                return false;
            }
        }
        if let Some(min) = self.min_severity {
            if event.severity < min {
                return false;
            }
        }
        if let Some(since) = self.since_time {
            if event.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until_time {
            if event.timestamp > until {
                return false;
            }
        }
        true
    }
}

/// Trait for event persistence implementations.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Append an event to the store.
    async fn append(&self, event: &UnifiedEvent) -> Result<(), EventStoreError>;

    /// Query events based on filter criteria.
    async fn query(&self, query: EventQuery) -> Result<Vec<UnifiedEvent>, EventStoreError>;

    /// Get the latest sequence number in the store.
    async fn latest_sequence(&self) -> Result<Option<SequenceNumber>, EventStoreError>;

    /// Count total events in the store.
    async fn count(&self) -> Result<u64, EventStoreError>;

    /// Prune events older than the specified duration.
    async fn prune_older_than(&self, duration: Duration) -> Result<u64, EventStoreError>;

    /// Get events since a sequence number (for replay).
    async fn replay_since(
        &self,
        sequence: SequenceNumber,
    ) -> Result<Vec<UnifiedEvent>, EventStoreError> {
        self.query(EventQuery::new().since_sequence(sequence).ascending())
            .await
    }
}

/// In-memory event store.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    events: tokio::sync::RwLock<Vec<UnifiedEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append(&self, event: &UnifiedEvent) -> Result<(), EventStoreError> {
        let mut events = self.events.write().await;
        events.push(event.clone());
        Ok(())
    }

    async fn query(&self, query: EventQuery) -> Result<Vec<UnifiedEvent>, EventStoreError> {
        let events = self.events.read().await;
        let mut result: Vec<_> = events.iter().filter(|e| query.matches(e)).cloned().collect();

        if query.ascending {
            result.sort_by_key(|e| e.sequence);
        } else {
            result.sort_by_key(|e| std::cmp::Reverse(e.sequence));
        }

        if let Some(limit) = query.limit {
            result.truncate(limit as usize);
        }

        Ok(result)
    }

    async fn latest_sequence(&self) -> Result<Option<SequenceNumber>, EventStoreError> {
        let events = self.events.read().await;
        Ok(events.iter().map(|e| e.sequence).max())
    }

    async fn count(&self) -> Result<u64, EventStoreError> {
        let events = self.events.read().await;
        Ok(events.len() as u64)
    }

    async fn prune_older_than(&self, duration: Duration) -> Result<u64, EventStoreError> {
        let cutoff = Utc::now() - chrono::Duration::from_std(duration).unwrap_or_default();
        let mut events = self.events.write().await;
        let original_len = events.len();
        events.retain(|e| e.timestamp >= cutoff);
        Ok((original_len - events.len()) as u64)
    }
}
