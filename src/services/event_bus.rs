//! EventBus service for request lifecycle events.
//!
//! Provides a broadcast-based event system with sequence numbering and
//! append-only persistence to an [`EventStore`]. The Harmony Monitor reads
//! its metrics from that log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use super::event_store::EventStore;
use crate::domain::models::{
    PriorityClass, SeverityTier, SpecialistRole, SpecialistStatus, TriggerReason,
};

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing sequence number assigned by EventBus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub fn zero() -> Self {
        Self(0)
    }
}

impl std::fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl EventSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event category for filtering and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventCategory {
    Intake,
    Classification,
    Delegation,
    Sla,
    Escalation,
    Resolution,
    Health,
}

impl EventCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intake => "intake",
            Self::Classification => "classification",
            Self::Delegation => "delegation",
            Self::Sla => "sla",
            Self::Escalation => "escalation",
            Self::Resolution => "resolution",
            Self::Health => "health",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "intake" => Some(Self::Intake),
            "classification" => Some(Self::Classification),
            "delegation" => Some(Self::Delegation),
            "sla" => Some(Self::Sla),
            "escalation" => Some(Self::Escalation),
            "resolution" => Some(Self::Resolution),
            "health" => Some(Self::Health),
            _ => None,
        }
    }
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who brought a request to resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    Specialist,
    Operator,
}

/// Unified event envelope containing all event metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub id: EventId,
    pub sequence: SequenceNumber,
    pub timestamp: DateTime<Utc>,
    pub severity: EventSeverity,
    pub category: EventCategory,
    pub request_id: Option<Uuid>,
    pub payload: EventPayload,
}

impl UnifiedEvent {
    /// Build an event; the bus assigns the sequence number on publish.
    pub fn new(
        severity: EventSeverity,
        category: EventCategory,
        request_id: Option<Uuid>,
        payload: EventPayload,
    ) -> Self {
        Self {
            id: EventId::new(),
            sequence: SequenceNumber::zero(),
            timestamp: Utc::now(),
            severity,
            category,
            request_id,
            payload,
        }
    }
}

/// Lifecycle event payloads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum EventPayload {
    RequestReceived {
        request_id: Uuid,
        business_context: String,
        channel: String,
    },
    RequestClassified {
        request_id: Uuid,
        category: String,
        tier: SeverityTier,
        confidence: f64,
        fallback: bool,
    },
    PriorityAssigned {
        request_id: Uuid,
        class: PriorityClass,
        base_class: PriorityClass,
        context_degraded: bool,
    },
    PlanCreated {
        request_id: Uuid,
        revision: u32,
        roles: Vec<SpecialistRole>,
        immediate_escalation: bool,
    },
    SpecialistDispatched {
        request_id: Uuid,
        role: SpecialistRole,
    },
    SpecialistReported {
        request_id: Uuid,
        role: SpecialistRole,
        status: SpecialistStatus,
    },
    Replanned {
        request_id: Uuid,
        revision: u32,
        replaced: Vec<SpecialistRole>,
        replacements: Vec<SpecialistRole>,
    },
    ClockStarted {
        request_id: Uuid,
        class: PriorityClass,
        initial_response_due: DateTime<Utc>,
        escalation_due: DateTime<Utc>,
    },
    InitialResponseDue {
        request_id: Uuid,
        acknowledged: bool,
    },
    EscalationDue {
        request_id: Uuid,
    },
    TicketCreated {
        request_id: Uuid,
        ticket_id: Uuid,
        reason: TriggerReason,
        priority: PriorityClass,
    },
    TicketUpdated {
        request_id: Uuid,
        ticket_id: Uuid,
        reason: TriggerReason,
        priority: PriorityClass,
    },
    TicketClaimed {
        request_id: Uuid,
        ticket_id: Uuid,
        operator: String,
    },
    TicketResolved {
        request_id: Uuid,
        ticket_id: Uuid,
    },
    RequestResolved {
        request_id: Uuid,
        by: ResolvedBy,
    },
    RequestClosed {
        request_id: Uuid,
        reason: String,
    },
    RequestHalted {
        request_id: Uuid,
        detail: String,
    },
    PersistenceDegraded {
        entity: String,
        error: String,
    },
    PersistenceRecovered,
    NotificationDegraded {
        ticket_id: Uuid,
        attempts: u32,
        error: String,
    },
}

impl EventPayload {
    /// Variant name, used for filtering and log fields.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::RequestReceived { .. } => "RequestReceived",
            Self::RequestClassified { .. } => "RequestClassified",
            Self::PriorityAssigned { .. } => "PriorityAssigned",
            Self::PlanCreated { .. } => "PlanCreated",
            Self::SpecialistDispatched { .. } => "SpecialistDispatched",
            Self::SpecialistReported { .. } => "SpecialistReported",
            Self::Replanned { .. } => "Replanned",
            Self::ClockStarted { .. } => "ClockStarted",
            Self::InitialResponseDue { .. } => "InitialResponseDue",
            Self::EscalationDue { .. } => "EscalationDue",
            Self::TicketCreated { .. } => "TicketCreated",
            Self::TicketUpdated { .. } => "TicketUpdated",
            Self::TicketClaimed { .. } => "TicketClaimed",
            Self::TicketResolved { .. } => "TicketResolved",
            Self::RequestResolved { .. } => "RequestResolved",
            Self::RequestClosed { .. } => "RequestClosed",
            Self::RequestHalted { .. } => "RequestHalted",
            Self::PersistenceDegraded { .. } => "PersistenceDegraded",
            Self::PersistenceRecovered => "PersistenceRecovered",
            Self::NotificationDegraded { .. } => "NotificationDegraded",
        }
    }
}

/// Configuration for the EventBus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Channel capacity for the broadcast channel.
    pub channel_capacity: usize,
    /// Whether to persist events to storage.
    pub persist_events: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            persist_events: true,
        }
    }
}

/// Central event bus for broadcasting lifecycle events.
pub struct EventBus {
    sender: broadcast::Sender<UnifiedEvent>,
    sequence: AtomicU64,
    store: Option<Arc<dyn EventStore>>,
    config: EventBusConfig,
}

impl EventBus {
    /// Create a new EventBus with the given configuration.
    pub fn new(config: EventBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
            store: None,
            config,
        }
    }

    /// Add an event store for persistence.
    pub fn with_store(mut self, store: Arc<dyn EventStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish a unified event.
    pub async fn publish(&self, mut event: UnifiedEvent) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        event.sequence = SequenceNumber(seq);

        if self.config.persist_events {
            if let Some(ref store) = self.store {
                if let Err(e) = store.append(&event).await {
                    tracing::warn!(
                        event_type = event.payload.variant_name(),
                        error = %e,
                        "Failed to persist event"
                    );
                }
            }
        }

        // Broadcast to subscribers (ignore send errors - may have no subscribers)
        let _ = self.sender.send(event);
    }

    /// Build and publish an event in one call.
    pub async fn emit(
        &self,
        severity: EventSeverity,
        category: EventCategory,
        request_id: Option<Uuid>,
        payload: EventPayload,
    ) {
        self.publish(UnifiedEvent::new(severity, category, request_id, payload))
            .await;
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.sender.subscribe()
    }

    /// Get the current sequence number.
    pub fn current_sequence(&self) -> SequenceNumber {
        SequenceNumber(self.sequence.load(Ordering::SeqCst))
    }

    /// Get the event store if configured.
    pub fn store(&self) -> Option<Arc<dyn EventStore>> {
        self.store.clone()
    }

    /// Get the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::event_store::{EventQuery, InMemoryEventStore};

    #[tokio::test]
    async fn test_event_bus_sequence_assignment() {
        let bus = EventBus::new(EventBusConfig::default());
        assert_eq!(bus.current_sequence().0, 0);

        let mut rx = bus.subscribe();
        let request_id = Uuid::new_v4();

        bus.emit(
            EventSeverity::Info,
            EventCategory::Sla,
            Some(request_id),
            EventPayload::EscalationDue { request_id },
        )
        .await;
        let first = rx.recv().await.unwrap();
        assert_eq!(first.sequence.0, 0);

        bus.emit(
            EventSeverity::Info,
            EventCategory::Resolution,
            Some(request_id),
            EventPayload::RequestClosed {
                request_id,
                reason: "duplicate".to_string(),
            },
        )
        .await;
        let second = rx.recv().await.unwrap();
        assert_eq!(second.sequence.0, 1);
        assert_eq!(bus.current_sequence().0, 2);
    }

    #[tokio::test]
    async fn test_event_bus_persists_to_store() {
        let store = Arc::new(InMemoryEventStore::new());
        let bus = EventBus::new(EventBusConfig::default()).with_store(store.clone());

        bus.emit(
            EventSeverity::Warning,
            EventCategory::Health,
            None,
            EventPayload::PersistenceRecovered,
        )
        .await;

        let events = store.query(EventQuery::new()).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].payload, EventPayload::PersistenceRecovered);
    }

    #[test]
    fn test_payload_serializes_with_type_tag() {
        let request_id = Uuid::new_v4();
        let payload = EventPayload::EscalationDue { request_id };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["type"], "EscalationDue");
        assert_eq!(payload.variant_name(), "EscalationDue");
    }
}
