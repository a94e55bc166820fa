//! Engine services: the six pipeline components plus the plumbing they
//! share (event bus, write-behind persistence, retry, capacity).

pub mod business_calendar;
pub mod capacity;
pub mod classifier;
pub mod delegation_planner;
pub mod engine;
pub mod escalation_manager;
pub mod event_bus;
pub mod event_store;
pub mod harmony_monitor;
pub mod lead_scoring;
pub mod persistence;
pub mod priority_resolver;
pub mod retry;
pub mod sla_clock;

pub use business_calendar::BusinessCalendar;
pub use capacity::CapacityRegistry;
pub use classifier::Classifier;
pub use delegation_planner::{DelegationPlanner, ReplanError};
pub use engine::{report_channel, Engine, EngineDeps, ReportInbox, Reporter, RequestView};
pub use escalation_manager::{EscalationManager, EscalationOutcome, EscalationTrigger};
pub use event_bus::{EventBus, EventBusConfig, EventCategory, EventPayload, EventSeverity, UnifiedEvent};
pub use event_store::{EventQuery, EventStore, EventStoreError, InMemoryEventStore};
pub use harmony_monitor::{HarmonyMetrics, HarmonyMonitor, HealthStatus};
pub use lead_scoring::LeadScorer;
pub use persistence::PersistenceGate;
pub use priority_resolver::PriorityResolver;
pub use retry::RetryPolicy;
pub use sla_clock::{ClockSignal, SlaClockService};
