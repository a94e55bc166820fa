//! Harmony - service request orchestration and escalation engine
//!
//! Harmony takes inbound customer requests, classifies them into a severity
//! tier, assigns a priority class with SLA deadlines, delegates the work to
//! specialist roles and escalates to a human operator when a hard trigger
//! fires, a deadline passes or the specialists cannot finish the job.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Pure data models, ports and errors
//! - **Service Layer** (`services`): The pipeline components and the engine
//!   that wires them together
//! - **Adapters** (`adapters`): SQLite and in-memory stores, notifiers,
//!   simulated specialists, the context directory
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use harmony::services::{report_channel, Engine, EngineDeps};
//!
//! let engine = Engine::start(config, rules, deps)?;
//! let response = engine.ingest(IngestPayload::new("acme", "I was charged twice")).await;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    Classification, Config, DelegationPlan, EscalationTicket, IngestPayload, IngestResponse,
    PriorityAssignment, PriorityClass, RequestState, RuleBook, SeverityTier, ServiceRequest,
};
pub use domain::ports::{ContextProvider, Notifier, RecordStore, SpecialistDispatcher};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Engine, EngineDeps, HarmonyMetrics, RequestView};
