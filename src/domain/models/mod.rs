pub mod classification;
pub mod config;
pub mod delegation;
pub mod escalation;
pub mod priority;
pub mod request;
pub mod rules;

pub use classification::{Category, Classification, HardTrigger, SeverityTier};
pub use config::{
    BusinessHoursConfig, Config, DatabaseConfig, EngineConfig, LoggingConfig, NotificationConfig,
    RetryConfig,
};
pub use delegation::{
    Assignment, AssignmentStatus, DelegationPlan, SpecialistRole, SpecialistStatus,
};
pub use escalation::{
    EscalationSnapshot, EscalationState, EscalationTicket, TriggerReason, TriggerRecord,
};
pub use priority::{ContextFlags, PriorityAssignment, PriorityClass};
pub use request::{IngestPayload, IngestResponse, Metadata, RequestState, ServiceRequest};
pub use rules::{RuleBook, RuleBookError};
