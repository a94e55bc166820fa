//! Priority domain model.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operational urgency of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityClass {
    Low,
    Medium,
    High,
    Urgent,
}

impl PriorityClass {
    pub const ALL: [PriorityClass; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }

    /// One class higher, saturating at `Urgent`.
    pub fn raised(self) -> Self {
        match self {
            Self::Low => Self::Medium,
            Self::Medium => Self::High,
            Self::High | Self::Urgent => Self::Urgent,
        }
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Business-context flags looked up for a request's contact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFlags {
    pub vip: bool,
    /// Escalations previously opened for this contact.
    pub prior_escalations: u32,
}

/// Priority class plus the SLA deadlines applied at assignment time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityAssignment {
    pub class: PriorityClass,
    /// Class before context flags were applied.
    pub base_class: PriorityClass,
    pub initial_response_mins: u64,
    pub escalation_mins: u64,
    /// Deadlines only count business hours.
    pub business_hours_only: bool,
    /// Names of the context flags that raised the class.
    #[serde(default)]
    pub raised_by: Vec<String>,
    /// Context lookup failed and the base class was used.
    #[serde(default)]
    pub context_degraded: bool,
    pub assigned_at: DateTime<Utc>,
}

impl PriorityAssignment {
    pub fn initial_response(&self) -> Duration {
        Duration::from_secs(self.initial_response_mins * 60)
    }

    pub fn escalation(&self) -> Duration {
        Duration::from_secs(self.escalation_mins * 60)
    }
}
