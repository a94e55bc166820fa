//! Escalation ticket domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::classification::Classification;
use super::delegation::DelegationPlan;
use super::priority::{PriorityAssignment, PriorityClass};

/// Why a request crossed into human handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TriggerReason {
    Breach,
    HardTrigger,
    #[serde(rename = "tier-4")]
    Tier4,
    ReplanExhausted,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Breach => "breach",
            Self::HardTrigger => "hard-trigger",
            Self::Tier4 => "tier-4",
            Self::ReplanExhausted => "replan-exhausted",
        }
    }
}

impl std::fmt::Display for TriggerReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the escalation state machine for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationState {
    None,
    Ticketed,
    HumanAssigned,
    Resolved,
}

impl EscalationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ticketed => "ticketed",
            Self::HumanAssigned => "human_assigned",
            Self::Resolved => "resolved",
        }
    }

    pub fn valid_transitions(&self) -> Vec<EscalationState> {
        match self {
            Self::None => vec![Self::Ticketed],
            Self::Ticketed => vec![Self::HumanAssigned],
            Self::HumanAssigned => vec![Self::Resolved],
            Self::Resolved => vec![],
        }
    }

    pub fn can_transition_to(&self, next: Self) -> bool {
        self.valid_transitions().contains(&next)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Self::Ticketed | Self::HumanAssigned)
    }
}

impl std::fmt::Display for EscalationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification, priority and delegation history at escalation time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationSnapshot {
    pub classification: Classification,
    pub priority: Option<PriorityAssignment>,
    pub plan: Option<DelegationPlan>,
    pub taken_at: DateTime<Utc>,
}

/// One escalation trigger applied to a ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerRecord {
    pub reason: TriggerReason,
    pub detail: String,
    pub at: DateTime<Utc>,
}

/// Durable record of a request handed to human operators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EscalationTicket {
    pub id: Uuid,
    pub request_id: Uuid,
    pub state: EscalationState,
    /// Reason of the trigger that created the ticket.
    pub reason: TriggerReason,
    /// Every trigger applied, the creating one first.
    pub triggers: Vec<TriggerRecord>,
    pub priority_flag: PriorityClass,
    pub snapshot: EscalationSnapshot,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub resolved_at: Option<DateTime<Utc>>,
}

impl EscalationTicket {
    pub fn open(
        request_id: Uuid,
        reason: TriggerReason,
        detail: String,
        priority_flag: PriorityClass,
        snapshot: EscalationSnapshot,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request_id,
            state: EscalationState::Ticketed,
            reason,
            triggers: vec![TriggerRecord { reason, detail, at: now }],
            priority_flag,
            snapshot,
            operator: None,
            resolution: None,
            created_at: now,
            updated_at: now,
            resolved_at: None,
        }
    }

    pub fn transition_to(&mut self, next: EscalationState) -> crate::domain::DomainResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(crate::domain::DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: next.to_string(),
                reason: format!("ticket {}", self.id),
            });
        }
        self.state = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_serializes_kebab_case() {
        assert_eq!(
            serde_json::to_string(&TriggerReason::ReplanExhausted).unwrap(),
            "\"replan-exhausted\""
        );
        assert_eq!(serde_json::to_string(&TriggerReason::Tier4).unwrap(), "\"tier-4\"");
    }

    #[test]
    fn test_state_machine_is_linear() {
        assert!(EscalationState::None.can_transition_to(EscalationState::Ticketed));
        assert!(!EscalationState::Ticketed.can_transition_to(EscalationState::Resolved));
        assert!(EscalationState::HumanAssigned.can_transition_to(EscalationState::Resolved));
        assert!(EscalationState::Resolved.valid_transitions().is_empty());
    }
}
