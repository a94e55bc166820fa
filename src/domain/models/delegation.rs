//! Delegation plan domain model.
//!
//! A plan is an ordered list of specialist assignments. Replanning appends a
//! new revision; earlier assignments stay in the plan as history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Capability role a specialist can fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SpecialistRole {
    LeadQualifier,
    ContentWriter,
    BookingCoordinator,
    KnowledgeLookup,
    BillingSupport,
    TechnicalSupport,
    CustomerSuccess,
    QualityReview,
    GeneralSupport,
}

impl SpecialistRole {
    pub const ALL: [SpecialistRole; 9] = [
        Self::LeadQualifier,
        Self::ContentWriter,
        Self::BookingCoordinator,
        Self::KnowledgeLookup,
        Self::BillingSupport,
        Self::TechnicalSupport,
        Self::CustomerSuccess,
        Self::QualityReview,
        Self::GeneralSupport,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeadQualifier => "lead-qualifier",
            Self::ContentWriter => "content-writer",
            Self::BookingCoordinator => "booking-coordinator",
            Self::KnowledgeLookup => "knowledge-lookup",
            Self::BillingSupport => "billing-support",
            Self::TechnicalSupport => "technical-support",
            Self::CustomerSuccess => "customer-success",
            Self::QualityReview => "quality-review",
            Self::GeneralSupport => "general-support",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == s)
    }
}

impl std::fmt::Display for SpecialistRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status a specialist reports back through the callback interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistStatus {
    Acknowledged,
    Completed,
    Declined,
    Failed,
}

/// Status of a single assignment inside a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Dispatched,
    Acknowledged,
    Completed,
    Declined,
    Failed,
}

impl AssignmentStatus {
    /// Check if the specialist is done with this assignment.
    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Completed | Self::Declined | Self::Failed)
    }
}

impl From<SpecialistStatus> for AssignmentStatus {
    fn from(status: SpecialistStatus) -> Self {
        match status {
            SpecialistStatus::Acknowledged => Self::Acknowledged,
            SpecialistStatus::Completed => Self::Completed,
            SpecialistStatus::Declined => Self::Declined,
            SpecialistStatus::Failed => Self::Failed,
        }
    }
}

/// One specialist assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Uuid,
    pub role: SpecialistRole,
    pub required: bool,
    pub status: AssignmentStatus,
    /// Plan revision that created this assignment.
    pub revision: u32,
    pub dispatched_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn new(role: SpecialistRole, required: bool, revision: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            required,
            status: AssignmentStatus::Dispatched,
            revision,
            dispatched_at: Utc::now(),
            updated_at: None,
        }
    }
}

/// Ordered specialist assignments for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationPlan {
    pub id: Uuid,
    pub request_id: Uuid,
    /// Starts at 0 and increases by one per replan.
    pub revision: u32,
    pub assignments: Vec<Assignment>,
    /// Tier-4 plans carry no assignments and escalate immediately.
    pub immediate_escalation: bool,
    pub created_at: DateTime<Utc>,
}

impl DelegationPlan {
    pub fn new(request_id: Uuid, assignments: Vec<Assignment>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            revision: 0,
            assignments,
            immediate_escalation: false,
            created_at: Utc::now(),
        }
    }

    pub fn immediate_escalation(request_id: Uuid) -> Self {
        Self {
            immediate_escalation: true,
            ..Self::new(request_id, Vec::new())
        }
    }

    /// Assignments that are still part of the working plan.
    pub fn active(&self) -> impl Iterator<Item = &Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.status != AssignmentStatus::Failed)
    }

    pub fn find_open_mut(&mut self, role: SpecialistRole) -> Option<&mut Assignment> {
        self.assignments
            .iter_mut()
            .find(|a| a.role == role && !a.status.is_settled())
    }

    pub fn has_acknowledgement(&self) -> bool {
        self.assignments.iter().any(|a| {
            matches!(
                a.status,
                AssignmentStatus::Acknowledged | AssignmentStatus::Completed
            )
        })
    }

    /// Every non-declined required assignment completed, and at least one
    /// assignment completed.
    pub fn is_fulfilled(&self) -> bool {
        let mut any_completed = false;
        for assignment in self.active() {
            match assignment.status {
                AssignmentStatus::Completed => any_completed = true,
                AssignmentStatus::Declined => {}
                _ if assignment.required => return false,
                _ => {}
            }
        }
        any_completed
    }

    pub fn failed_roles(&self) -> Vec<SpecialistRole> {
        self.assignments
            .iter()
            .filter(|a| a.status == AssignmentStatus::Failed)
            .map(|a| a.role)
            .collect()
    }

    pub fn roles(&self) -> Vec<SpecialistRole> {
        self.assignments.iter().map(|a| a.role).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_with(statuses: &[(SpecialistRole, bool, AssignmentStatus)]) -> DelegationPlan {
        let assignments = statuses
            .iter()
            .map(|(role, required, status)| {
                let mut a = Assignment::new(*role, *required, 0);
                a.status = *status;
                a
            })
            .collect();
        DelegationPlan::new(Uuid::new_v4(), assignments)
    }

    #[test]
    fn test_fulfilled_when_required_completed() {
        let plan = plan_with(&[
            (SpecialistRole::BillingSupport, true, AssignmentStatus::Completed),
            (SpecialistRole::QualityReview, false, AssignmentStatus::Dispatched),
        ]);
        assert!(plan.is_fulfilled());
    }

    #[test]
    fn test_not_fulfilled_while_required_open() {
        let plan = plan_with(&[
            (SpecialistRole::BillingSupport, true, AssignmentStatus::Completed),
            (SpecialistRole::TechnicalSupport, true, AssignmentStatus::Acknowledged),
        ]);
        assert!(!plan.is_fulfilled());
    }

    #[test]
    fn test_all_declined_is_not_fulfilled() {
        let plan = plan_with(&[
            (SpecialistRole::BillingSupport, true, AssignmentStatus::Declined),
        ]);
        assert!(!plan.is_fulfilled());
    }

    #[test]
    fn test_failed_assignments_leave_active_set() {
        let plan = plan_with(&[
            (SpecialistRole::BillingSupport, true, AssignmentStatus::Failed),
            (SpecialistRole::GeneralSupport, true, AssignmentStatus::Completed),
        ]);
        assert_eq!(plan.active().count(), 1);
        assert_eq!(plan.failed_roles(), vec![SpecialistRole::BillingSupport]);
        assert!(plan.is_fulfilled());
    }

    #[test]
    fn test_role_names_roundtrip() {
        for role in SpecialistRole::ALL {
            assert_eq!(SpecialistRole::from_str(role.as_str()), Some(role));
        }
        let yaml: SpecialistRole = serde_yaml::from_str("booking-coordinator").unwrap();
        assert_eq!(yaml, SpecialistRole::BookingCoordinator);
    }
}
