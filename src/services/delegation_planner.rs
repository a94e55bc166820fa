//! Builds and revises delegation plans from the capability and staffing tables.

use std::collections::HashSet;
use std::sync::Arc;

use thiserror::Error;
use uuid::Uuid;

use super::capacity::CapacityRegistry;
use crate::domain::models::{
    Assignment, AssignmentStatus, DelegationPlan, RuleBook, SeverityTier, SpecialistRole,
};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReplanError {
    #[error("Replan limit reached after {replans} replans")]
    Exhausted { replans: u32 },

    #[error("No replacement available for failed role {0}")]
    NoReplacement(SpecialistRole),

    #[error("Assignment {0} is not a failed assignment of this plan")]
    UnknownAssignment(Uuid),
}

pub struct DelegationPlanner {
    rules: Arc<RuleBook>,
    capacity: Arc<CapacityRegistry>,
    max_replans: u32,
}

impl DelegationPlanner {
    pub fn new(rules: Arc<RuleBook>, capacity: Arc<CapacityRegistry>, max_replans: u32) -> Self {
        Self {
            rules,
            capacity,
            max_replans,
        }
    }

    pub fn capacity(&self) -> &Arc<CapacityRegistry> {
        &self.capacity
    }

    /// Build the initial plan. Capacity for every planned role is acquired
    /// here and must be released when its assignment settles.
    pub fn plan(&self, request_id: Uuid, category: &str, tier: SeverityTier) -> DelegationPlan {
        if tier.requires_human() {
            return DelegationPlan::immediate_escalation(request_id);
        }

        let (min, max) = self
            .rules
            .staffing_for(tier)
            .map_or((1, Some(1)), |rule| (rule.min, rule.max));

        let mut roles = Vec::new();
        for &role in self.rules.candidates_for(category) {
            if max.is_some_and(|max| roles.len() >= max) {
                break;
            }
            if self.capacity.try_acquire(role) {
                roles.push(role);
            } else {
                tracing::debug!(%role, %request_id, "Role at capacity, skipping");
            }
        }

        while roles.len() < min {
            self.capacity.force_acquire(SpecialistRole::GeneralSupport);
            roles.push(SpecialistRole::GeneralSupport);
        }

        let assignments = roles
            .into_iter()
            .enumerate()
            .map(|(index, role)| Assignment::new(role, index < min, 0))
            .collect();

        DelegationPlan::new(request_id, assignments)
    }

    /// Replace the given failed assignments in one new revision.
    ///
    /// Replacements exclude every role that failed in this plan and every
    /// role still active in it; `general-support` fills in when no candidate
    /// is left, unless it has itself failed. On error the plan is untouched.
    pub fn replan(
        &self,
        plan: &mut DelegationPlan,
        category: &str,
        failed: &[Uuid],
    ) -> Result<Vec<Assignment>, ReplanError> {
        if plan.revision >= self.max_replans {
            return Err(ReplanError::Exhausted {
                replans: plan.revision,
            });
        }

        let failed_roles: HashSet<SpecialistRole> = plan.failed_roles().into_iter().collect();
        let mut excluded: HashSet<SpecialistRole> = failed_roles.clone();
        excluded.extend(plan.active().map(|a| a.role));

        let revision = plan.revision + 1;
        let mut replacements: Vec<Assignment> = Vec::with_capacity(failed.len());

        for id in failed {
            let Some(original) = plan
                .assignments
                .iter()
                .find(|a| a.id == *id && a.status == AssignmentStatus::Failed)
            else {
                self.release_all(&replacements);
                return Err(ReplanError::UnknownAssignment(*id));
            };

            let candidate = self
                .rules
                .candidates_for(category)
                .iter()
                .copied()
                .find(|role| !excluded.contains(role) && self.capacity.try_acquire(*role));

            let role = match candidate {
                Some(role) => {
                    excluded.insert(role);
                    role
                }
                None if !failed_roles.contains(&SpecialistRole::GeneralSupport) => {
                    self.capacity.force_acquire(SpecialistRole::GeneralSupport);
                    SpecialistRole::GeneralSupport
                }
                None => {
                    self.release_all(&replacements);
                    return Err(ReplanError::NoReplacement(original.role));
                }
            };

            replacements.push(Assignment::new(role, original.required, revision));
        }

        plan.revision = revision;
        plan.assignments.extend(replacements.iter().cloned());
        Ok(replacements)
    }

    fn release_all(&self, assignments: &[Assignment]) {
        for assignment in assignments {
            self.capacity.release(assignment.role);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::rules::RoleCapacity;

    fn planner_with(rules: RuleBook) -> DelegationPlanner {
        let capacity = Arc::new(CapacityRegistry::from_rules(&rules));
        DelegationPlanner::new(Arc::new(rules), capacity, 2)
    }

    fn planner() -> DelegationPlanner {
        planner_with(RuleBook::builtin().unwrap())
    }

    fn fail(plan: &mut DelegationPlan, role: SpecialistRole) -> Uuid {
        let assignment = plan.find_open_mut(role).unwrap();
        assignment.status = AssignmentStatus::Failed;
        assignment.id
    }

    #[test]
    fn test_staffing_counts_per_tier() {
        let p = planner();
        let request_id = Uuid::new_v4();

        let t1 = p.plan(request_id, "lead", SeverityTier::Tier1);
        assert!((1..=2).contains(&t1.assignments.len()));

        let t2 = p.plan(request_id, "technical", SeverityTier::Tier2);
        assert!((3..=4).contains(&t2.assignments.len()));
        assert_eq!(t2.assignments.iter().filter(|a| a.required).count(), 3);

        let t3 = p.plan(request_id, "outage", SeverityTier::Tier3);
        assert!(t3.assignments.len() >= 5);

        let t4 = p.plan(request_id, "security", SeverityTier::Tier4);
        assert!(t4.assignments.is_empty());
        assert!(t4.immediate_escalation);
    }

    #[test]
    fn test_shortfall_padded_with_general_support() {
        let p = planner();
        let plan = p.plan(Uuid::new_v4(), "knowledge", SeverityTier::Tier3);
        assert_eq!(plan.assignments.len(), 5);
        assert_eq!(plan.assignments[0].role, SpecialistRole::KnowledgeLookup);
        assert!(plan.assignments[1..]
            .iter()
            .all(|a| a.role == SpecialistRole::GeneralSupport));
    }

    #[test]
    fn test_unknown_category_uses_general_support() {
        let p = planner();
        let plan = p.plan(Uuid::new_v4(), "general", SeverityTier::Tier1);
        assert_eq!(plan.roles(), vec![SpecialistRole::GeneralSupport]);
        assert!(plan.assignments[0].required);
    }

    #[test]
    fn test_role_at_capacity_is_skipped() {
        let mut rules = RuleBook::builtin().unwrap();
        rules.role_capacity.retain(|c| c.role != SpecialistRole::BillingSupport);
        rules.role_capacity.push(RoleCapacity {
            role: SpecialistRole::BillingSupport,
            max_concurrent: 1,
        });
        let p = planner_with(rules);

        let first = p.plan(Uuid::new_v4(), "billing", SeverityTier::Tier2);
        assert_eq!(first.assignments[0].role, SpecialistRole::BillingSupport);

        let second = p.plan(Uuid::new_v4(), "billing", SeverityTier::Tier2);
        assert!(!second.roles().contains(&SpecialistRole::BillingSupport));
        assert_eq!(second.assignments.len(), 3);
    }

    #[test]
    fn test_replan_excludes_failed_roles() {
        let p = planner();
        let mut plan = p.plan(Uuid::new_v4(), "outage", SeverityTier::Tier3);
        let failed = vec![
            fail(&mut plan, SpecialistRole::TechnicalSupport),
            fail(&mut plan, SpecialistRole::KnowledgeLookup),
        ];

        let replacements = p.replan(&mut plan, "outage", &failed).unwrap();
        assert_eq!(replacements.len(), 2);
        assert_eq!(plan.revision, 1);
        for replacement in &replacements {
            assert_ne!(replacement.role, SpecialistRole::TechnicalSupport);
            assert_ne!(replacement.role, SpecialistRole::KnowledgeLookup);
            assert!(replacement.required);
            assert_eq!(replacement.revision, 1);
        }
        assert_eq!(plan.active().count(), 5);
    }

    #[test]
    fn test_replan_exhausts_after_limit() {
        let p = planner();
        let mut plan = p.plan(Uuid::new_v4(), "complaint", SeverityTier::Tier2);

        for _ in 0..2 {
            let role = plan.active().next().unwrap().role;
            let id = fail(&mut plan, role);
            p.replan(&mut plan, "complaint", &[id]).unwrap();
        }

        let role = plan.active().next().unwrap().role;
        let id = fail(&mut plan, role);
        assert_eq!(
            p.replan(&mut plan, "complaint", &[id]),
            Err(ReplanError::Exhausted { replans: 2 })
        );
        assert_eq!(plan.revision, 2);
    }

    #[test]
    fn test_no_replacement_when_general_support_failed() {
        let p = planner();
        let mut plan = p.plan(Uuid::new_v4(), "general", SeverityTier::Tier1);
        let id = fail(&mut plan, SpecialistRole::GeneralSupport);
        assert_eq!(
            p.replan(&mut plan, "general", &[id]),
            Err(ReplanError::NoReplacement(SpecialistRole::GeneralSupport))
        );
        assert_eq!(plan.revision, 0);
    }
}
