//! Simulated specialists.
//!
//! Stand-ins for real specialist agents: each assignment is answered through
//! the engine's report channel after a configurable delay.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;

use crate::domain::models::{SpecialistRole, SpecialistStatus};
use crate::domain::ports::{AssignmentContext, DispatchError, SpecialistDispatcher, SpecialistReport};
use crate::services::engine::Reporter;

/// How a simulated specialist answers an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatedBehavior {
    /// Acknowledge, then complete.
    Complete,
    /// Acknowledge and never finish.
    AcknowledgeOnly,
    Decline,
    Fail,
    /// Accept the assignment and never report.
    Silent,
    /// Refuse the dispatch itself.
    Unavailable,
}

pub struct SimulatedSpecialists {
    reporter: Reporter,
    default: SimulatedBehavior,
    overrides: HashMap<SpecialistRole, SimulatedBehavior>,
    delay: Duration,
    dispatched: Mutex<Vec<AssignmentContext>>,
}

impl SimulatedSpecialists {
    pub fn new(reporter: Reporter) -> Self {
        Self {
            reporter,
            default: SimulatedBehavior::Complete,
            overrides: HashMap::new(),
            delay: Duration::from_millis(50),
            dispatched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, behavior: SimulatedBehavior) -> Self {
        self.default = behavior;
        self
    }

    pub fn with_role(mut self, role: SpecialistRole, behavior: SimulatedBehavior) -> Self {
        self.overrides.insert(role, behavior);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every assignment handed over so far, in dispatch order.
    pub async fn dispatched(&self) -> Vec<AssignmentContext> {
        self.dispatched.lock().await.clone()
    }

    fn behavior_for(&self, role: SpecialistRole) -> SimulatedBehavior {
        self.overrides.get(&role).copied().unwrap_or(self.default)
    }
}

#[async_trait]
impl SpecialistDispatcher for SimulatedSpecialists {
    async fn assign(&self, context: AssignmentContext) -> Result<(), DispatchError> {
        let behavior = self.behavior_for(context.role);
        if behavior == SimulatedBehavior::Unavailable {
            return Err(DispatchError::Unavailable(format!(
                "{} is offline",
                context.role
            )));
        }
        self.dispatched.lock().await.push(context.clone());

        let steps: &[SpecialistStatus] = match behavior {
            SimulatedBehavior::Complete => {
                &[SpecialistStatus::Acknowledged, SpecialistStatus::Completed]
            }
            SimulatedBehavior::AcknowledgeOnly => &[SpecialistStatus::Acknowledged],
            SimulatedBehavior::Decline => &[SpecialistStatus::Declined],
            SimulatedBehavior::Fail => &[SpecialistStatus::Failed],
            SimulatedBehavior::Silent | SimulatedBehavior::Unavailable => &[],
        };
        if steps.is_empty() {
            return Ok(());
        }

        let reporter = self.reporter.clone();
        let delay = self.delay;
        let steps = steps.to_vec();
        tokio::spawn(async move {
            for status in steps {
                tokio::time::sleep(delay).await;
                let report = SpecialistReport {
                    request_id: context.request_id,
                    role: context.role,
                    status,
                    payload: json!({ "assignment_id": context.assignment_id }),
                };
                if !reporter.report(report).await {
                    tracing::debug!(role = %context.role, "Engine stopped before report");
                    return;
                }
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Metadata, PriorityClass, SeverityTier};
    use crate::services::engine::report_channel;
    use uuid::Uuid;

    fn context(role: SpecialistRole) -> AssignmentContext {
        AssignmentContext {
            request_id: Uuid::new_v4(),
            assignment_id: Uuid::new_v4(),
            role,
            required: true,
            revision: 0,
            category: "billing".to_string(),
            tier: SeverityTier::Tier2,
            priority: PriorityClass::Medium,
            business_context: "acme".to_string(),
            raw_text: "invoice question".to_string(),
            metadata: Metadata::new(),
            lead_score: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_reports_ack_then_completion() {
        let (reporter, mut inbox) = report_channel(8);
        let specialists = SimulatedSpecialists::new(reporter);
        specialists
            .assign(context(SpecialistRole::BillingSupport))
            .await
            .unwrap();

        let first = inbox.recv().await.unwrap();
        let second = inbox.recv().await.unwrap();
        assert_eq!(first.status, SpecialistStatus::Acknowledged);
        assert_eq!(second.status, SpecialistStatus::Completed);
        assert_eq!(specialists.dispatched().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable_role_refuses_dispatch() {
        let (reporter, _inbox) = report_channel(8);
        let specialists = SimulatedSpecialists::new(reporter)
            .with_role(SpecialistRole::BillingSupport, SimulatedBehavior::Unavailable);
        let err = specialists
            .assign(context(SpecialistRole::BillingSupport))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Unavailable(_)));
        assert!(specialists.dispatched().await.is_empty());
    }
}
