//! Maps severity tier and business context to a priority class and SLA targets.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::domain::models::rules::SlaTarget;
use crate::domain::models::{
    Classification, ContextFlags, PriorityAssignment, PriorityClass, RuleBook, RuleBookError,
    SeverityTier,
};
use crate::domain::ports::{ContextError, ContextProvider};

pub struct PriorityResolver {
    tier_priority: [PriorityClass; 4],
    targets: [SlaTarget; 4],
    context: Arc<dyn ContextProvider>,
    vip_contacts: HashSet<String>,
    lookup_timeout: Duration,
    repeat_escalation_threshold: u32,
}

impl PriorityResolver {
    pub fn new(
        rules: &RuleBook,
        context: Arc<dyn ContextProvider>,
        vip_contacts: &[String],
        lookup_timeout: Duration,
        repeat_escalation_threshold: u32,
    ) -> Result<Self, RuleBookError> {
        let mut tier_priority = [PriorityClass::Low; 4];
        for tier in SeverityTier::ALL {
            tier_priority[tier_index(tier)] = rules
                .priority_for(tier)
                .ok_or(RuleBookError::MissingTierPriority(tier))?;
        }

        let mut targets = [SlaTarget {
            class: PriorityClass::Low,
            initial_response_mins: 0,
            escalation_mins: 0,
            business_hours_only: false,
        }; 4];
        for class in PriorityClass::ALL {
            targets[class as usize] = *rules
                .sla_for(class)
                .ok_or(RuleBookError::MissingSlaTarget(class))?;
        }

        Ok(Self {
            tier_priority,
            targets,
            context,
            vip_contacts: vip_contacts.iter().map(|c| c.to_lowercase()).collect(),
            lookup_timeout,
            repeat_escalation_threshold: repeat_escalation_threshold.max(1),
        })
    }

    /// Look up business context and assign a priority. Never blocks longer
    /// than the lookup timeout; a failed lookup yields the base class.
    pub async fn resolve(
        &self,
        classification: &Classification,
        business_context: &str,
        contact: Option<&str>,
    ) -> PriorityAssignment {
        let lookup = tokio::time::timeout(
            self.lookup_timeout,
            self.context.lookup(business_context, contact),
        )
        .await
        .unwrap_or_else(|_| Err(ContextError::Timeout(self.lookup_timeout.as_millis() as u64)));

        match lookup {
            Ok(mut flags) => {
                if contact.is_some_and(|c| self.vip_contacts.contains(&c.to_lowercase())) {
                    flags.vip = true;
                }
                self.assign(classification.tier, Some(&flags))
            }
            Err(e) => {
                tracing::warn!(
                    business_context,
                    error = %e,
                    "Business-context lookup failed, using base priority"
                );
                self.assign(classification.tier, None)
            }
        }
    }

    /// Apply the tier mapping and any context flags. `None` marks the
    /// assignment as context-degraded.
    pub fn assign(&self, tier: SeverityTier, flags: Option<&ContextFlags>) -> PriorityAssignment {
        let base_class = self.tier_priority[tier_index(tier)];
        let mut class = base_class;
        let mut raised_by = Vec::new();

        if let Some(flags) = flags {
            if flags.vip {
                class = class.raised();
                raised_by.push("vip".to_string());
            }
            if flags.prior_escalations >= self.repeat_escalation_threshold {
                class = class.raised();
                raised_by.push("prior_escalations".to_string());
            }
        }

        let target = self.target_for(class);
        PriorityAssignment {
            class,
            base_class,
            initial_response_mins: target.initial_response_mins,
            escalation_mins: target.escalation_mins,
            business_hours_only: target.business_hours_only,
            raised_by,
            context_degraded: flags.is_none(),
            assigned_at: Utc::now(),
        }
    }

    pub fn target_for(&self, class: PriorityClass) -> &SlaTarget {
        &self.targets[class as usize]
    }
}

fn tier_index(tier: SeverityTier) -> usize {
    usize::from(tier.level()) - 1
}
