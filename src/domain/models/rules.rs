//! Declarative rule tables driving classification, priority and delegation.
//!
//! The tables are loaded from YAML so they can be audited and changed
//! without recompiling. A default table is embedded in the binary.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::classification::{Category, SeverityTier};
use super::delegation::SpecialistRole;
use super::priority::PriorityClass;

const BUILTIN_RULES: &str = include_str!("../../../rules/default_rules.yaml");

/// Rule table errors.
#[derive(Error, Debug)]
pub enum RuleBookError {
    #[error("Failed to read rule table {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse rule table: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("No priority mapping for {0}")]
    MissingTierPriority(SeverityTier),

    #[error("No staffing rule for {0}")]
    MissingStaffing(SeverityTier),

    #[error("No SLA targets for priority class {0}")]
    MissingSlaTarget(PriorityClass),

    #[error("SLA targets for {class}: initial response ({initial}m) must be before escalation ({escalation}m)")]
    DeadlineOrder {
        class: PriorityClass,
        initial: u64,
        escalation: u64,
    },

    #[error("Staffing rule for {tier}: {reason}")]
    InvalidStaffing { tier: SeverityTier, reason: String },

    #[error("Invalid pattern in rule '{rule}': {source}")]
    InvalidPattern {
        rule: String,
        #[source]
        source: regex::Error,
    },

    #[error("Refund threshold must be positive, got {0}")]
    InvalidRefundThreshold(f64),

    #[error("Rule table validation failed: {0}")]
    ValidationFailed(String),
}

/// Keyword/pattern set mapped to a category and base tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRule {
    pub name: String,
    pub category: Category,
    pub tier: SeverityTier,
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Regular expressions, matched case-insensitively.
    #[serde(default)]
    pub patterns: Vec<String>,
}

/// Matches that force tier 4 regardless of any other rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardTriggerRules {
    #[serde(default)]
    pub legal_keywords: Vec<String>,
    #[serde(default)]
    pub safety_keywords: Vec<String>,
    /// Words that mark a text as a refund request.
    #[serde(default)]
    pub refund_keywords: Vec<String>,
    /// Refunds strictly above this amount are hard triggers.
    pub refund_threshold: f64,
    /// Contacts that always go to a human.
    #[serde(default)]
    pub flagged_identities: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierPriority {
    pub tier: SeverityTier,
    pub priority: PriorityClass,
}

/// Response guarantees for one priority class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaTarget {
    pub class: PriorityClass,
    pub initial_response_mins: u64,
    pub escalation_mins: u64,
    /// The clock pauses outside business hours.
    #[serde(default)]
    pub business_hours_only: bool,
}

/// How many specialists a tier requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffingRule {
    pub tier: SeverityTier,
    pub min: usize,
    /// `None` means no upper bound.
    #[serde(default)]
    pub max: Option<usize>,
}

/// Ordered candidate roles for a category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRule {
    pub category: Category,
    pub roles: Vec<SpecialistRole>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleCapacity {
    pub role: SpecialistRole,
    pub max_concurrent: usize,
}

/// Point weights for lead scoring. Normalized by their sum at scoring time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LeadScoringWeights {
    pub budget: f64,
    pub timeline: f64,
    pub authority: f64,
    pub need: f64,
    pub engagement: f64,
}

impl Default for LeadScoringWeights {
    fn default() -> Self {
        Self {
            budget: 30.0,
            timeline: 20.0,
            authority: 20.0,
            need: 20.0,
            engagement: 10.0,
        }
    }
}

/// The complete set of rule tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleBook {
    pub classification: Vec<ClassificationRule>,
    pub hard_triggers: HardTriggerRules,
    /// Phrases that open a ticket even at tiers 1-3.
    #[serde(default)]
    pub escalation_keywords: Vec<String>,
    pub tier_priority: Vec<TierPriority>,
    pub sla_targets: Vec<SlaTarget>,
    pub staffing: Vec<StaffingRule>,
    pub capabilities: Vec<CapabilityRule>,
    #[serde(default)]
    pub role_capacity: Vec<RoleCapacity>,
    #[serde(default)]
    pub lead_scoring: LeadScoringWeights,
}

impl RuleBook {
    /// The rule table embedded in the binary.
    pub fn builtin() -> Result<Self, RuleBookError> {
        Self::from_yaml_str(BUILTIN_RULES)
    }

    /// Raw YAML of the embedded rule table.
    pub fn builtin_yaml() -> &'static str {
        BUILTIN_RULES
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, RuleBookError> {
        let rules: Self = serde_yaml::from_str(yaml)?;
        rules.validate()?;
        Ok(rules)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuleBookError> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path).map_err(|source| RuleBookError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<(), RuleBookError> {
        for tier in SeverityTier::ALL {
            if self.priority_for(tier).is_none() {
                return Err(RuleBookError::MissingTierPriority(tier));
            }
            let staffing = self
                .staffing_for(tier)
                .ok_or(RuleBookError::MissingStaffing(tier))?;
            if let Some(max) = staffing.max {
                if max < staffing.min {
                    return Err(RuleBookError::InvalidStaffing {
                        tier,
                        reason: format!("max ({max}) is below min ({})", staffing.min),
                    });
                }
            }
            if tier.requires_human() && (staffing.min != 0 || staffing.max != Some(0)) {
                return Err(RuleBookError::InvalidStaffing {
                    tier,
                    reason: "tier 4 must not delegate to specialists".to_string(),
                });
            }
            if !tier.requires_human() && staffing.min == 0 {
                return Err(RuleBookError::InvalidStaffing {
                    tier,
                    reason: "at least one specialist is required".to_string(),
                });
            }
        }

        for class in PriorityClass::ALL {
            let target = self
                .sla_for(class)
                .ok_or(RuleBookError::MissingSlaTarget(class))?;
            if target.initial_response_mins >= target.escalation_mins {
                return Err(RuleBookError::DeadlineOrder {
                    class,
                    initial: target.initial_response_mins,
                    escalation: target.escalation_mins,
                });
            }
        }

        for rule in &self.classification {
            if rule.keywords.is_empty() && rule.patterns.is_empty() {
                return Err(RuleBookError::ValidationFailed(format!(
                    "rule '{}' has neither keywords nor patterns",
                    rule.name
                )));
            }
            for pattern in &rule.patterns {
                regex::Regex::new(pattern).map_err(|source| RuleBookError::InvalidPattern {
                    rule: rule.name.clone(),
                    source,
                })?;
            }
        }

        if self.hard_triggers.refund_threshold <= 0.0 {
            return Err(RuleBookError::InvalidRefundThreshold(
                self.hard_triggers.refund_threshold,
            ));
        }

        let mut seen = HashSet::new();
        for capability in &self.capabilities {
            if !seen.insert(capability.category.as_str()) {
                return Err(RuleBookError::ValidationFailed(format!(
                    "duplicate capability entry for category '{}'",
                    capability.category
                )));
            }
        }

        Ok(())
    }

    pub fn priority_for(&self, tier: SeverityTier) -> Option<PriorityClass> {
        self.tier_priority
            .iter()
            .find(|entry| entry.tier == tier)
            .map(|entry| entry.priority)
    }

    pub fn sla_for(&self, class: PriorityClass) -> Option<&SlaTarget> {
        self.sla_targets.iter().find(|target| target.class == class)
    }

    pub fn staffing_for(&self, tier: SeverityTier) -> Option<&StaffingRule> {
        self.staffing.iter().find(|rule| rule.tier == tier)
    }

    /// Candidate roles for a category, in preference order.
    pub fn candidates_for(&self, category: &str) -> &[SpecialistRole] {
        self.capabilities
            .iter()
            .find(|capability| capability.category == category)
            .map_or(&[], |capability| capability.roles.as_slice())
    }

    /// Concurrent-assignment limit for a role; `None` is unlimited.
    pub fn capacity_for(&self, role: SpecialistRole) -> Option<usize> {
        self.role_capacity
            .iter()
            .find(|entry| entry.role == role)
            .map(|entry| entry.max_concurrent)
    }
}
