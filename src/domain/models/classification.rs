//! Classification domain model: category, severity tier and confidence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Issue category name as it appears in the rule tables.
pub type Category = String;

/// Category assigned when no classification rule matches.
pub const DEFAULT_CATEGORY: &str = "general";

/// Confidence assigned when no classification rule matches.
pub const DEFAULT_CONFIDENCE: f64 = 0.3;

/// Structural severity of an issue, independent of business context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SeverityTier {
    Tier1 = 1,
    Tier2 = 2,
    Tier3 = 3,
    Tier4 = 4,
}

impl SeverityTier {
    pub const ALL: [SeverityTier; 4] = [Self::Tier1, Self::Tier2, Self::Tier3, Self::Tier4];

    pub fn level(self) -> u8 {
        self as u8
    }

    /// Tier 4 bypasses automated delegation entirely.
    pub fn requires_human(self) -> bool {
        self == Self::Tier4
    }
}

impl TryFrom<u8> for SeverityTier {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Tier1),
            2 => Ok(Self::Tier2),
            3 => Ok(Self::Tier3),
            4 => Ok(Self::Tier4),
            other => Err(format!("severity tier must be 1-4, got {other}")),
        }
    }
}

impl From<SeverityTier> for u8 {
    fn from(tier: SeverityTier) -> Self {
        tier.level()
    }
}

impl std::fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tier-{}", self.level())
    }
}

/// Which hard-trigger rule forced a tier-4 classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HardTrigger {
    LegalThreat { keyword: String },
    SafetyRisk { keyword: String },
    HighValueRefund { amount: f64 },
    FlaggedIdentity { contact: String },
}

impl HardTrigger {
    pub fn describe(&self) -> String {
        match self {
            Self::LegalThreat { keyword } => format!("legal threat ({keyword})"),
            Self::SafetyRisk { keyword } => format!("safety risk ({keyword})"),
            Self::HighValueRefund { amount } => format!("high-value refund ({amount:.2})"),
            Self::FlaggedIdentity { contact } => format!("flagged identity ({contact})"),
        }
    }
}

/// Output of the classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: Category,
    pub tier: SeverityTier,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// Name of the table rule that produced the category, if any.
    #[serde(default)]
    pub matched_rule: Option<String>,
    #[serde(default)]
    pub hard_trigger: Option<HardTrigger>,
    /// Explicit escalation keyword found in the text.
    #[serde(default)]
    pub escalation_keyword: Option<String>,
    /// Normalized lead score for lead-category requests.
    #[serde(default)]
    pub lead_score: Option<f64>,
    pub classified_at: DateTime<Utc>,
}

impl Classification {
    /// The fallback classification for requests no rule recognises.
    pub fn fallback() -> Self {
        Self {
            category: DEFAULT_CATEGORY.to_string(),
            tier: SeverityTier::Tier1,
            confidence: DEFAULT_CONFIDENCE,
            matched_rule: None,
            hard_trigger: None,
            escalation_keyword: None,
            lead_score: None,
            classified_at: Utc::now(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.matched_rule.is_none() && self.hard_trigger.is_none()
    }
}
