//! Weighted lead scoring for `lead`-category requests.
//!
//! Each signal is reduced to a value in [0, 1]; the score is the
//! weight-averaged sum, so it stays in [0, 1] whatever the configured
//! weights add up to.

use serde_json::Value;

use super::classifier::contains_phrase;
use crate::domain::models::rules::LeadScoringWeights;
use crate::domain::models::Metadata;

/// Budget at or above this amount saturates the budget signal.
pub const BUDGET_CEILING: f64 = 10_000.0;

/// Interaction count at or above this saturates the engagement signal.
pub const ENGAGEMENT_CEILING: f64 = 5.0;

const NEED_PHRASES: &[&str] = &[
    "need",
    "needs",
    "looking for",
    "require",
    "interested in",
    "quote",
    "pricing",
];

/// Per-signal breakdown, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LeadSignals {
    pub budget: f64,
    pub timeline: f64,
    pub authority: f64,
    pub need: f64,
    pub engagement: f64,
}

#[derive(Debug, Clone)]
pub struct LeadScorer {
    weights: LeadScoringWeights,
}

impl LeadScorer {
    pub fn new(weights: LeadScoringWeights) -> Self {
        Self { weights }
    }

    /// Extract signals from request metadata and text.
    pub fn signals(&self, raw_text: &str, metadata: &Metadata) -> LeadSignals {
        let budget = metadata
            .get("budget")
            .and_then(as_number)
            .map_or(0.0, |b| (b / BUDGET_CEILING).clamp(0.0, 1.0));

        let timeline = metadata
            .get("timeline")
            .and_then(Value::as_str)
            .map_or(0.0, timeline_signal);

        let authority = match metadata.get("decision_maker") {
            Some(Value::Bool(true)) => 1.0,
            _ => 0.0,
        };

        let lowered = raw_text.to_lowercase();
        let hits = NEED_PHRASES
            .iter()
            .filter(|phrase| contains_phrase(&lowered, phrase))
            .count();
        let need = (hits as f64 / 2.0).min(1.0);

        let engagement = metadata
            .get("interactions")
            .and_then(as_number)
            .map_or(0.0, |n| (n / ENGAGEMENT_CEILING).clamp(0.0, 1.0));

        LeadSignals {
            budget,
            timeline,
            authority,
            need,
            engagement,
        }
    }

    /// Normalized score in [0, 1]. Zero total weight scores zero.
    pub fn score(&self, raw_text: &str, metadata: &Metadata) -> f64 {
        let s = self.signals(raw_text, metadata);
        let w = &self.weights;
        let total = w.budget + w.timeline + w.authority + w.need + w.engagement;
        if total <= 0.0 {
            return 0.0;
        }
        let weighted = w.budget * s.budget
            + w.timeline * s.timeline
            + w.authority * s.authority
            + w.need * s.need
            + w.engagement * s.engagement;
        (weighted / total).clamp(0.0, 1.0)
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_start_matches('$').replace(',', "").parse().ok(),
        _ => None,
    }
}

fn timeline_signal(timeline: &str) -> f64 {
    match timeline.to_lowercase().as_str() {
        "immediate" | "asap" | "this_week" => 1.0,
        "this_month" | "month" => 0.7,
        "this_quarter" | "quarter" => 0.4,
        _ => 0.1,
    }
}
