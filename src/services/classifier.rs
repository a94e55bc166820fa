//! Rule-table classifier.
//!
//! Classification never fails: a request no rule recognises gets the
//! `general` / tier-1 fallback so it still enters the pipeline.

use std::sync::Arc;

use chrono::Utc;
use regex::{Regex, RegexBuilder};
use serde_json::Value;

use super::lead_scoring::LeadScorer;
use crate::domain::models::rules::ClassificationRule;
use crate::domain::models::{
    Classification, HardTrigger, Metadata, RuleBook, RuleBookError, ServiceRequest, SeverityTier,
};

const BASE_CONFIDENCE: f64 = 0.5;
const CONFIDENCE_STEP: f64 = 0.1;
const MAX_RULE_CONFIDENCE: f64 = 0.95;

const AMOUNT_PATTERN: &str = r"(?:[$€£]\s?(\d[\d,]*(?:\.\d+)?))|(?:(\d[\d,]*(?:\.\d+)?)\s?(?:usd|dollars|eur|euros|gbp|pounds)\b)";

struct CompiledRule {
    keywords: Vec<String>,
    patterns: Vec<Regex>,
}

impl CompiledRule {
    fn compile(rule: &ClassificationRule) -> Result<Self, RuleBookError> {
        let patterns = rule
            .patterns
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| RuleBookError::InvalidPattern {
                        rule: rule.name.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            keywords: rule.keywords.iter().map(|k| k.to_lowercase()).collect(),
            patterns,
        })
    }

    fn hits(&self, lowered: &str) -> usize {
        let keyword_hits = self
            .keywords
            .iter()
            .filter(|keyword| contains_phrase(lowered, keyword))
            .count();
        let pattern_hits = self.patterns.iter().filter(|re| re.is_match(lowered)).count();
        keyword_hits + pattern_hits
    }
}

/// Assigns category, severity tier and confidence from the rule tables.
pub struct Classifier {
    rules: Arc<RuleBook>,
    compiled: Vec<CompiledRule>,
    amount: Regex,
    lead_scorer: LeadScorer,
}

impl Classifier {
    pub fn new(rules: Arc<RuleBook>) -> Result<Self, RuleBookError> {
        let compiled = rules
            .classification
            .iter()
            .map(CompiledRule::compile)
            .collect::<Result<Vec<_>, _>>()?;
        let amount = RegexBuilder::new(AMOUNT_PATTERN)
            .case_insensitive(true)
            .build()
            .map_err(|source| RuleBookError::InvalidPattern {
                rule: "amount".to_string(),
                source,
            })?;
        let lead_scorer = LeadScorer::new(rules.lead_scoring);
        Ok(Self {
            rules,
            compiled,
            amount,
            lead_scorer,
        })
    }

    pub fn classify(&self, request: &ServiceRequest) -> Classification {
        self.classify_text(&request.raw_text, &request.metadata)
    }

    pub fn classify_text(&self, raw_text: &str, metadata: &Metadata) -> Classification {
        let lowered = raw_text.to_lowercase();

        let best = self
            .compiled
            .iter()
            .zip(&self.rules.classification)
            .map(|(compiled, rule)| (compiled.hits(&lowered), rule))
            .filter(|(hits, _)| *hits > 0)
            .fold(None::<(usize, &ClassificationRule)>, |best, (hits, rule)| {
                match best {
                    Some((best_hits, best_rule))
                        if best_hits > hits
                            || (best_hits == hits && best_rule.tier >= rule.tier) =>
                    {
                        Some((best_hits, best_rule))
                    }
                    _ => Some((hits, rule)),
                }
            });

        let mut classification = match best {
            Some((hits, rule)) => Classification {
                category: rule.category.clone(),
                tier: rule.tier,
                confidence: (BASE_CONFIDENCE + CONFIDENCE_STEP * (hits - 1) as f64)
                    .min(MAX_RULE_CONFIDENCE),
                matched_rule: Some(rule.name.clone()),
                hard_trigger: None,
                escalation_keyword: None,
                lead_score: None,
                classified_at: Utc::now(),
            },
            None => Classification::fallback(),
        };

        if let Some(trigger) = self.hard_trigger(&lowered, metadata) {
            classification.tier = SeverityTier::Tier4;
            classification.confidence = 1.0;
            classification.hard_trigger = Some(trigger);
        }

        classification.escalation_keyword = self
            .rules
            .escalation_keywords
            .iter()
            .find(|phrase| contains_phrase(&lowered, &phrase.to_lowercase()))
            .cloned();

        if classification.category == "lead" {
            classification.lead_score = Some(self.lead_scorer.score(raw_text, metadata));
        }

        tracing::debug!(
            category = %classification.category,
            tier = %classification.tier,
            confidence = classification.confidence,
            fallback = classification.is_fallback(),
            "Classified request"
        );

        classification
    }

    fn hard_trigger(&self, lowered: &str, metadata: &Metadata) -> Option<HardTrigger> {
        let triggers = &self.rules.hard_triggers;

        if let Some(keyword) = first_phrase(lowered, &triggers.legal_keywords) {
            return Some(HardTrigger::LegalThreat { keyword });
        }
        if let Some(keyword) = first_phrase(lowered, &triggers.safety_keywords) {
            return Some(HardTrigger::SafetyRisk { keyword });
        }
        if first_phrase(lowered, &triggers.refund_keywords).is_some() {
            if let Some(amount) = self.refund_amount(lowered, metadata) {
                if amount > triggers.refund_threshold {
                    return Some(HardTrigger::HighValueRefund { amount });
                }
            }
        }
        if let Some(contact) = metadata.get("contact").and_then(Value::as_str) {
            if triggers
                .flagged_identities
                .iter()
                .any(|flagged| flagged.eq_ignore_ascii_case(contact))
            {
                return Some(HardTrigger::FlaggedIdentity {
                    contact: contact.to_string(),
                });
            }
        }
        None
    }

    /// Explicit `refund_amount` metadata wins over amounts found in the text.
    fn refund_amount(&self, lowered: &str, metadata: &Metadata) -> Option<f64> {
        if let Some(amount) = metadata.get("refund_amount").and_then(|v| match v {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.replace(',', "").trim().parse().ok(),
            _ => None,
        }) {
            return Some(amount);
        }
        self.amount
            .captures_iter(lowered)
            .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
            .filter_map(|m| m.as_str().replace(',', "").parse::<f64>().ok())
            .fold(None, |max: Option<f64>, amount| {
                Some(max.map_or(amount, |m| m.max(amount)))
            })
    }
}

fn first_phrase(lowered: &str, phrases: &[String]) -> Option<String> {
    phrases
        .iter()
        .find(|phrase| contains_phrase(lowered, &phrase.to_lowercase()))
        .cloned()
}

/// Whole-word containment: `court` matches "see you in court" but not
/// "courtesy".
pub(super) fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    haystack.match_indices(phrase).any(|(start, _)| {
        let end = start + phrase.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classifier() -> Classifier {
        Classifier::new(Arc::new(RuleBook::builtin().unwrap())).unwrap()
    }

    fn classify(text: &str) -> Classification {
        classifier().classify_text(text, &Metadata::new())
    }

    #[test]
    fn test_no_match_falls_back_to_general() {
        let c = classify("Just wanted to say hi");
        assert_eq!(c.category, "general");
        assert_eq!(c.tier, SeverityTier::Tier1);
        assert!((c.confidence - 0.3).abs() < f64::EPSILON);
        assert!(c.is_fallback());
    }

    #[test]
    fn test_empty_text_falls_back() {
        let c = classify("");
        assert!(c.is_fallback());
    }

    #[test]
    fn test_keyword_rule_sets_category_and_tier() {
        let c = classify("I was charged twice on my last invoice");
        assert_eq!(c.category, "billing");
        assert_eq!(c.tier, SeverityTier::Tier2);
        assert!((c.confidence - 0.6).abs() < 1e-9);
        assert_eq!(c.matched_rule.as_deref(), Some("billing-dispute"));
    }

    #[test]
    fn test_pattern_rule_matches_case_insensitively() {
        let c = classify("Getting a 503 ERROR everywhere, site down for 3 hours");
        assert_eq!(c.category, "outage");
        assert_eq!(c.tier, SeverityTier::Tier3);
    }

    #[test]
    fn test_legal_keyword_forces_tier_four() {
        let c = classify("Your invoice is wrong and I will take legal action");
        assert_eq!(c.tier, SeverityTier::Tier4);
        assert_eq!(c.category, "billing");
        assert_eq!(c.confidence, 1.0);
        assert!(matches!(
            c.hard_trigger,
            Some(HardTrigger::LegalThreat { ref keyword }) if keyword == "legal action"
        ));
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let c = classify("Thanks for the courtesy call about my appointment");
        assert!(c.hard_trigger.is_none());
        assert_eq!(c.category, "booking");
    }

    #[test]
    fn test_refund_above_threshold_is_hard_trigger() {
        let c = classify("I want a refund of $2,500 now");
        assert_eq!(c.tier, SeverityTier::Tier4);
        assert!(matches!(
            c.hard_trigger,
            Some(HardTrigger::HighValueRefund { amount }) if (amount - 2500.0).abs() < 1e-9
        ));

        let small = classify("I want a refund of $40");
        assert_eq!(small.tier, SeverityTier::Tier2);
        assert!(small.hard_trigger.is_none());
    }

    #[test]
    fn test_refund_amount_metadata_overrides_text() {
        let mut metadata = Metadata::new();
        metadata.insert("refund_amount".into(), json!(1500));
        let c = classifier().classify_text("please process my refund", &metadata);
        assert_eq!(c.tier, SeverityTier::Tier4);
    }

    #[test]
    fn test_flagged_identity_is_hard_trigger() {
        let mut rules = RuleBook::builtin().unwrap();
        rules.hard_triggers.flagged_identities = vec!["ceo@bigcorp.com".into()];
        let classifier = Classifier::new(Arc::new(rules)).unwrap();
        let mut metadata = Metadata::new();
        metadata.insert("contact".into(), json!("CEO@bigcorp.com"));
        let c = classifier.classify_text("How do I reset my password?", &metadata);
        assert_eq!(c.tier, SeverityTier::Tier4);
        assert!(matches!(c.hard_trigger, Some(HardTrigger::FlaggedIdentity { .. })));
    }

    #[test]
    fn test_ties_go_to_higher_tier() {
        // one billing hit (tier 2), one booking hit (tier 1)
        let c = classify("billing question about my appointment");
        assert_eq!(c.category, "billing");
    }

    #[test]
    fn test_escalation_keyword_does_not_change_tier() {
        let c = classify("The app has a bug, let me speak to a manager");
        assert_eq!(c.tier, SeverityTier::Tier2);
        assert_eq!(c.escalation_keyword.as_deref(), Some("speak to a manager"));
    }

    #[test]
    fn test_lead_category_gets_score() {
        let c = classify("Interested in pricing for a demo");
        assert_eq!(c.category, "lead");
        let score = c.lead_score.unwrap();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_contains_phrase_boundaries() {
        assert!(contains_phrase("see you in court.", "court"));
        assert!(!contains_phrase("courtesy", "court"));
        assert!(contains_phrase("legal action!", "legal action"));
        assert!(!contains_phrase("anything", ""));
    }
}
