//! Implementation of the `harmony classify` dry run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use uuid::Uuid;

use super::{metadata_from, parse_metadata_entry};
use crate::adapters::DirectoryContextProvider;
use crate::cli::output::{or_dash, output, CommandOutput};
use crate::cli::table::detail_table;
use crate::domain::models::{Config, ContextFlags, RuleBook};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{CapacityRegistry, Classifier, DelegationPlanner, PriorityResolver};

#[derive(Args, Debug)]
pub struct ClassifyArgs {
    /// Request text
    pub text: String,

    /// Metadata entries as key=value (repeatable)
    #[arg(short, long = "meta", value_parser = parse_metadata_entry)]
    pub metadata: Vec<(String, serde_json::Value)>,

    /// Treat the contact as a VIP
    #[arg(long)]
    pub vip: bool,

    /// Escalations previously opened for the contact
    #[arg(long, default_value = "0")]
    pub prior_escalations: u32,
}

#[derive(Debug, serde::Serialize)]
pub struct ClassifyOutput {
    pub category: String,
    pub tier: u8,
    pub confidence: f64,
    pub matched_rule: Option<String>,
    pub hard_trigger: Option<String>,
    pub escalation_keyword: Option<String>,
    pub lead_score: Option<f64>,
    pub priority: String,
    pub base_priority: String,
    pub raised_by: Vec<String>,
    pub initial_response_mins: u64,
    pub escalation_mins: u64,
    pub business_hours_only: bool,
    pub immediate_escalation: bool,
    pub roles: Vec<String>,
}

impl CommandOutput for ClassifyOutput {
    fn to_human(&self) -> String {
        let raised = if self.raised_by.is_empty() {
            String::new()
        } else {
            format!(" (raised from {} by {})", self.base_priority, self.raised_by.join(", "))
        };
        let delegation = if self.immediate_escalation {
            "none, immediate human escalation".to_string()
        } else {
            self.roles.join(", ")
        };
        let rows = [
            ("Category", self.category.clone()),
            ("Tier", format!("tier-{}", self.tier)),
            ("Confidence", format!("{:.2}", self.confidence)),
            ("Matched rule", or_dash(self.matched_rule.as_deref())),
            ("Hard trigger", or_dash(self.hard_trigger.as_deref())),
            ("Escalation keyword", or_dash(self.escalation_keyword.as_deref())),
            ("Lead score", or_dash(self.lead_score.map(|s| format!("{s:.2}")))),
            ("Priority", format!("{}{raised}", self.priority)),
            (
                "SLA",
                format!(
                    "respond within {}m, escalate after {}m{}",
                    self.initial_response_mins,
                    self.escalation_mins,
                    if self.business_hours_only { " (business hours)" } else { "" }
                ),
            ),
            ("Specialists", delegation),
        ];
        detail_table(&rows).to_string()
    }
}

pub async fn execute(args: ClassifyArgs, config: &Config, json_mode: bool) -> Result<()> {
    let rules = ConfigLoader::load_rules(config)?;
    let result = dry_run(&rules, config, args)?;
    output(&result, json_mode);
    Ok(())
}

/// Classify, prioritize and plan without dispatching anything.
pub fn dry_run(rules: &RuleBook, config: &Config, args: ClassifyArgs) -> Result<ClassifyOutput> {
    let metadata = metadata_from(args.metadata);
    let shared = Arc::new(rules.clone());

    let classifier = Classifier::new(shared.clone()).context("Failed to build classifier")?;
    let classification = classifier.classify_text(&args.text, &metadata);

    let resolver = PriorityResolver::new(
        rules,
        Arc::new(DirectoryContextProvider::new()),
        &config.vip_contacts,
        Duration::from_millis(config.engine.context_lookup_timeout_ms),
        config.engine.repeat_escalation_threshold,
    )
    .context("Failed to build priority resolver")?;
    let contact_is_vip = metadata
        .get("contact")
        .and_then(|v| v.as_str())
        .is_some_and(|c| config.vip_contacts.iter().any(|vip| vip.eq_ignore_ascii_case(c)));
    let flags = ContextFlags {
        vip: args.vip || contact_is_vip,
        prior_escalations: args.prior_escalations,
    };
    let priority = resolver.assign(classification.tier, Some(&flags));

    let planner = DelegationPlanner::new(
        shared,
        Arc::new(CapacityRegistry::from_rules(rules)),
        config.engine.max_replans,
    );
    let plan = planner.plan(Uuid::new_v4(), &classification.category, classification.tier);

    Ok(ClassifyOutput {
        category: classification.category,
        tier: classification.tier.level(),
        confidence: classification.confidence,
        matched_rule: classification.matched_rule,
        hard_trigger: classification.hard_trigger.map(|t| t.describe()),
        escalation_keyword: classification.escalation_keyword,
        lead_score: classification.lead_score,
        priority: priority.class.to_string(),
        base_priority: priority.base_class.to_string(),
        raised_by: priority.raised_by,
        initial_response_mins: priority.initial_response_mins,
        escalation_mins: priority.escalation_mins,
        business_hours_only: priority.business_hours_only,
        immediate_escalation: plan.immediate_escalation,
        roles: plan.roles().iter().map(|r| r.to_string()).collect(),
    })
}
