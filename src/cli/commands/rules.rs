//! Rule table commands: validate a table file or show the active one.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::output::{or_dash, output, CommandOutput};
use crate::cli::table::{list_table, render_list};
use crate::domain::models::{Config, PriorityClass, RuleBook, SeverityTier};
use crate::infrastructure::config::ConfigLoader;

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommands,
}

#[derive(Subcommand, Debug)]
pub enum RulesCommands {
    /// Validate a rule table file (defaults to the configured table)
    Validate {
        /// Rule table YAML file
        path: Option<PathBuf>,
    },
    /// Show the tier, SLA and staffing tables
    Show {
        /// Rule table YAML file
        path: Option<PathBuf>,
    },
}

#[derive(Debug, serde::Serialize)]
pub struct RulesValidateOutput {
    pub source: String,
    pub valid: bool,
    pub classification_rules: usize,
    pub escalation_keywords: usize,
    pub capability_rules: usize,
}

impl CommandOutput for RulesValidateOutput {
    fn to_human(&self) -> String {
        format!(
            "Rule table {} is valid: {} classification rules, {} escalation keywords, {} capability rules.",
            self.source, self.classification_rules, self.escalation_keywords, self.capability_rules
        )
    }
}

#[derive(Debug, serde::Serialize)]
pub struct TierRow {
    pub tier: u8,
    pub priority: Option<PriorityClass>,
    pub initial_response_mins: Option<u64>,
    pub escalation_mins: Option<u64>,
    pub business_hours_only: bool,
    pub staffing_min: Option<usize>,
    pub staffing_max: Option<usize>,
}

#[derive(Debug, serde::Serialize)]
pub struct RulesShowOutput {
    pub source: String,
    pub tiers: Vec<TierRow>,
    #[serde(skip)]
    pub rules: RuleBook,
}

impl CommandOutput for RulesShowOutput {
    fn to_human(&self) -> String {
        let mut tiers = list_table(&["tier", "priority", "respond", "escalate", "hours", "staffing"]);
        for row in &self.tiers {
            let staffing = match (row.staffing_min, row.staffing_max) {
                (Some(min), Some(max)) => format!("{min}..{max}"),
                (Some(min), None) => format!("{min}.."),
                _ => "-".to_string(),
            };
            tiers.add_row(vec![
                format!("tier-{}", row.tier),
                or_dash(row.priority),
                or_dash(row.initial_response_mins.map(|m| format!("{m}m"))),
                or_dash(row.escalation_mins.map(|m| format!("{m}m"))),
                if row.business_hours_only { "business" } else { "24/7" }.to_string(),
                staffing,
            ]);
        }

        let mut capabilities = list_table(&["category", "specialists"]);
        for rule in &self.rules.capabilities {
            let roles: Vec<String> = rule.roles.iter().map(ToString::to_string).collect();
            capabilities.add_row(vec![rule.category.clone(), roles.join(", ")]);
        }

        format!(
            "Rule table: {}\n\n{}\n\n{}",
            self.source,
            render_list("tier", &tiers, self.tiers.len()),
            render_list("capability rule", &capabilities, self.rules.capabilities.len()),
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "source": self.source,
            "tiers": self.tiers,
            "rules": self.rules,
        })
    }
}

pub async fn execute(args: RulesArgs, config: &Config, json_mode: bool) -> Result<()> {
    match args.command {
        RulesCommands::Validate { path } => {
            let (source, rules) = load(path, config)?;
            output(
                &RulesValidateOutput {
                    source,
                    valid: true,
                    classification_rules: rules.classification.len(),
                    escalation_keywords: rules.escalation_keywords.len(),
                    capability_rules: rules.capabilities.len(),
                },
                json_mode,
            );
        }
        RulesCommands::Show { path } => {
            let (source, rules) = load(path, config)?;
            output(&show(source, rules), json_mode);
        }
    }
    Ok(())
}

fn load(path: Option<PathBuf>, config: &Config) -> Result<(String, RuleBook)> {
    match path {
        Some(path) => {
            let rules = RuleBook::load(&path)
                .with_context(|| format!("Rule table {} is invalid", path.display()))?;
            Ok((path.display().to_string(), rules))
        }
        None => {
            let source = config
                .rules_path
                .clone()
                .unwrap_or_else(|| "built-in".to_string());
            Ok((source, ConfigLoader::load_rules(config)?))
        }
    }
}

pub fn show(source: String, rules: RuleBook) -> RulesShowOutput {
    let tiers = SeverityTier::ALL
        .into_iter()
        .map(|tier| {
            let priority = rules.priority_for(tier);
            let target = priority.and_then(|class| rules.sla_for(class));
            let staffing = rules.staffing_for(tier);
            TierRow {
                tier: tier.level(),
                priority,
                initial_response_mins: target.map(|t| t.initial_response_mins),
                escalation_mins: target.map(|t| t.escalation_mins),
                business_hours_only: target.is_some_and(|t| t.business_hours_only),
                staffing_min: staffing.map(|s| s.min),
                staffing_max: staffing.and_then(|s| s.max),
            }
        })
        .collect();
    RulesShowOutput { source, tiers, rules }
}
