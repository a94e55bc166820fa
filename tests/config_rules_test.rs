//! Project configuration and custom rule tables feeding the pipeline.

use std::path::Path;
use std::sync::Arc;

use serde_json::json;

use harmony::domain::models::{
    AssignmentStatus, Config, HardTrigger, Metadata, PriorityClass, RuleBook, SeverityTier,
};
use harmony::services::{CapacityRegistry, Classifier, DelegationPlanner};
use harmony::infrastructure::config::PROJECT_DIR;
use harmony::ConfigLoader;

fn custom_rules() -> String {
    RuleBook::builtin_yaml()
        .replace("refund_threshold: 1000.0", "refund_threshold: 100.0")
        .replace("flagged_identities: []", "flagged_identities: [\"fraud@example.com\"]")
        .replace(
            "{ tier: 2, priority: medium }",
            "{ tier: 2, priority: high }",
        )
}

fn write_project(dir: &Path, rules: &str) {
    let rules_path = dir.join("rules.yaml");
    std::fs::write(&rules_path, rules).unwrap();
    let project = dir.join(PROJECT_DIR);
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(
        project.join("config.yaml"),
        format!("rules_path: {}\nengine:\n  max_replans: 1\n", rules_path.display()),
    )
    .unwrap();
}

fn load_project(dir: &Path) -> (Config, RuleBook) {
    temp_env::with_vars_unset(["HARMONY_RULES_PATH", "HARMONY_ENGINE__MAX_REPLANS"], || {
        let config = ConfigLoader::load_from_dir(dir).unwrap();
        let rules = ConfigLoader::load_rules(&config).unwrap();
        (config, rules)
    })
}

#[test]
fn test_project_rule_table_changes_classification() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), &custom_rules());
    let (config, rules) = load_project(dir.path());
    assert_eq!(config.engine.max_replans, 1);

    let classifier = Classifier::new(Arc::new(rules)).unwrap();
    let mut metadata = Metadata::new();
    metadata.insert("refund_amount".into(), json!(250));
    let c = classifier.classify_text("Please refund the delivery fee", &metadata);
    assert_eq!(c.tier, SeverityTier::Tier4);
    assert!(matches!(c.hard_trigger, Some(HardTrigger::HighValueRefund { .. })));

    let builtin = Classifier::new(Arc::new(RuleBook::builtin().unwrap())).unwrap();
    let c = builtin.classify_text("Please refund the delivery fee", &metadata);
    assert_eq!(c.category, "billing");
    assert!(c.hard_trigger.is_none());
}

#[test]
fn test_flagged_identity_from_project_rules() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), &custom_rules());
    let (_, rules) = load_project(dir.path());

    let classifier = Classifier::new(Arc::new(rules)).unwrap();
    let mut metadata = Metadata::new();
    metadata.insert("contact".into(), json!("Fraud@Example.com"));
    let c = classifier.classify_text("Can I book a table?", &metadata);
    assert!(matches!(
        c.hard_trigger,
        Some(HardTrigger::FlaggedIdentity { ref contact }) if contact == "Fraud@Example.com"
    ));
}

#[test]
fn test_project_tier_mapping_and_max_replans() {
    let dir = tempfile::tempdir().unwrap();
    write_project(dir.path(), &custom_rules());
    let (config, rules) = load_project(dir.path());

    assert_eq!(rules.priority_for(SeverityTier::Tier2), Some(PriorityClass::High));

    let rules = Arc::new(rules);
    let capacity = Arc::new(CapacityRegistry::from_rules(&rules));
    let planner = DelegationPlanner::new(rules, capacity, config.engine.max_replans);
    let mut plan = planner.plan(uuid::Uuid::new_v4(), "booking", SeverityTier::Tier1);
    let failed = plan.assignments[0].id;
    plan.assignments[0].status = AssignmentStatus::Failed;
    planner.replan(&mut plan, "booking", &[failed]).unwrap();

    let next = plan.assignments.last().unwrap().id;
    plan.assignments.last_mut().unwrap().status = AssignmentStatus::Failed;
    assert!(planner.replan(&mut plan, "booking", &[next]).is_err());
}

#[test]
fn test_invalid_rule_table_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let broken = RuleBook::builtin_yaml().replace(
        "initial_response_mins: 30, escalation_mins: 60",
        "initial_response_mins: 90, escalation_mins: 60",
    );
    write_project(dir.path(), &broken);

    let result = temp_env::with_vars_unset(["HARMONY_RULES_PATH"], || {
        let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
        ConfigLoader::load_rules(&config)
    });
    let err = result.unwrap_err();
    assert!(format!("{err:#}").contains("must be before escalation"));
}

#[test]
fn test_env_selects_rule_table() {
    let dir = tempfile::tempdir().unwrap();
    let alt = dir.path().join("alt-rules.yaml");
    std::fs::write(&alt, custom_rules()).unwrap();

    let rules = temp_env::with_var("HARMONY_RULES_PATH", Some(alt.to_str().unwrap()), || {
        let config = ConfigLoader::load_from_dir(dir.path()).unwrap();
        assert_eq!(config.rules_path.as_deref(), alt.to_str());
        ConfigLoader::load_rules(&config).unwrap()
    });
    assert_eq!(rules.priority_for(SeverityTier::Tier2), Some(PriorityClass::High));
}
