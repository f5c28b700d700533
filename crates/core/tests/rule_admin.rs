//! Integration tests for rule authoring: config checks at create time,
//! name uniqueness per scope, soft deactivation, and cache invalidation.

mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use enginel_core::error::CoreError;
use enginel_core::validation::validators::ValidatorRegistry;
use enginel_core::validation::{
    Operation, OutcomeStatus, RuleConfig, RuleFilter, ScopeFilter, Severity, UpdateRule,
};
use serde_json::{json, Value};

use common::*;

fn regex_rule(name: &str) -> Value {
    json!({
        "name": name,
        "rule_type": "regex",
        "target_model": "DesignAsset",
        "target_field": "part_number",
        "rule_config": {"pattern": "[A-Z0-9-]+"},
        "error_message": "Part number must be uppercase",
    })
}

#[tokio::test]
async fn defaults_are_applied_on_create() {
    let h = harness();
    let rule = create_rule(&h.engine, regex_rule("pn_format")).await;
    assert!(rule.is_active);
    assert!(rule.apply_on_create && rule.apply_on_update);
    assert_eq!(rule.severity, Severity::Error);
    assert!(rule.conditions.is_empty());
    assert_eq!(rule.created_by, Some(1));
    assert_eq!(rule.total_checks, 0);
}

#[tokio::test]
async fn malformed_config_is_rejected_before_persistence() {
    let h = harness();
    let mut bad = regex_rule("pn_format");
    bad["rule_config"] = json!({"pattern": "([A-Z"});

    let result = h.engine.create_rule(rule_input(bad), &admin()).await;
    assert_matches!(result, Err(CoreError::Configuration(_)));
    assert!(h
        .engine
        .list_rules(&RuleFilter::default())
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn config_must_match_rule_type() {
    let h = harness();
    let mut mismatched = regex_rule("pn_format");
    mismatched["rule_type"] = json!("range");

    let result = h.engine.create_rule(rule_input(mismatched), &admin()).await;
    assert_matches!(result, Err(CoreError::Configuration(_)));
}

#[tokio::test]
async fn field_rules_need_a_target_field() {
    let h = harness();
    let mut whole_record = regex_rule("pn_format");
    whole_record["target_field"] = json!("");

    let result = h.engine.create_rule(rule_input(whole_record), &admin()).await;
    assert_matches!(result, Err(CoreError::Configuration(msg)) if msg.contains("target_field"));
}

#[tokio::test]
async fn unregistered_custom_predicate_is_rejected() {
    let input = json!({
        "name": "custom_check",
        "rule_type": "custom",
        "target_model": "DesignAsset",
        "rule_config": {"predicate": "has_owner"},
        "error_message": "custom",
    });

    let h = harness();
    assert_matches!(
        h.engine.create_rule(rule_input(input.clone()), &admin()).await,
        Err(CoreError::Configuration(_))
    );

    fn has_owner(value: &Value) -> bool {
        value.get("owner_id").is_some_and(|v| !v.is_null())
    }
    let h = harness_with(
        test_config(),
        ValidatorRegistry::new().with_custom("has_owner", has_owner),
    );
    let rule = h.engine.create_rule(rule_input(input), &admin()).await.unwrap();
    assert_matches!(rule.config, RuleConfig::Custom(_));

    let result = h
        .engine
        .evaluate(&asset(json!({"name": "x"})), Operation::Create, &engineer(), None)
        .await
        .unwrap();
    assert_eq!(result.outcomes[0].outcome.status, OutcomeStatus::Failed);
}

#[tokio::test]
async fn names_are_unique_per_scope() {
    let h = harness();
    create_rule(&h.engine, regex_rule("pn_format")).await;

    assert_matches!(
        h.engine
            .create_rule(rule_input(regex_rule("pn_format")), &admin())
            .await,
        Err(CoreError::Conflict(_))
    );

    let mut scoped = regex_rule("pn_format");
    scoped["scope_id"] = json!(3);
    assert!(h.engine.create_rule(rule_input(scoped), &admin()).await.is_ok());
}

#[tokio::test]
async fn only_admins_manage_rules() {
    let h = harness();
    assert_matches!(
        h.engine
            .create_rule(rule_input(regex_rule("pn_format")), &engineer())
            .await,
        Err(CoreError::PermissionDenied(_))
    );
}

#[tokio::test]
async fn update_decodes_config_against_existing_type() {
    let h = harness();
    let rule = create_rule(&h.engine, regex_rule("pn_format")).await;

    let bad = UpdateRule {
        rule_config: Some(json!({"min": 1})),
        ..Default::default()
    };
    assert_matches!(
        h.engine.update_rule(rule.id, bad, &admin()).await,
        Err(CoreError::Configuration(_))
    );

    let good = UpdateRule {
        rule_config: Some(json!({"pattern": "[a-z]+"})),
        severity: Some(Severity::Warning),
        ..Default::default()
    };
    let updated = h.engine.update_rule(rule.id, good, &admin()).await.unwrap();
    assert_eq!(updated.severity, Severity::Warning);

    let result = h
        .engine
        .evaluate(&asset(json!({"part_number": "lower"})), Operation::Create, &engineer(), None)
        .await
        .unwrap();
    assert_eq!(result.outcomes[0].outcome.status, OutcomeStatus::Passed);
}

#[tokio::test]
async fn update_missing_rule_is_not_found() {
    let h = harness();
    assert_matches!(
        h.engine
            .update_rule(404, UpdateRule::default(), &admin())
            .await,
        Err(CoreError::NotFound { id: 404, .. })
    );
}

#[tokio::test]
async fn deactivated_rules_stop_applying_but_keep_history() {
    let h = harness();
    let rule = create_rule(&h.engine, regex_rule("pn_format")).await;
    let record = asset(json!({"part_number": "lower"}));

    let before = h
        .engine
        .evaluate(&record, Operation::Create, &engineer(), None)
        .await
        .unwrap();
    assert!(!before.accepted);

    let deactivated = h.engine.deactivate_rule(rule.id, &admin()).await.unwrap();
    assert!(!deactivated.is_active);

    let after = h
        .engine
        .evaluate(&record, Operation::Create, &engineer(), None)
        .await
        .unwrap();
    assert!(after.accepted);
    assert!(after.outcomes.is_empty());

    // Earlier outcomes still resolve to the rule.
    let old = h
        .engine
        .get_outcome(before.outcomes[0].outcome.id)
        .await
        .unwrap();
    let owner = h.engine.get_rule(old.rule_id).await.unwrap();
    assert_eq!(owner.name, "pn_format");

    let active = h
        .engine
        .list_rules(&RuleFilter {
            active_only: true,
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(active.is_empty());
}

#[tokio::test]
async fn list_rules_filters_by_model_and_scope() {
    let h = harness();
    create_rule(&h.engine, regex_rule("global_pn")).await;
    let mut scoped = regex_rule("tenant_pn");
    scoped["scope_id"] = json!(9);
    create_rule(&h.engine, scoped).await;
    let mut project = regex_rule("project_code");
    project["target_model"] = json!("Project");
    create_rule(&h.engine, project).await;

    let all = h.engine.list_rules(&RuleFilter::default()).await.unwrap();
    assert_eq!(all.len(), 3);

    let for_tenant = h
        .engine
        .list_rules(&RuleFilter {
            target_model: Some("DesignAsset".to_string()),
            scope: ScopeFilter::Applicable(Some(9)),
            active_only: false,
        })
        .await
        .unwrap();
    assert_eq!(for_tenant.len(), 2);

    let unscoped = h
        .engine
        .list_rules(&RuleFilter::applicable("DesignAsset", None))
        .await
        .unwrap();
    assert_eq!(unscoped.len(), 2);

    let other_tenant = h
        .engine
        .list_rules(&RuleFilter::applicable("DesignAsset", Some(3)))
        .await
        .unwrap();
    assert_eq!(other_tenant.len(), 1);
    assert_eq!(other_tenant[0].name, "global_pn");
}

#[tokio::test]
async fn rule_edits_are_visible_immediately_with_caching_enabled() {
    let mut config = test_config();
    config.rule_cache_ttl = Duration::from_secs(300);
    let h = harness_with(config, ValidatorRegistry::new());
    let record = asset(json!({"part_number": "lower"}));

    let empty = h
        .engine
        .evaluate(&record, Operation::Create, &engineer(), None)
        .await
        .unwrap();
    assert!(empty.outcomes.is_empty());

    let rule = create_rule(&h.engine, regex_rule("pn_format")).await;
    let blocked = h
        .engine
        .evaluate(&record, Operation::Create, &engineer(), None)
        .await
        .unwrap();
    assert!(!blocked.accepted);

    h.engine.deactivate_rule(rule.id, &admin()).await.unwrap();
    let accepted = h
        .engine
        .evaluate(&record, Operation::Create, &engineer(), None)
        .await
        .unwrap();
    assert!(accepted.accepted);
}
