//! Rule selection and the accept/block decision. Pure logic, no I/O.

use serde::Serialize;
use uuid::Uuid;

use super::outcome::{Outcome, OutcomeStatus};
use super::rules::{Operation, Record, Rule, Severity};
use crate::types::{DbId, ScopeId};

/// Select the rules that apply to `record` for `operation` within `scope`,
/// in evaluation order.
///
/// A rule applies when it is active, targets the record's model (or every
/// model), is whole-record or targets a touched field, is enabled for the
/// operation, and is global or belongs to `scope`. Without a scope every
/// rule qualifies.
pub fn select_rules(
    rules: &[Rule],
    record: &Record,
    operation: Operation,
    scope: ScopeId,
) -> Vec<Rule> {
    let mut selected: Vec<Rule> = rules
        .iter()
        .filter(|r| r.is_active)
        .filter(|r| r.applies_to_model(&record.model))
        .filter(|r| r.is_model_level() || record.touches(&r.target_field))
        .filter(|r| r.applies_to_operation(operation))
        .filter(|r| r.in_scope(scope))
        .cloned()
        .collect();
    order_rules(&mut selected);
    selected
}

/// Severity descending, then creation time ascending, then id.
///
/// Order affects result order only; every selected rule is evaluated.
pub fn order_rules(rules: &mut [Rule]) {
    rules.sort_by(|a, b| {
        b.severity
            .cmp(&a.severity)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.id.cmp(&b.id))
    });
}

/// An outcome annotated with the rule attributes callers display.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluatedOutcome {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub rule_name: String,
    pub severity: Severity,
}

impl EvaluatedOutcome {
    /// FAILED at a blocking severity, before any bypass.
    pub fn is_blocking_failure(&self) -> bool {
        self.outcome.status == OutcomeStatus::Failed && self.severity.blocks()
    }
}

/// The decision for one evaluate call, with every outcome it recorded.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub evaluation_id: Uuid,
    pub accepted: bool,
    pub outcomes: Vec<EvaluatedOutcome>,
}

impl EvaluationResult {
    pub fn empty(evaluation_id: Uuid) -> Self {
        Self {
            evaluation_id,
            accepted: true,
            outcomes: Vec::new(),
        }
    }

    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.status == status)
            .count()
    }

    /// FAILED outcomes suitable for field-level display. ERROR outcomes are
    /// administrator diagnostics and are excluded.
    pub fn user_facing_failures(&self) -> Vec<FieldFailure> {
        self.outcomes
            .iter()
            .filter(|o| o.outcome.status == OutcomeStatus::Failed)
            .map(FieldFailure::from)
            .collect()
    }

    /// Turn a blocked decision into an error carrying the blocking failures.
    pub fn ensure_accepted(&self) -> Result<(), BlockedOperation> {
        if self.accepted {
            return Ok(());
        }
        Err(BlockedOperation {
            evaluation_id: self.evaluation_id,
            failures: self
                .outcomes
                .iter()
                .filter(|o| o.outcome.was_blocked)
                .map(FieldFailure::from)
                .collect(),
        })
    }
}

/// A single failure for display next to its field.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FieldFailure {
    pub rule_id: DbId,
    pub rule_name: String,
    /// Empty for whole-record rules.
    pub field: String,
    pub message: String,
    pub severity: Severity,
}

impl From<&EvaluatedOutcome> for FieldFailure {
    fn from(o: &EvaluatedOutcome) -> Self {
        Self {
            rule_id: o.outcome.rule_id,
            rule_name: o.rule_name.clone(),
            field: o.outcome.target_field.clone(),
            message: o.outcome.error_message.clone(),
            severity: o.severity,
        }
    }
}

/// The engine decided the operation must not proceed. The engine never
/// prevents the write itself; callers surface this to the user.
#[derive(Debug, Clone, thiserror::Error)]
#[error("Operation blocked by {} failed validation rule(s)", failures.len())]
pub struct BlockedOperation {
    pub evaluation_id: Uuid,
    pub failures: Vec<FieldFailure>,
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use serde_json::{json, Map, Value};

    use super::*;
    use crate::validation::rule_config::RuleConfig;
    use crate::validation::rules::RuleType;

    fn make_rule(id: i64, field: &str, severity: Severity) -> Rule {
        let now = Utc::now();
        Rule {
            id,
            name: format!("rule_{id}"),
            description: String::new(),
            target_model: "DesignAsset".to_string(),
            target_field: field.to_string(),
            config: RuleConfig::decode(RuleType::Regex, json!({"pattern": ".+"})).unwrap(),
            error_message: format!("rule {id} failed"),
            severity,
            is_active: true,
            apply_on_create: true,
            apply_on_update: true,
            conditions: Map::new(),
            scope_id: None,
            created_by: None,
            total_checks: 0,
            total_failures: 0,
            created_at: now,
            updated_at: now,
        }
    }

    fn record() -> Record {
        let fields = match json!({"part_number": "A", "revision": "B"}) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Record::new("DesignAsset", fields)
    }

    fn ids(rules: &[Rule]) -> Vec<i64> {
        rules.iter().map(|r| r.id).collect()
    }

    #[test]
    fn filters_inactive_and_other_models() {
        let mut inactive = make_rule(1, "part_number", Severity::Error);
        inactive.is_active = false;
        let mut other_model = make_rule(2, "part_number", Severity::Error);
        other_model.target_model = "Project".to_string();
        let mut wildcard = make_rule(3, "", Severity::Info);
        wildcard.target_model = "*".to_string();

        let selected = select_rules(
            &[inactive, other_model, wildcard],
            &record(),
            Operation::Create,
            None,
        );
        assert_eq!(ids(&selected), vec![3]);
    }

    #[test]
    fn filters_by_operation_flag() {
        let mut create_only = make_rule(1, "part_number", Severity::Error);
        create_only.apply_on_update = false;
        let rules = [create_only];
        assert_eq!(select_rules(&rules, &record(), Operation::Create, None).len(), 1);
        assert!(select_rules(&rules, &record(), Operation::Update, None).is_empty());
    }

    #[test]
    fn filters_untouched_fields() {
        let rules = [
            make_rule(1, "part_number", Severity::Error),
            make_rule(2, "revision", Severity::Error),
            make_rule(3, "", Severity::Error),
        ];
        let partial = record().touching(["revision"]);
        assert_eq!(
            ids(&select_rules(&rules, &partial, Operation::Update, None)),
            vec![2, 3]
        );
    }

    #[test]
    fn scope_selection() {
        let global = make_rule(1, "part_number", Severity::Error);
        let mut tenant_a = make_rule(2, "part_number", Severity::Error);
        tenant_a.scope_id = Some(10);
        let mut tenant_b = make_rule(3, "part_number", Severity::Error);
        tenant_b.scope_id = Some(20);
        let rules = [global, tenant_a, tenant_b];

        assert_eq!(
            ids(&select_rules(&rules, &record(), Operation::Create, None)),
            vec![1, 2, 3]
        );
        assert_eq!(
            ids(&select_rules(&rules, &record(), Operation::Create, Some(10))),
            vec![1, 2]
        );
        assert_eq!(
            ids(&select_rules(&rules, &record(), Operation::Create, Some(30))),
            vec![1]
        );
    }

    #[test]
    fn orders_by_severity_then_age() {
        let now = Utc::now();
        let mut old_warning = make_rule(1, "part_number", Severity::Warning);
        old_warning.created_at = now - Duration::days(2);
        let mut new_error = make_rule(2, "part_number", Severity::Error);
        new_error.created_at = now;
        let mut old_error = make_rule(3, "part_number", Severity::Error);
        old_error.created_at = now - Duration::days(1);
        let mut critical = make_rule(4, "part_number", Severity::Critical);
        critical.created_at = now;

        let selected = select_rules(
            &[old_warning, new_error, old_error, critical],
            &record(),
            Operation::Create,
            None,
        );
        assert_eq!(ids(&selected), vec![4, 3, 2, 1]);
    }
}
