//! Models for validation rules and the outcome log.
//!
//! Rows keep enum-like columns as `TEXT`; conversion into the core domain
//! types happens in the `TryFrom` impls, where an unreadable stored value
//! is an internal error rather than a caller mistake.

use enginel_core::error::CoreError;
use enginel_core::types::{DbId, Timestamp};
use enginel_core::validation::outcome::OutcomeWithRule;
use enginel_core::validation::rules::{Conditions, NewRule, RulePatch};
use enginel_core::validation::{Outcome, OutcomeStatus, Rule, RuleConfig, RuleType, Severity};
use serde::Serialize;
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

// ── Validation Rules ─────────────────────────────────────────────────

/// A row from the `validation_rules` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ValidationRuleRow {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub rule_type: String,
    pub target_model: String,
    pub target_field: String,
    pub rule_config: Value,
    pub error_message: String,
    pub severity: String,
    pub is_active: bool,
    pub apply_on_create: bool,
    pub apply_on_update: bool,
    pub conditions: Value,
    pub scope_id: Option<DbId>,
    pub created_by: Option<DbId>,
    pub total_checks: i64,
    pub total_failures: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl TryFrom<ValidationRuleRow> for Rule {
    type Error = CoreError;

    fn try_from(row: ValidationRuleRow) -> Result<Self, Self::Error> {
        let corrupt = |what: &str, detail: String| {
            CoreError::Internal(format!("validation_rules.{what} of rule {}: {detail}", row.id))
        };
        let rule_type: RuleType = row
            .rule_type
            .parse()
            .map_err(|e: CoreError| corrupt("rule_type", e.to_string()))?;
        let config = RuleConfig::decode(rule_type, row.rule_config.clone())
            .map_err(|e| corrupt("rule_config", e.to_string()))?;
        let severity: Severity = row
            .severity
            .parse()
            .map_err(|e: CoreError| corrupt("severity", e.to_string()))?;
        let conditions = match row.conditions.clone() {
            Value::Object(map) => map,
            other => return Err(corrupt("conditions", format!("expected object, got {other}"))),
        };

        Ok(Rule {
            id: row.id,
            name: row.name,
            description: row.description,
            target_model: row.target_model,
            target_field: row.target_field,
            config,
            error_message: row.error_message,
            severity,
            is_active: row.is_active,
            apply_on_create: row.apply_on_create,
            apply_on_update: row.apply_on_update,
            conditions,
            scope_id: row.scope_id,
            created_by: row.created_by,
            total_checks: row.total_checks,
            total_failures: row.total_failures,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// DTO for inserting a validation rule. Built from an already-validated
/// [`NewRule`].
#[derive(Debug, Clone)]
pub struct CreateValidationRule {
    pub name: String,
    pub description: String,
    pub rule_type: &'static str,
    pub target_model: String,
    pub target_field: String,
    pub rule_config: Value,
    pub error_message: String,
    pub severity: &'static str,
    pub is_active: bool,
    pub apply_on_create: bool,
    pub apply_on_update: bool,
    pub conditions: Value,
    pub scope_id: Option<DbId>,
    pub created_by: Option<DbId>,
}

impl TryFrom<NewRule> for CreateValidationRule {
    type Error = CoreError;

    fn try_from(rule: NewRule) -> Result<Self, Self::Error> {
        Ok(Self {
            rule_type: rule.config.rule_type().as_str(),
            rule_config: rule.config.config_value()?,
            name: rule.name,
            description: rule.description,
            target_model: rule.target_model,
            target_field: rule.target_field,
            error_message: rule.error_message,
            severity: rule.severity.as_str(),
            is_active: rule.is_active,
            apply_on_create: rule.apply_on_create,
            apply_on_update: rule.apply_on_update,
            conditions: conditions_value(rule.conditions),
            scope_id: rule.scope_id,
            created_by: rule.created_by,
        })
    }
}

/// DTO for updating a validation rule. All fields are optional.
#[derive(Debug, Clone, Default)]
pub struct UpdateValidationRule {
    pub description: Option<String>,
    pub rule_config: Option<Value>,
    pub error_message: Option<String>,
    pub severity: Option<&'static str>,
    pub is_active: Option<bool>,
    pub apply_on_create: Option<bool>,
    pub apply_on_update: Option<bool>,
    pub conditions: Option<Value>,
}

impl TryFrom<RulePatch> for UpdateValidationRule {
    type Error = CoreError;

    fn try_from(patch: RulePatch) -> Result<Self, Self::Error> {
        Ok(Self {
            rule_config: patch.config.map(|c| c.config_value()).transpose()?,
            description: patch.description,
            error_message: patch.error_message,
            severity: patch.severity.map(|s| s.as_str()),
            is_active: patch.is_active,
            apply_on_create: patch.apply_on_create,
            apply_on_update: patch.apply_on_update,
            conditions: patch.conditions.map(conditions_value),
        })
    }
}

fn conditions_value(conditions: Conditions) -> Value {
    Value::Object(conditions)
}

// ── Validation Outcomes ──────────────────────────────────────────────

/// A row from the `validation_outcomes` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ValidationOutcomeRow {
    pub id: DbId,
    pub evaluation_id: Uuid,
    pub rule_id: DbId,
    pub target_model: String,
    pub target_id: Option<DbId>,
    pub target_field: String,
    pub status: String,
    pub error_message: String,
    pub details: Value,
    pub validated_by: Option<DbId>,
    pub validated_at: Timestamp,
    pub was_blocked: bool,
    pub was_overridden: bool,
    pub override_reason: Option<String>,
    pub override_by: Option<DbId>,
    pub override_at: Option<Timestamp>,
}

impl TryFrom<ValidationOutcomeRow> for Outcome {
    type Error = CoreError;

    fn try_from(row: ValidationOutcomeRow) -> Result<Self, Self::Error> {
        let status: OutcomeStatus = row.status.parse()?;
        Ok(Outcome {
            id: row.id,
            evaluation_id: row.evaluation_id,
            rule_id: row.rule_id,
            target_model: row.target_model,
            target_id: row.target_id,
            target_field: row.target_field,
            status,
            error_message: row.error_message,
            details: row.details,
            validated_by: row.validated_by,
            validated_at: row.validated_at,
            was_blocked: row.was_blocked,
            was_overridden: row.was_overridden,
            override_reason: row.override_reason,
            override_by: row.override_by,
            override_at: row.override_at,
        })
    }
}

/// An outcome row joined with the rule attributes reports group by.
#[derive(Debug, Clone, FromRow)]
pub struct OutcomeReportRow {
    #[sqlx(flatten)]
    pub outcome: ValidationOutcomeRow,
    pub rule_name: String,
    pub rule_severity: String,
    pub rule_type: String,
    pub rule_scope_id: Option<DbId>,
}

impl TryFrom<OutcomeReportRow> for OutcomeWithRule {
    type Error = CoreError;

    fn try_from(row: OutcomeReportRow) -> Result<Self, Self::Error> {
        let severity: Severity = row
            .rule_severity
            .parse()
            .map_err(|e: CoreError| CoreError::Internal(e.to_string()))?;
        let rule_type: RuleType = row
            .rule_type
            .parse()
            .map_err(|e: CoreError| CoreError::Internal(e.to_string()))?;
        Ok(OutcomeWithRule {
            outcome: row.outcome.try_into()?,
            rule_name: row.rule_name,
            severity,
            rule_type,
            scope_id: row.rule_scope_id,
        })
    }
}
