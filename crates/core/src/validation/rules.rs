//! Validation rule, record, and actor types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::rule_config::RuleConfig;
use crate::error::CoreError;
use crate::types::{DbId, ScopeId, Timestamp};

/// A rule whose `target_model` is this value applies to every model.
pub const WILDCARD_MODEL: &str = "*";

/// AND-only map of field name to expected value.
pub type Conditions = Map<String, Value>;

// ── Severity ─────────────────────────────────────────────────────────

/// Ordered severity tier: `Info < Warning < Error < Critical`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [
        Severity::Info,
        Severity::Warning,
        Severity::Error,
        Severity::Critical,
    ];

    /// Stable string representation matching serde's `rename_all = "lowercase"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Whether a FAILED outcome at this severity blocks the operation.
    pub fn blocks(&self) -> bool {
        matches!(self, Self::Error | Self::Critical)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|sev| sev.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::Validation(format!("Unknown severity '{s}'")))
    }
}

// ── Rule type ────────────────────────────────────────────────────────

/// Closed set of rule types. Each has exactly one configuration shape.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Regex,
    Range,
    Length,
    Format,
    FileType,
    FileSize,
    Uniqueness,
    Relationship,
    BusinessRule,
    Custom,
}

impl RuleType {
    pub const ALL: [RuleType; 10] = [
        RuleType::Regex,
        RuleType::Range,
        RuleType::Length,
        RuleType::Format,
        RuleType::FileType,
        RuleType::FileSize,
        RuleType::Uniqueness,
        RuleType::Relationship,
        RuleType::BusinessRule,
        RuleType::Custom,
    ];

    /// Stable string representation matching serde's `rename_all = "snake_case"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Regex => "regex",
            Self::Range => "range",
            Self::Length => "length",
            Self::Format => "format",
            Self::FileType => "file_type",
            Self::FileSize => "file_size",
            Self::Uniqueness => "uniqueness",
            Self::Relationship => "relationship",
            Self::BusinessRule => "business_rule",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for RuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::Configuration(format!("Unknown rule type '{s}'")))
    }
}

// ── Operation ────────────────────────────────────────────────────────

/// The write operation a record is being validated for.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Create,
    Update,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

// ── Rule ─────────────────────────────────────────────────────────────

/// A persisted validation rule.
///
/// Rules are never hard-deleted; deactivation sets `is_active = false` so
/// historical outcomes keep a valid reference.
#[derive(Debug, Clone, Serialize)]
pub struct Rule {
    pub id: DbId,
    pub name: String,
    pub description: String,
    pub target_model: String,
    /// Empty for whole-record rules.
    pub target_field: String,
    /// Typed configuration; the variant determines the rule type.
    #[serde(flatten)]
    pub config: RuleConfig,
    pub error_message: String,
    pub severity: Severity,
    pub is_active: bool,
    pub apply_on_create: bool,
    pub apply_on_update: bool,
    pub conditions: Conditions,
    pub scope_id: ScopeId,
    pub created_by: Option<DbId>,
    /// Cached aggregate; reconcilable from the outcome log.
    pub total_checks: i64,
    /// Cached aggregate; reconcilable from the outcome log.
    pub total_failures: i64,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Rule {
    pub fn rule_type(&self) -> RuleType {
        self.config.rule_type()
    }

    /// Whole-record rule (no target field).
    pub fn is_model_level(&self) -> bool {
        self.target_field.is_empty()
    }

    pub fn applies_to_model(&self, model: &str) -> bool {
        self.target_model == WILDCARD_MODEL || self.target_model == model
    }

    pub fn applies_to_operation(&self, operation: Operation) -> bool {
        match operation {
            Operation::Create => self.apply_on_create,
            Operation::Update => self.apply_on_update,
        }
    }

    /// Whether the rule is eligible for a request in `scope`. A request
    /// without a scope sees every rule; a scoped request sees global rules
    /// plus that scope's own.
    pub fn in_scope(&self, scope: ScopeId) -> bool {
        match (scope, self.scope_id) {
            (None, _) | (_, None) => true,
            (Some(request), Some(rule)) => request == rule,
        }
    }
}

/// DTO for authoring a rule. `rule_config` is decoded against `rule_type`
/// before anything is persisted.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRule {
    pub name: String,
    pub description: Option<String>,
    pub rule_type: RuleType,
    pub target_model: String,
    pub target_field: Option<String>,
    #[serde(default)]
    pub rule_config: Value,
    pub error_message: String,
    pub severity: Option<Severity>,
    pub apply_on_create: Option<bool>,
    pub apply_on_update: Option<bool>,
    pub conditions: Option<Conditions>,
    pub scope_id: ScopeId,
}

/// DTO for updating a rule. All fields are optional; the rule type is fixed
/// at creation, so a new `rule_config` is decoded against the existing type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRule {
    pub description: Option<String>,
    pub rule_config: Option<Value>,
    pub error_message: Option<String>,
    pub severity: Option<Severity>,
    pub is_active: Option<bool>,
    pub apply_on_create: Option<bool>,
    pub apply_on_update: Option<bool>,
    pub conditions: Option<Conditions>,
}

/// A fully validated rule, ready to be inserted by a store.
#[derive(Debug, Clone)]
pub struct NewRule {
    pub name: String,
    pub description: String,
    pub target_model: String,
    pub target_field: String,
    pub config: RuleConfig,
    pub error_message: String,
    pub severity: Severity,
    pub is_active: bool,
    pub apply_on_create: bool,
    pub apply_on_update: bool,
    pub conditions: Conditions,
    pub scope_id: ScopeId,
    pub created_by: Option<DbId>,
}

/// A validated partial update. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct RulePatch {
    pub description: Option<String>,
    pub config: Option<RuleConfig>,
    pub error_message: Option<String>,
    pub severity: Option<Severity>,
    pub is_active: Option<bool>,
    pub apply_on_create: Option<bool>,
    pub apply_on_update: Option<bool>,
    pub conditions: Option<Conditions>,
}

/// Which scopes a rule listing covers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScopeFilter {
    /// Every rule regardless of scope.
    #[default]
    Any,
    /// Rules eligible for a request in this scope: global rules plus rules
    /// of the scope. `Applicable(None)` admits every rule.
    Applicable(ScopeId),
}

impl ScopeFilter {
    pub fn admits(&self, rule: &Rule) -> bool {
        match self {
            Self::Any => true,
            Self::Applicable(scope) => rule.in_scope(*scope),
        }
    }
}

/// Which rules a store should return.
#[derive(Debug, Clone, Default)]
pub struct RuleFilter {
    /// Rules targeting this model or the wildcard. `None` returns every model.
    pub target_model: Option<String>,
    pub scope: ScopeFilter,
    pub active_only: bool,
}

impl RuleFilter {
    /// Active rules eligible for `model` within `scope`.
    pub fn applicable(model: &str, scope: ScopeId) -> Self {
        Self {
            target_model: Some(model.to_string()),
            scope: ScopeFilter::Applicable(scope),
            active_only: true,
        }
    }

    pub fn admits(&self, rule: &Rule) -> bool {
        (!self.active_only || rule.is_active)
            && self
                .target_model
                .as_deref()
                .map_or(true, |model| rule.applies_to_model(model))
            && self.scope.admits(rule)
    }
}

// ── Record / Actor ───────────────────────────────────────────────────

/// A structured record submitted for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub model: String,
    /// Absent for records that have not been persisted yet.
    pub id: Option<DbId>,
    pub fields: Map<String, Value>,
    /// Fields changed by this write. `None` means every field is touched.
    #[serde(default)]
    pub touched_fields: Option<Vec<String>>,
}

impl Record {
    pub fn new(model: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            model: model.into(),
            id: None,
            fields,
            touched_fields: None,
        }
    }

    pub fn with_id(mut self, id: DbId) -> Self {
        self.id = Some(id);
        self
    }

    /// Restrict the touched-field set (typically for partial updates).
    pub fn touching<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.touched_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Attribute lookup. `id` resolves to the record id when not a field.
    pub fn get(&self, field: &str) -> Option<Value> {
        match self.fields.get(field) {
            Some(value) => Some(value.clone()),
            None if field == "id" => self.id.map(Value::from),
            None => None,
        }
    }

    pub fn touches(&self, field: &str) -> bool {
        match &self.touched_fields {
            None => true,
            Some(touched) => touched.iter().any(|f| f == field),
        }
    }

    /// The whole record as a JSON object, including `id` when known.
    pub fn to_value(&self) -> Value {
        let mut object = self.fields.clone();
        if let Some(id) = self.id {
            object.entry("id").or_insert_with(|| Value::from(id));
        }
        Value::Object(object)
    }
}

/// The identity performing an operation, as supplied by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Actor {
    pub id: DbId,
    #[serde(default)]
    pub is_admin: bool,
    /// Explicit grant to override failed validation outcomes.
    #[serde(default)]
    pub can_override_validations: bool,
    /// Export-control status, consulted by the `itar_compliance` business rule.
    #[serde(default = "default_true")]
    pub is_us_person: bool,
}

fn default_true() -> bool {
    true
}

impl Actor {
    pub fn new(id: DbId) -> Self {
        Self {
            id,
            is_admin: false,
            can_override_validations: false,
            is_us_person: true,
        }
    }

    pub fn admin(id: DbId) -> Self {
        Self {
            is_admin: true,
            ..Self::new(id)
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Critical);
    }

    #[test]
    fn only_error_and_critical_block() {
        assert!(!Severity::Info.blocks());
        assert!(!Severity::Warning.blocks());
        assert!(Severity::Error.blocks());
        assert!(Severity::Critical.blocks());
    }

    #[test]
    fn severity_parses_case_insensitively() {
        assert_eq!("CRITICAL".parse::<Severity>().unwrap(), Severity::Critical);
        assert_eq!("warning".parse::<Severity>().unwrap(), Severity::Warning);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn rule_type_round_trips_through_str() {
        for rule_type in RuleType::ALL {
            assert_eq!(rule_type.as_str().parse::<RuleType>().unwrap(), rule_type);
        }
        assert!("expression".parse::<RuleType>().is_err());
    }

    #[test]
    fn record_lookup_falls_back_to_id() {
        let record = Record::new("DesignAsset", Map::new()).with_id(7);
        assert_eq!(record.get("id"), Some(json!(7)));
        assert_eq!(record.get("name"), None);
    }

    #[test]
    fn record_touches_everything_by_default() {
        let record = Record::new("DesignAsset", Map::new());
        assert!(record.touches("part_number"));

        let partial = record.touching(["revision"]);
        assert!(partial.touches("revision"));
        assert!(!partial.touches("part_number"));
    }

    #[test]
    fn record_value_includes_id() {
        let mut fields = Map::new();
        fields.insert("name".into(), json!("bracket"));
        let record = Record::new("DesignAsset", fields).with_id(3);
        assert_eq!(record.to_value(), json!({"name": "bracket", "id": 3}));
    }
}
