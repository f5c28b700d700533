//! Validator registry: one typed check per rule type.
//!
//! Field-level validators are pure functions of the configuration and the
//! value. UNIQUENESS, RELATIONSHIP, and business rules additionally read the
//! [`RecordStore`]. A validator that cannot evaluate its input returns a
//! [`ValidatorError`], which the engine records as an ERROR outcome.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use serde_json::Value;
use validator::{ValidateEmail, ValidateUrl};

use super::business_rules;
use super::conditions::values_equal;
use super::rule_config::{
    CustomConfig, FileSizeConfig, FileTypeConfig, FormatConfig, FormatKind, LengthConfig,
    RangeConfig, RegexConfig, RelationshipConfig, RuleConfig,
};
use super::rules::{Actor, Record, Rule};
use super::store::RecordStore;
use crate::error::CoreError;
use crate::types::DbId;

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?1?\d{9,15}$").expect("valid regex"));

/// A pure, pre-registered predicate over the target value.
pub type CustomPredicate = fn(&Value) -> bool;

/// The validator ran to completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Passed,
    /// The value violates the rule; carries a human-readable detail.
    Failed(String),
}

/// The validator could not evaluate its input.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ValidatorError {
    #[error("Field '{0}' is missing from the record")]
    MissingField(String),

    #[error("Expected {expected}, found {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Lookup failed: {0}")]
    Lookup(String),

    #[error("Unusable configuration: {0}")]
    Config(String),

    #[error("Custom predicate '{0}' is not registered")]
    UnknownPredicate(String),

    #[error("Validator timed out after {0} ms")]
    Timeout(u64),

    #[error("Validator panicked")]
    Panicked,
}

impl ValidatorError {
    /// Short machine-readable tag stored in the outcome details.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingField(_) => "missing_field",
            Self::WrongType { .. } => "wrong_type",
            Self::Lookup(_) => "lookup",
            Self::Config(_) => "config",
            Self::UnknownPredicate(_) => "unknown_predicate",
            Self::Timeout(_) => "timeout",
            Self::Panicked => "panicked",
        }
    }
}

impl From<CoreError> for ValidatorError {
    fn from(err: CoreError) -> Self {
        Self::Lookup(err.to_string())
    }
}

/// Dispatches a rule to its validator.
///
/// Built-in validators are fixed; the only extension point is the table of
/// named CUSTOM predicates.
#[derive(Clone, Default)]
pub struct ValidatorRegistry {
    custom: HashMap<String, CustomPredicate>,
}

impl fmt::Debug for ValidatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.custom.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("ValidatorRegistry")
            .field("custom", &names)
            .finish()
    }
}

impl ValidatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named CUSTOM predicate. Re-registering a name replaces it.
    pub fn register_custom(&mut self, name: impl Into<String>, predicate: CustomPredicate) {
        self.custom.insert(name.into(), predicate);
    }

    pub fn with_custom(mut self, name: impl Into<String>, predicate: CustomPredicate) -> Self {
        self.register_custom(name, predicate);
        self
    }

    pub fn has_custom(&self, name: &str) -> bool {
        self.custom.contains_key(name)
    }

    /// Authoring-time checks that depend on the registry itself.
    pub fn check_config(&self, config: &RuleConfig) -> Result<(), CoreError> {
        if let RuleConfig::Custom(c) = config {
            if !self.has_custom(&c.predicate) {
                return Err(CoreError::Configuration(format!(
                    "custom: predicate '{}' is not registered",
                    c.predicate
                )));
            }
        }
        Ok(())
    }

    /// Run the validator for `rule` against `record`.
    pub async fn validate(
        &self,
        rule: &Rule,
        record: &Record,
        actor: &Actor,
        records: &dyn RecordStore,
    ) -> Result<Verdict, ValidatorError> {
        let value = target_value(rule, record)?;

        // Nothing to check on an explicit null.
        if value.is_null() && rule.config.requires_field() {
            return Ok(Verdict::Passed);
        }

        match &rule.config {
            RuleConfig::Regex(c) => check_regex(c, &value),
            RuleConfig::Range(c) => check_range(c, &value),
            RuleConfig::Length(c) => check_length(c, &value),
            RuleConfig::Format(c) => check_format(c, &value),
            RuleConfig::FileType(c) => check_file_type(c, &value),
            RuleConfig::FileSize(c) => check_file_size(c, &value),
            RuleConfig::Uniqueness(_) => check_uniqueness(rule, record, &value, records).await,
            RuleConfig::Relationship(c) => check_relationship(c, &value, records).await,
            RuleConfig::BusinessRule(c) => business_rules::evaluate(c, record, actor, records).await,
            RuleConfig::Custom(c) => self.check_custom(c, &value),
        }
    }

    fn check_custom(&self, config: &CustomConfig, value: &Value) -> Result<Verdict, ValidatorError> {
        let predicate = self
            .custom
            .get(&config.predicate)
            .ok_or_else(|| ValidatorError::UnknownPredicate(config.predicate.clone()))?;
        if predicate(value) {
            Ok(Verdict::Passed)
        } else {
            Ok(Verdict::Failed(format!(
                "predicate '{}' rejected the value",
                config.predicate
            )))
        }
    }
}

/// The field value, or the whole record for model-level rules.
fn target_value(rule: &Rule, record: &Record) -> Result<Value, ValidatorError> {
    if rule.is_model_level() {
        return Ok(record.to_value());
    }
    record
        .get(&rule.target_field)
        .ok_or_else(|| ValidatorError::MissingField(rule.target_field.clone()))
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn wrong_type(expected: &'static str, value: &Value) -> ValidatorError {
    ValidatorError::WrongType {
        expected,
        found: type_name(value),
    }
}

fn check_regex(config: &RegexConfig, value: &Value) -> Result<Verdict, ValidatorError> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        other => return Err(wrong_type("string", other)),
    };
    let matcher = config
        .matcher()
        .map_err(|e| ValidatorError::Config(e.to_string()))?;
    if matcher.is_match(&text) {
        Ok(Verdict::Passed)
    } else {
        Ok(Verdict::Failed(format!(
            "'{text}' does not match pattern '{}'",
            config.pattern
        )))
    }
}

/// A number, or a string holding one.
pub(crate) fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

fn check_range(config: &RangeConfig, value: &Value) -> Result<Verdict, ValidatorError> {
    let number = as_number(value).ok_or_else(|| wrong_type("number", value))?;

    if let Some(min) = config.min {
        let below = if config.inclusive { number < min } else { number <= min };
        if below {
            return Ok(Verdict::Failed(format!(
                "{number} is below the minimum {min}{}",
                if config.inclusive { "" } else { " (exclusive)" }
            )));
        }
    }
    if let Some(max) = config.max {
        let above = if config.inclusive { number > max } else { number >= max };
        if above {
            return Ok(Verdict::Failed(format!(
                "{number} is above the maximum {max}{}",
                if config.inclusive { "" } else { " (exclusive)" }
            )));
        }
    }
    Ok(Verdict::Passed)
}

fn check_length(config: &LengthConfig, value: &Value) -> Result<Verdict, ValidatorError> {
    let len = match value {
        Value::String(s) => s.chars().count() as u64,
        Value::Array(items) => items.len() as u64,
        other => return Err(wrong_type("string or array", other)),
    };
    if let Some(min) = config.min.filter(|&min| len < min) {
        return Ok(Verdict::Failed(format!("length {len} is below the minimum {min}")));
    }
    if let Some(max) = config.max.filter(|&max| len > max) {
        return Ok(Verdict::Failed(format!("length {len} exceeds the maximum {max}")));
    }
    Ok(Verdict::Passed)
}

fn check_format(config: &FormatConfig, value: &Value) -> Result<Verdict, ValidatorError> {
    let text = value.as_str().ok_or_else(|| wrong_type("string", value))?;
    let valid = match config.kind {
        FormatKind::Email => text.validate_email(),
        FormatKind::Url => text.validate_url(),
        FormatKind::Phone => {
            let digits: String = text.chars().filter(|c| *c != '-' && *c != ' ').collect();
            PHONE_RE.is_match(&digits)
        }
        FormatKind::Date => is_iso_date(text),
    };
    if valid {
        Ok(Verdict::Passed)
    } else {
        Ok(Verdict::Failed(format!(
            "'{text}' is not a valid {}",
            config.kind.as_str()
        )))
    }
}

/// ISO-8601 date, naive datetime, or RFC 3339 timestamp.
fn is_iso_date(text: &str) -> bool {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || DateTime::parse_from_rfc3339(text).is_ok()
}

/// A file name, or a file descriptor object carrying `name`/`filename`.
fn file_name(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map
            .get("name")
            .or_else(|| map.get("filename"))
            .and_then(Value::as_str),
        _ => None,
    }
}

fn check_file_type(config: &FileTypeConfig, value: &Value) -> Result<Verdict, ValidatorError> {
    let name = file_name(value).ok_or_else(|| wrong_type("file name", value))?;
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let extension = match base.rfind('.') {
        Some(idx) if idx + 1 < base.len() => base[idx..].to_lowercase(),
        _ => return Ok(Verdict::Failed(format!("'{base}' has no file extension"))),
    };
    if config.allowed_types.iter().any(|allowed| *allowed == extension) {
        Ok(Verdict::Passed)
    } else {
        Ok(Verdict::Failed(format!(
            "extension '{extension}' is not one of {}",
            config.allowed_types.join(", ")
        )))
    }
}

fn check_file_size(config: &FileSizeConfig, value: &Value) -> Result<Verdict, ValidatorError> {
    let size_value = match value {
        Value::Object(map) => map.get("size").ok_or_else(|| wrong_type("file size", value))?,
        other => other,
    };
    let size = size_value
        .as_u64()
        .ok_or_else(|| wrong_type("non-negative integer", size_value))?;
    if let Some(min) = config.min_size.filter(|&min| size < min) {
        return Ok(Verdict::Failed(format!("{size} bytes is below the minimum {min}")));
    }
    if let Some(max) = config.max_size.filter(|&max| size > max) {
        return Ok(Verdict::Failed(format!("{size} bytes exceeds the maximum {max}")));
    }
    Ok(Verdict::Passed)
}

/// Integer id held by a value, accepting numeric strings.
pub(crate) fn as_id(value: &Value) -> Option<DbId> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whether a fetched record is the record under validation.
pub(crate) fn is_same_record(candidate: &Value, record: &Record) -> bool {
    match (record.id, candidate.get("id").and_then(as_id)) {
        (Some(own), Some(other)) => own == other,
        _ => false,
    }
}

async fn check_uniqueness(
    rule: &Rule,
    record: &Record,
    value: &Value,
    records: &dyn RecordStore,
) -> Result<Verdict, ValidatorError> {
    let matches = records
        .filter_by_field(&record.model, &rule.target_field, value)
        .await?;
    let duplicates = matches
        .iter()
        .filter(|candidate| !is_same_record(candidate, record))
        .filter(|candidate| {
            candidate
                .get(&rule.target_field)
                .is_some_and(|other| values_equal(other, value))
        })
        .count();
    if duplicates == 0 {
        Ok(Verdict::Passed)
    } else {
        Ok(Verdict::Failed(format!(
            "{duplicates} other {} record(s) share {} = {value}",
            record.model, rule.target_field
        )))
    }
}

async fn check_relationship(
    config: &RelationshipConfig,
    value: &Value,
    records: &dyn RecordStore,
) -> Result<Verdict, ValidatorError> {
    let id = as_id(value).ok_or_else(|| wrong_type("record id", value))?;
    if records.exists(&config.related_model, id).await? {
        Ok(Verdict::Passed)
    } else {
        Ok(Verdict::Failed(format!(
            "{} {id} does not exist",
            config.related_model
        )))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use chrono::Utc;
    use serde_json::{json, Map};

    use super::*;
    use crate::validation::memory::MemoryRecordStore;
    use crate::validation::rules::{RuleType, Severity};

    fn make_rule(rule_type: RuleType, field: &str, config: Value) -> Rule {
        let now = Utc::now();
        Rule {
            id: 1,
            name: "test_rule".to_string(),
            description: String::new(),
            target_model: "DesignAsset".to_string(),
            target_field: field.to_string(),
            config: RuleConfig::decode(rule_type, config).unwrap(),
            error_message: "invalid".to_string(),
            severity: Severity::Error,
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

    fn data(pairs: Value) -> Record {
        match pairs {
            Value::Object(map) => Record::new("DesignAsset", map),
            _ => Record::new("DesignAsset", Map::new()),
        }
    }

    async fn run(rule: &Rule, record: &Record) -> Result<Verdict, ValidatorError> {
        let records = MemoryRecordStore::new();
        ValidatorRegistry::new()
            .validate(rule, record, &Actor::new(1), &records)
            .await
    }

    // -- regex --

    #[tokio::test]
    async fn regex_requires_full_match() {
        let rule = make_rule(RuleType::Regex, "part_number", json!({"pattern": "[A-Z0-9-]+"}));
        assert_eq!(
            run(&rule, &data(json!({"part_number": "AB-100"}))).await.unwrap(),
            Verdict::Passed
        );
        assert_matches!(
            run(&rule, &data(json!({"part_number": "AB-100x"}))).await,
            Ok(Verdict::Failed(_))
        );
    }

    #[tokio::test]
    async fn regex_stringifies_numbers() {
        let rule = make_rule(RuleType::Regex, "revision", json!({"pattern": "\\d+"}));
        assert_eq!(
            run(&rule, &data(json!({"revision": 12}))).await.unwrap(),
            Verdict::Passed
        );
    }

    #[tokio::test]
    async fn regex_on_object_is_an_error() {
        let rule = make_rule(RuleType::Regex, "meta", json!({"pattern": ".*"}));
        assert_matches!(
            run(&rule, &data(json!({"meta": {"a": 1}}))).await,
            Err(ValidatorError::WrongType { found: "object", .. })
        );
    }

    #[tokio::test]
    async fn missing_field_is_an_error() {
        let rule = make_rule(RuleType::Regex, "part_number", json!({"pattern": ".*"}));
        assert_matches!(
            run(&rule, &data(json!({}))).await,
            Err(ValidatorError::MissingField(field)) if field == "part_number"
        );
    }

    #[tokio::test]
    async fn null_value_passes() {
        let rule = make_rule(RuleType::Range, "mass_kg", json!({"min": 1}));
        assert_eq!(
            run(&rule, &data(json!({"mass_kg": null}))).await.unwrap(),
            Verdict::Passed
        );
    }

    // -- range --

    #[tokio::test]
    async fn range_bounds() {
        let rule = make_rule(RuleType::Range, "qty", json!({"min": 0, "max": 100}));
        assert_eq!(run(&rule, &data(json!({"qty": 100}))).await.unwrap(), Verdict::Passed);
        assert_eq!(run(&rule, &data(json!({"qty": "42"}))).await.unwrap(), Verdict::Passed);
        assert_matches!(run(&rule, &data(json!({"qty": 150}))).await, Ok(Verdict::Failed(_)));
        assert_matches!(run(&rule, &data(json!({"qty": -1}))).await, Ok(Verdict::Failed(_)));
    }

    #[tokio::test]
    async fn range_exclusive_bounds() {
        let rule = make_rule(
            RuleType::Range,
            "qty",
            json!({"min": 0, "max": 100, "inclusive": false}),
        );
        assert_matches!(run(&rule, &data(json!({"qty": 100}))).await, Ok(Verdict::Failed(_)));
        assert_matches!(run(&rule, &data(json!({"qty": 0}))).await, Ok(Verdict::Failed(_)));
        assert_eq!(run(&rule, &data(json!({"qty": 50}))).await.unwrap(), Verdict::Passed);
    }

    #[tokio::test]
    async fn range_non_numeric_is_an_error() {
        let rule = make_rule(RuleType::Range, "qty", json!({"min": 0, "max": 100}));
        assert_matches!(
            run(&rule, &data(json!({"qty": "abc"}))).await,
            Err(ValidatorError::WrongType { expected: "number", .. })
        );
        assert_matches!(
            run(&rule, &data(json!({"qty": true}))).await,
            Err(ValidatorError::WrongType { .. })
        );
    }

    // -- length --

    #[tokio::test]
    async fn length_counts_chars_and_elements() {
        let rule = make_rule(RuleType::Length, "name", json!({"min": 2, "max": 4}));
        assert_eq!(run(&rule, &data(json!({"name": "ñañá"}))).await.unwrap(), Verdict::Passed);
        assert_matches!(run(&rule, &data(json!({"name": "a"}))).await, Ok(Verdict::Failed(_)));
        assert_eq!(run(&rule, &data(json!({"name": [1, 2, 3]}))).await.unwrap(), Verdict::Passed);
        assert_matches!(
            run(&rule, &data(json!({"name": [1, 2, 3, 4, 5]}))).await,
            Ok(Verdict::Failed(_))
        );
        assert_matches!(
            run(&rule, &data(json!({"name": 12}))).await,
            Err(ValidatorError::WrongType { .. })
        );
    }

    // -- format --

    #[tokio::test]
    async fn format_email_and_url() {
        let email = make_rule(RuleType::Format, "contact", json!({"type": "email"}));
        assert_eq!(
            run(&email, &data(json!({"contact": "eng@example.com"}))).await.unwrap(),
            Verdict::Passed
        );
        assert_matches!(
            run(&email, &data(json!({"contact": "not-an-email"}))).await,
            Ok(Verdict::Failed(_))
        );

        let url = make_rule(RuleType::Format, "link", json!({"type": "url"}));
        assert_eq!(
            run(&url, &data(json!({"link": "https://example.com/a"}))).await.unwrap(),
            Verdict::Passed
        );
        assert_matches!(
            run(&url, &data(json!({"link": "example dot com"}))).await,
            Ok(Verdict::Failed(_))
        );
    }

    #[tokio::test]
    async fn format_phone_ignores_separators() {
        let rule = make_rule(RuleType::Format, "phone", json!({"type": "phone"}));
        assert_eq!(
            run(&rule, &data(json!({"phone": "+1 555-123-4567"}))).await.unwrap(),
            Verdict::Passed
        );
        assert_matches!(
            run(&rule, &data(json!({"phone": "12-34"}))).await,
            Ok(Verdict::Failed(_))
        );
    }

    #[tokio::test]
    async fn format_date() {
        let rule = make_rule(RuleType::Format, "released", json!({"type": "date"}));
        for ok in ["2024-02-29", "2024-02-29T10:00:00", "2024-02-29T10:00:00Z"] {
            assert_eq!(
                run(&rule, &data(json!({"released": ok}))).await.unwrap(),
                Verdict::Passed,
                "{ok}"
            );
        }
        assert_matches!(
            run(&rule, &data(json!({"released": "2023-02-29"}))).await,
            Ok(Verdict::Failed(_))
        );
    }

    // -- files --

    #[tokio::test]
    async fn file_type_is_case_insensitive() {
        let rule = make_rule(
            RuleType::FileType,
            "file",
            json!({"allowed_types": [".step", ".stp"]}),
        );
        assert_eq!(
            run(&rule, &data(json!({"file": "models/Bracket.STEP"}))).await.unwrap(),
            Verdict::Passed
        );
        assert_eq!(
            run(&rule, &data(json!({"file": {"name": "a.stp", "size": 10}}))).await.unwrap(),
            Verdict::Passed
        );
        assert_matches!(
            run(&rule, &data(json!({"file": "bracket.stl"}))).await,
            Ok(Verdict::Failed(_))
        );
        assert_matches!(
            run(&rule, &data(json!({"file": "README"}))).await,
            Ok(Verdict::Failed(msg)) if msg.contains("no file extension")
        );
    }

    #[tokio::test]
    async fn file_size_bounds() {
        let rule = make_rule(
            RuleType::FileSize,
            "file",
            json!({"min_size": 1, "max_size": 1024}),
        );
        assert_eq!(
            run(&rule, &data(json!({"file": {"name": "a.step", "size": 512}}))).await.unwrap(),
            Verdict::Passed
        );
        assert_matches!(
            run(&rule, &data(json!({"file": 4096}))).await,
            Ok(Verdict::Failed(_))
        );
        assert_matches!(
            run(&rule, &data(json!({"file": -3}))).await,
            Err(ValidatorError::WrongType { .. })
        );
    }

    // -- store-backed --

    #[tokio::test]
    async fn uniqueness_excludes_own_record() {
        let records = MemoryRecordStore::new();
        records
            .insert("DesignAsset", 1, json!({"id": 1, "part_number": "AB-1"}))
            .await;
        let rule = make_rule(RuleType::Uniqueness, "part_number", Value::Null);
        let registry = ValidatorRegistry::new();
        let actor = Actor::new(1);

        let same = data(json!({"part_number": "AB-1"})).with_id(1);
        assert_eq!(
            registry.validate(&rule, &same, &actor, &records).await.unwrap(),
            Verdict::Passed
        );

        let other = data(json!({"part_number": "AB-1"}));
        assert_matches!(
            registry.validate(&rule, &other, &actor, &records).await,
            Ok(Verdict::Failed(_))
        );
    }

    #[tokio::test]
    async fn relationship_requires_existing_record() {
        let records = MemoryRecordStore::new();
        records.insert("Project", 7, json!({"id": 7})).await;
        let rule = make_rule(
            RuleType::Relationship,
            "project_id",
            json!({"related_model": "Project"}),
        );
        let registry = ValidatorRegistry::new();
        let actor = Actor::new(1);

        let ok = data(json!({"project_id": 7}));
        assert_eq!(
            registry.validate(&rule, &ok, &actor, &records).await.unwrap(),
            Verdict::Passed
        );
        let dangling = data(json!({"project_id": "8"}));
        assert_matches!(
            registry.validate(&rule, &dangling, &actor, &records).await,
            Ok(Verdict::Failed(msg)) if msg.contains("Project 8")
        );
        let garbage = data(json!({"project_id": "eight"}));
        assert_matches!(
            registry.validate(&rule, &garbage, &actor, &records).await,
            Err(ValidatorError::WrongType { .. })
        );
    }

    // -- custom --

    fn is_even(value: &Value) -> bool {
        value.as_i64().is_some_and(|n| n % 2 == 0)
    }

    #[tokio::test]
    async fn custom_predicates_must_be_registered() {
        let rule = make_rule(RuleType::Custom, "count", json!({"predicate": "is_even"}));
        let record = data(json!({"count": 3}));
        let records = MemoryRecordStore::new();
        let actor = Actor::new(1);

        let empty = ValidatorRegistry::new();
        assert_matches!(
            empty.check_config(&rule.config),
            Err(CoreError::Configuration(_))
        );
        assert_matches!(
            empty.validate(&rule, &record, &actor, &records).await,
            Err(ValidatorError::UnknownPredicate(_))
        );

        let registry = ValidatorRegistry::new().with_custom("is_even", is_even);
        assert!(registry.check_config(&rule.config).is_ok());
        assert_matches!(
            registry.validate(&rule, &record, &actor, &records).await,
            Ok(Verdict::Failed(_))
        );
        let even = data(json!({"count": 4}));
        assert_eq!(
            registry.validate(&rule, &even, &actor, &records).await.unwrap(),
            Verdict::Passed
        );
    }
}
