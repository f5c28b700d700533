//! Typed rule configuration.
//!
//! Every rule type has exactly one configuration shape. Raw JSON from the
//! authoring surface is decoded into [`RuleConfig`] once, when the rule is
//! created or updated; evaluation only ever sees the typed form.

use std::borrow::Cow;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::rules::RuleType;
use crate::error::CoreError;

/// Version of the fixed business-rule predicate table.
pub const BUSINESS_RULE_TABLE_VERSION: u32 = 1;

/// Configuration, tagged by rule type.
///
/// Serialises as `{"rule_type": "...", "rule_config": {...}}`, the same two
/// columns a rule row stores.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "rule_type", content = "rule_config", rename_all = "snake_case")]
pub enum RuleConfig {
    Regex(RegexConfig),
    Range(RangeConfig),
    Length(LengthConfig),
    Format(FormatConfig),
    FileType(FileTypeConfig),
    FileSize(FileSizeConfig),
    Uniqueness(UniquenessConfig),
    Relationship(RelationshipConfig),
    BusinessRule(BusinessRuleConfig),
    Custom(CustomConfig),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegexConfig {
    pub pattern: String,
    /// `pattern` anchored to the whole value, built once by
    /// [`RuleConfig::decode`].
    #[serde(skip)]
    matcher: Option<Regex>,
}

impl RegexConfig {
    /// The whole-value matcher. A config that did not come through
    /// [`RuleConfig::decode`] compiles one on each call.
    pub fn matcher(&self) -> Result<Cow<'_, Regex>, regex::Error> {
        match &self.matcher {
            Some(matcher) => Ok(Cow::Borrowed(matcher)),
            None => whole_value_regex(&self.pattern).map(Cow::Owned),
        }
    }
}

impl PartialEq for RegexConfig {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

fn whole_value_regex(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("^(?:{pattern})$"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RangeConfig {
    pub min: Option<f64>,
    pub max: Option<f64>,
    #[serde(default = "default_inclusive")]
    pub inclusive: bool,
}

fn default_inclusive() -> bool {
    true
}

/// Bounds on the character count of a string or element count of an array.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LengthConfig {
    pub min: Option<u64>,
    pub max: Option<u64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FormatKind {
    Email,
    Url,
    Phone,
    Date,
}

impl FormatKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Url => "url",
            Self::Phone => "phone",
            Self::Date => "date",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FormatConfig {
    #[serde(rename = "type")]
    pub kind: FormatKind,
}

/// Allow-list of extensions, each including the leading dot. Stored lowercase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileTypeConfig {
    pub allowed_types: Vec<String>,
}

/// Size bounds in bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct FileSizeConfig {
    pub min_size: Option<u64>,
    pub max_size: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UniquenessConfig {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct RelationshipConfig {
    pub related_model: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QuotaType {
    Storage,
    Users,
}

/// Entries of the business-rule predicate table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "rule_name", rename_all = "snake_case")]
pub enum BusinessRuleConfig {
    /// ITAR-classified records may only be written by US persons.
    ItarCompliance,
    /// The owning organization must be below its storage or user quota.
    OrgQuota {
        quota_type: QuotaType,
        #[serde(default = "default_organization_model")]
        organization_model: String,
    },
    /// No other record of the model may share `series` and `version_number`.
    UniqueVersion,
}

fn default_organization_model() -> String {
    "Organization".to_string()
}

impl BusinessRuleConfig {
    pub const NAMES: [&'static str; 3] = ["itar_compliance", "org_quota", "unique_version"];

    pub fn rule_name(&self) -> &'static str {
        match self {
            Self::ItarCompliance => "itar_compliance",
            Self::OrgQuota { .. } => "org_quota",
            Self::UniqueVersion => "unique_version",
        }
    }
}

/// Names a predicate pre-registered on the validator registry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct CustomConfig {
    pub predicate: String,
}

impl RuleConfig {
    /// Decode and check raw JSON against the schema of `rule_type`.
    ///
    /// Any failure is a [`CoreError::Configuration`]; nothing is persisted.
    pub fn decode(rule_type: RuleType, raw: Value) -> Result<Self, CoreError> {
        let raw = if raw.is_null() {
            Value::Object(Map::new())
        } else {
            raw
        };
        let tagged = json!({ "rule_type": rule_type.as_str(), "rule_config": raw });
        let mut config: RuleConfig = serde_json::from_value(tagged)
            .map_err(|e| CoreError::Configuration(format!("{rule_type}: {e}")))?;
        config.check()?;
        config.normalize();
        Ok(config)
    }

    pub fn rule_type(&self) -> RuleType {
        match self {
            Self::Regex(_) => RuleType::Regex,
            Self::Range(_) => RuleType::Range,
            Self::Length(_) => RuleType::Length,
            Self::Format(_) => RuleType::Format,
            Self::FileType(_) => RuleType::FileType,
            Self::FileSize(_) => RuleType::FileSize,
            Self::Uniqueness(_) => RuleType::Uniqueness,
            Self::Relationship(_) => RuleType::Relationship,
            Self::BusinessRule(_) => RuleType::BusinessRule,
            Self::Custom(_) => RuleType::Custom,
        }
    }

    /// The untagged configuration object, as stored in `rule_config`.
    pub fn config_value(&self) -> Result<Value, CoreError> {
        let mut tagged = serde_json::to_value(self)
            .map_err(|e| CoreError::Internal(format!("Failed to encode rule config: {e}")))?;
        Ok(tagged
            .get_mut("rule_config")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Map::new())))
    }

    /// Whether this rule type validates a single field value.
    ///
    /// Field-level types need a `target_field`; business rules and custom
    /// predicates may run against either a field or the whole record.
    pub fn requires_field(&self) -> bool {
        !matches!(self, Self::BusinessRule(_) | Self::Custom(_))
    }

    /// Reject a configuration that cannot be attached to `target_field`.
    pub fn check_target(&self, target_field: &str) -> Result<(), CoreError> {
        if self.requires_field() && target_field.trim().is_empty() {
            return Err(CoreError::Configuration(format!(
                "{} rules require a target_field",
                self.rule_type()
            )));
        }
        Ok(())
    }

    fn check(&mut self) -> Result<(), CoreError> {
        match self {
            Self::Regex(c) => {
                // The bare pattern must parse on its own, so `a)(b` cannot
                // slip through inside the anchoring group.
                let matcher = Regex::new(&c.pattern)
                    .and_then(|_| whole_value_regex(&c.pattern))
                    .map_err(|e| {
                        CoreError::Configuration(format!("regex: invalid pattern: {e}"))
                    })?;
                c.matcher = Some(matcher);
            }
            Self::Range(c) => {
                for bound in [c.min, c.max].into_iter().flatten() {
                    if !bound.is_finite() {
                        return Err(CoreError::Configuration(
                            "range: bounds must be finite numbers".to_string(),
                        ));
                    }
                }
                check_bounds("range", c.min, c.max)?;
            }
            Self::Length(c) => check_bounds("length", c.min, c.max)?,
            Self::FileSize(c) => check_bounds("file_size", c.min_size, c.max_size)?,
            Self::FileType(c) => {
                if c.allowed_types.is_empty() {
                    return Err(CoreError::Configuration(
                        "file_type: allowed_types must not be empty".to_string(),
                    ));
                }
                if let Some(bad) = c
                    .allowed_types
                    .iter()
                    .find(|ext| !ext.starts_with('.') || ext.len() < 2)
                {
                    return Err(CoreError::Configuration(format!(
                        "file_type: extension '{bad}' must start with '.'"
                    )));
                }
            }
            Self::Relationship(c) => {
                if c.related_model.trim().is_empty() {
                    return Err(CoreError::Configuration(
                        "relationship: related_model must not be empty".to_string(),
                    ));
                }
            }
            Self::Custom(c) => {
                if c.predicate.trim().is_empty() {
                    return Err(CoreError::Configuration(
                        "custom: predicate must not be empty".to_string(),
                    ));
                }
            }
            Self::Format(_) | Self::Uniqueness(_) | Self::BusinessRule(_) => {}
        }
        Ok(())
    }

    fn normalize(&mut self) {
        if let Self::FileType(c) = self {
            for ext in &mut c.allowed_types {
                *ext = ext.to_lowercase();
            }
        }
    }
}

fn check_bounds<T: PartialOrd + Copy>(
    label: &str,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), CoreError> {
    match (min, max) {
        (None, None) => Err(CoreError::Configuration(format!(
            "{label}: at least one bound is required"
        ))),
        (Some(lo), Some(hi)) if lo > hi => Err(CoreError::Configuration(format!(
            "{label}: minimum exceeds maximum"
        ))),
        _ => Ok(()),
    }
}
