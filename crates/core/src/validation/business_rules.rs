//! The fixed business-rule predicate table (version 1).
//!
//! A BUSINESS_RULE configuration selects one entry by `rule_name`. The set is
//! closed: adding a predicate means adding a [`BusinessRuleConfig`] variant
//! and bumping [`BUSINESS_RULE_TABLE_VERSION`](super::rule_config::BUSINESS_RULE_TABLE_VERSION).

use serde_json::Value;

use super::conditions::values_equal;
use super::rule_config::{BusinessRuleConfig, QuotaType};
use super::rules::{Actor, Record};
use super::store::RecordStore;
use super::validators::{as_id, as_number, is_same_record, type_name, ValidatorError, Verdict};

const ITAR_CLASSIFICATION: &str = "ITAR";

pub async fn evaluate(
    config: &BusinessRuleConfig,
    record: &Record,
    actor: &Actor,
    records: &dyn RecordStore,
) -> Result<Verdict, ValidatorError> {
    match config {
        BusinessRuleConfig::ItarCompliance => Ok(itar_compliance(record, actor)),
        BusinessRuleConfig::OrgQuota {
            quota_type,
            organization_model,
        } => org_quota(*quota_type, organization_model, record, records).await,
        BusinessRuleConfig::UniqueVersion => unique_version(record, records).await,
    }
}

fn itar_compliance(record: &Record, actor: &Actor) -> Verdict {
    let is_itar = record
        .get("classification")
        .as_ref()
        .and_then(Value::as_str)
        .is_some_and(|c| c.eq_ignore_ascii_case(ITAR_CLASSIFICATION));
    if is_itar && !actor.is_us_person {
        Verdict::Failed(format!(
            "actor {} is not a US person and cannot write ITAR-classified data",
            actor.id
        ))
    } else {
        Verdict::Passed
    }
}

async fn org_quota(
    quota_type: QuotaType,
    organization_model: &str,
    record: &Record,
    records: &dyn RecordStore,
) -> Result<Verdict, ValidatorError> {
    let org_ref = record
        .get("organization_id")
        .ok_or_else(|| ValidatorError::MissingField("organization_id".to_string()))?;
    let org_id = as_id(&org_ref).ok_or(ValidatorError::WrongType {
        expected: "record id",
        found: type_name(&org_ref),
    })?;
    let organization = records
        .fetch_by_id(organization_model, org_id)
        .await?
        .ok_or_else(|| {
            ValidatorError::Lookup(format!("{organization_model} {org_id} not found"))
        })?;

    let (used_key, limit_key, label) = match quota_type {
        QuotaType::Storage => ("storage_used_gb", "max_storage_gb", "storage"),
        QuotaType::Users => ("user_count", "max_users", "user"),
    };
    let used = numeric_field(&organization, used_key)?;
    let limit = numeric_field(&organization, limit_key)?;

    if used >= limit {
        Ok(Verdict::Failed(format!(
            "{organization_model} {org_id} has reached its {label} quota ({used} of {limit})"
        )))
    } else {
        Ok(Verdict::Passed)
    }
}

fn numeric_field(object: &Value, key: &str) -> Result<f64, ValidatorError> {
    let value = object
        .get(key)
        .ok_or_else(|| ValidatorError::MissingField(key.to_string()))?;
    as_number(value).ok_or(ValidatorError::WrongType {
        expected: "number",
        found: type_name(value),
    })
}

async fn unique_version(
    record: &Record,
    records: &dyn RecordStore,
) -> Result<Verdict, ValidatorError> {
    let series = record
        .get("series")
        .ok_or_else(|| ValidatorError::MissingField("series".to_string()))?;
    let version = record
        .get("version_number")
        .ok_or_else(|| ValidatorError::MissingField("version_number".to_string()))?;

    let siblings = records
        .filter_by_field(&record.model, "series", &series)
        .await?;
    let clash = siblings.iter().any(|other| {
        !is_same_record(other, record)
            && other
                .get("version_number")
                .is_some_and(|v| values_equal(v, &version))
    });

    if clash {
        Ok(Verdict::Failed(format!(
            "version {version} already exists in series {series}"
        )))
    } else {
        Ok(Verdict::Passed)
    }
}
