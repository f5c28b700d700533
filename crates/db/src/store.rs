//! Postgres implementations of the core storage traits.

use std::collections::HashMap;

use async_trait::async_trait;
use enginel_core::error::CoreError;
use enginel_core::types::{DbId, ScopeId, Timestamp};
use enginel_core::validation::outcome::{
    CounterTally, NewOutcome, OutcomeWithRule, OverrideStamp, OverrideWrite, Reconciliation,
};
use enginel_core::validation::rules::{NewRule, RulePatch};
use enginel_core::validation::store::{OutcomeStore, RecordStore, RuleStore};
use enginel_core::validation::{Outcome, OutcomeQuery, OutcomeStatus, Rule, RuleFilter};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::validation::{CreateValidationRule, UpdateValidationRule};
use crate::repositories::record_repo::is_identifier;
use crate::repositories::{RecordRepo, ValidationOutcomeRepo, ValidationRuleRepo};

/// Map a sqlx error into the domain taxonomy.
///
/// Unique violations on `uq_` constraints become [`CoreError::Conflict`];
/// everything else is a storage failure.
fn db_error(err: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.code().as_deref() == Some("23505") {
            let constraint = db_err.constraint().unwrap_or("unknown");
            if constraint.starts_with("uq_") {
                return CoreError::Conflict(format!(
                    "Duplicate value violates unique constraint: {constraint}"
                ));
            }
        }
    }
    tracing::error!(error = %err, "Database error");
    CoreError::Storage(err.to_string())
}

fn into_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, CoreError>
where
    T: TryFrom<R, Error = CoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ---------------------------------------------------------------------------
// Rules and outcomes
// ---------------------------------------------------------------------------

/// Rule and outcome storage backed by `validation_rules` /
/// `validation_outcomes`.
#[derive(Debug, Clone)]
pub struct PgValidationStore {
    pool: PgPool,
}

impl PgValidationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RuleStore for PgValidationStore {
    async fn insert_rule(&self, rule: NewRule, now: Timestamp) -> Result<Rule, CoreError> {
        let input = CreateValidationRule::try_from(rule)?;
        let row = ValidationRuleRepo::create(&self.pool, &input, now)
            .await
            .map_err(db_error)?;
        row.try_into()
    }

    async fn update_rule(
        &self,
        id: DbId,
        patch: RulePatch,
        now: Timestamp,
    ) -> Result<Option<Rule>, CoreError> {
        let input = UpdateValidationRule::try_from(patch)?;
        ValidationRuleRepo::update(&self.pool, id, &input, now)
            .await
            .map_err(db_error)?
            .map(Rule::try_from)
            .transpose()
    }

    async fn find_rule(&self, id: DbId) -> Result<Option<Rule>, CoreError> {
        ValidationRuleRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_error)?
            .map(Rule::try_from)
            .transpose()
    }

    async fn find_rule_by_name(
        &self,
        name: &str,
        scope_id: ScopeId,
    ) -> Result<Option<Rule>, CoreError> {
        ValidationRuleRepo::find_by_name(&self.pool, name, scope_id)
            .await
            .map_err(db_error)?
            .map(Rule::try_from)
            .transpose()
    }

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<Rule>, CoreError> {
        let rows = ValidationRuleRepo::list(&self.pool, filter)
            .await
            .map_err(db_error)?;
        into_all(rows)
    }
}

#[async_trait]
impl OutcomeStore for PgValidationStore {
    async fn record_outcomes(&self, outcomes: Vec<NewOutcome>) -> Result<Vec<Outcome>, CoreError> {
        let rows = ValidationOutcomeRepo::create_batch(&self.pool, &outcomes)
            .await
            .map_err(db_error)?;
        into_all(rows)
    }

    async fn find_outcome(&self, id: DbId) -> Result<Option<Outcome>, CoreError> {
        ValidationOutcomeRepo::find_by_id(&self.pool, id)
            .await
            .map_err(db_error)?
            .map(Outcome::try_from)
            .transpose()
    }

    async fn list_by_evaluation(&self, evaluation_id: Uuid) -> Result<Vec<Outcome>, CoreError> {
        let rows = ValidationOutcomeRepo::list_by_evaluation(&self.pool, evaluation_id)
            .await
            .map_err(db_error)?;
        into_all(rows)
    }

    async fn apply_override(
        &self,
        id: DbId,
        stamp: OverrideStamp,
    ) -> Result<OverrideWrite, CoreError> {
        let applied =
            ValidationOutcomeRepo::apply_override(&self.pool, id, stamp.by, &stamp.reason, stamp.at)
                .await
                .map_err(db_error)?;
        if let Some(row) = applied {
            return Ok(OverrideWrite::Applied(row.try_into()?));
        }

        // The guard did not match; read the row to report why. Overridden
        // rows never change again, so this read cannot race a later write.
        let Some(current) = self.find_outcome(id).await? else {
            return Ok(OverrideWrite::NotFound);
        };
        Ok(if current.status != OutcomeStatus::Failed {
            OverrideWrite::NotFailed(current.status)
        } else {
            OverrideWrite::AlreadyOverridden
        })
    }

    async fn scan_outcomes(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeWithRule>, CoreError> {
        let rows = ValidationOutcomeRepo::scan(&self.pool, query)
            .await
            .map_err(db_error)?;
        into_all(rows)
    }

    async fn tally_rule(&self, rule_id: DbId) -> Result<CounterTally, CoreError> {
        ValidationOutcomeRepo::tally(&self.pool, rule_id)
            .await
            .map_err(db_error)
    }

    async fn reconcile_counters(&self, rule_id: DbId) -> Result<Option<Reconciliation>, CoreError> {
        let counters = ValidationRuleRepo::reconcile_counters(&self.pool, rule_id)
            .await
            .map_err(db_error)?;
        Ok(counters.map(|(cached, recomputed)| Reconciliation {
            rule_id,
            cached,
            recomputed,
        }))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Record lookups for the validators that consult other records.
///
/// Only models registered with [`PgRecordStore::register`] can be read.
#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
    tables: HashMap<String, String>,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            tables: HashMap::new(),
        }
    }

    /// Map a model name to the table holding its rows.
    pub fn register(
        mut self,
        model: impl Into<String>,
        table: impl Into<String>,
    ) -> Result<Self, CoreError> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(CoreError::Configuration(format!(
                "'{table}' is not a valid table name"
            )));
        }
        self.tables.insert(model.into(), table);
        Ok(self)
    }

    fn table(&self, model: &str) -> Result<&str, CoreError> {
        self.tables
            .get(model)
            .map(String::as_str)
            .ok_or_else(|| CoreError::Configuration(format!("No table registered for model '{model}'")))
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn fetch_by_id(&self, model: &str, id: DbId) -> Result<Option<Value>, CoreError> {
        RecordRepo::fetch_by_id(&self.pool, self.table(model)?, id)
            .await
            .map_err(db_error)
    }

    async fn filter_by_field(
        &self,
        model: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, CoreError> {
        RecordRepo::filter_by_field(&self.pool, self.table(model)?, field, value)
            .await
            .map_err(db_error)
    }

    async fn exists(&self, model: &str, id: DbId) -> Result<bool, CoreError> {
        RecordRepo::exists(&self.pool, self.table(model)?, id)
            .await
            .map_err(db_error)
    }
}
