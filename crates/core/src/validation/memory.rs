//! In-memory store implementations for tests and embedding.
//!
//! Each operation takes the state lock once, so multi-row writes are atomic
//! with respect to every other caller, the same guarantee the Postgres
//! store gets from a transaction.

use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::conditions::values_equal;
use super::outcome::{
    CounterTally, NewOutcome, Outcome, OutcomeQuery, OutcomeStatus, OutcomeWithRule,
    OverrideStamp, OverrideWrite, Reconciliation,
};
use super::rules::{NewRule, Rule, RuleFilter, RulePatch};
use super::store::{OutcomeStore, RecordStore, RuleStore};
use crate::error::CoreError;
use crate::types::{DbId, ScopeId, Timestamp};

#[derive(Debug, Default)]
struct State {
    rules: BTreeMap<DbId, Rule>,
    outcomes: BTreeMap<DbId, Outcome>,
    /// `(rule_id, evaluation_id)` of every stored outcome.
    outcome_keys: HashSet<(DbId, Uuid)>,
    last_rule_id: DbId,
    last_outcome_id: DbId,
}

impl State {
    fn name_taken(&self, name: &str, scope_id: ScopeId) -> bool {
        self.rules
            .values()
            .any(|r| r.name == name && r.scope_id == scope_id)
    }

    fn tally(&self, rule_id: DbId) -> CounterTally {
        let mut tally = CounterTally::default();
        for outcome in self.outcomes.values().filter(|o| o.rule_id == rule_id) {
            tally.add(CounterTally::of(outcome.status));
        }
        tally
    }
}

/// Rule and outcome storage held in process memory.
#[derive(Debug, Default)]
pub struct MemoryValidationStore {
    state: RwLock<State>,
}

impl MemoryValidationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero a rule's cached counters without touching the outcome log.
    pub async fn reset_counters(&self, id: DbId) {
        if let Some(rule) = self.state.write().await.rules.get_mut(&id) {
            rule.total_checks = 0;
            rule.total_failures = 0;
        }
    }
}

#[async_trait]
impl RuleStore for MemoryValidationStore {
    async fn insert_rule(&self, rule: NewRule, now: Timestamp) -> Result<Rule, CoreError> {
        let mut state = self.state.write().await;
        if state.name_taken(&rule.name, rule.scope_id) {
            return Err(CoreError::Conflict(format!(
                "A rule named '{}' already exists in this scope",
                rule.name
            )));
        }
        state.last_rule_id += 1;
        let stored = Rule {
            id: state.last_rule_id,
            name: rule.name,
            description: rule.description,
            target_model: rule.target_model,
            target_field: rule.target_field,
            config: rule.config,
            error_message: rule.error_message,
            severity: rule.severity,
            is_active: rule.is_active,
            apply_on_create: rule.apply_on_create,
            apply_on_update: rule.apply_on_update,
            conditions: rule.conditions,
            scope_id: rule.scope_id,
            created_by: rule.created_by,
            total_checks: 0,
            total_failures: 0,
            created_at: now,
            updated_at: now,
        };
        state.rules.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn update_rule(
        &self,
        id: DbId,
        patch: RulePatch,
        now: Timestamp,
    ) -> Result<Option<Rule>, CoreError> {
        let mut state = self.state.write().await;
        let Some(rule) = state.rules.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(description) = patch.description {
            rule.description = description;
        }
        if let Some(config) = patch.config {
            rule.config = config;
        }
        if let Some(error_message) = patch.error_message {
            rule.error_message = error_message;
        }
        if let Some(severity) = patch.severity {
            rule.severity = severity;
        }
        if let Some(is_active) = patch.is_active {
            rule.is_active = is_active;
        }
        if let Some(apply_on_create) = patch.apply_on_create {
            rule.apply_on_create = apply_on_create;
        }
        if let Some(apply_on_update) = patch.apply_on_update {
            rule.apply_on_update = apply_on_update;
        }
        if let Some(conditions) = patch.conditions {
            rule.conditions = conditions;
        }
        rule.updated_at = now;
        Ok(Some(rule.clone()))
    }

    async fn find_rule(&self, id: DbId) -> Result<Option<Rule>, CoreError> {
        Ok(self.state.read().await.rules.get(&id).cloned())
    }

    async fn find_rule_by_name(
        &self,
        name: &str,
        scope_id: ScopeId,
    ) -> Result<Option<Rule>, CoreError> {
        Ok(self
            .state
            .read()
            .await
            .rules
            .values()
            .find(|r| r.name == name && r.scope_id == scope_id)
            .cloned())
    }

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<Rule>, CoreError> {
        let state = self.state.read().await;
        Ok(state
            .rules
            .values()
            .filter(|r| filter.admits(r))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl OutcomeStore for MemoryValidationStore {
    async fn record_outcomes(&self, outcomes: Vec<NewOutcome>) -> Result<Vec<Outcome>, CoreError> {
        let mut state = self.state.write().await;

        // Check every row before writing any, so a bad row leaves no trace.
        let mut batch_keys = HashSet::with_capacity(outcomes.len());
        for new in &outcomes {
            if !state.rules.contains_key(&new.rule_id) {
                return Err(CoreError::NotFound {
                    entity: "validation_rule",
                    id: new.rule_id,
                });
            }
            let key = (new.rule_id, new.evaluation_id);
            if state.outcome_keys.contains(&key) || !batch_keys.insert(key) {
                return Err(CoreError::Conflict(format!(
                    "Rule {} already has an outcome for evaluation {}",
                    new.rule_id, new.evaluation_id
                )));
            }
        }

        let mut written = Vec::with_capacity(outcomes.len());
        for new in outcomes {
            let delta = new.counter_delta();
            if let Some(rule) = state.rules.get_mut(&new.rule_id) {
                rule.total_checks += delta.checks;
                rule.total_failures += delta.failures;
            }
            state.last_outcome_id += 1;
            let outcome = Outcome {
                id: state.last_outcome_id,
                evaluation_id: new.evaluation_id,
                rule_id: new.rule_id,
                target_model: new.target_model,
                target_id: new.target_id,
                target_field: new.target_field,
                status: new.status,
                error_message: new.error_message,
                details: new.details,
                validated_by: new.validated_by,
                validated_at: new.validated_at,
                was_blocked: new.was_blocked,
                was_overridden: false,
                override_reason: None,
                override_by: None,
                override_at: None,
            };
            state
                .outcome_keys
                .insert((outcome.rule_id, outcome.evaluation_id));
            state.outcomes.insert(outcome.id, outcome.clone());
            written.push(outcome);
        }
        Ok(written)
    }

    async fn find_outcome(&self, id: DbId) -> Result<Option<Outcome>, CoreError> {
        Ok(self.state.read().await.outcomes.get(&id).cloned())
    }

    async fn list_by_evaluation(&self, evaluation_id: Uuid) -> Result<Vec<Outcome>, CoreError> {
        Ok(self
            .state
            .read()
            .await
            .outcomes
            .values()
            .filter(|o| o.evaluation_id == evaluation_id)
            .cloned()
            .collect())
    }

    async fn apply_override(
        &self,
        id: DbId,
        stamp: OverrideStamp,
    ) -> Result<OverrideWrite, CoreError> {
        let mut state = self.state.write().await;
        let Some(outcome) = state.outcomes.get_mut(&id) else {
            return Ok(OverrideWrite::NotFound);
        };
        if outcome.status != OutcomeStatus::Failed {
            return Ok(OverrideWrite::NotFailed(outcome.status));
        }
        if outcome.was_overridden {
            return Ok(OverrideWrite::AlreadyOverridden);
        }
        outcome.was_overridden = true;
        outcome.override_by = Some(stamp.by);
        outcome.override_reason = Some(stamp.reason);
        outcome.override_at = Some(stamp.at);
        Ok(OverrideWrite::Applied(outcome.clone()))
    }

    async fn scan_outcomes(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeWithRule>, CoreError> {
        let state = self.state.read().await;
        let mut rows = Vec::new();
        for outcome in state.outcomes.values() {
            if !query.contains(outcome.validated_at) {
                continue;
            }
            if let Some(model) = &query.target_model {
                if &outcome.target_model != model {
                    continue;
                }
            }
            let Some(rule) = state.rules.get(&outcome.rule_id) else {
                continue;
            };
            if query.scope_id.is_some_and(|s| rule.scope_id != Some(s)) {
                continue;
            }
            rows.push(OutcomeWithRule {
                outcome: outcome.clone(),
                rule_name: rule.name.clone(),
                severity: rule.severity,
                rule_type: rule.rule_type(),
                scope_id: rule.scope_id,
            });
        }
        Ok(rows)
    }

    async fn tally_rule(&self, rule_id: DbId) -> Result<CounterTally, CoreError> {
        Ok(self.state.read().await.tally(rule_id))
    }

    async fn reconcile_counters(&self, rule_id: DbId) -> Result<Option<Reconciliation>, CoreError> {
        let mut state = self.state.write().await;
        let recomputed = state.tally(rule_id);
        let Some(rule) = state.rules.get_mut(&rule_id) else {
            return Ok(None);
        };
        let cached = CounterTally {
            checks: rule.total_checks,
            failures: rule.total_failures,
        };
        rule.total_checks = recomputed.checks;
        rule.total_failures = recomputed.failures;
        Ok(Some(Reconciliation {
            rule_id,
            cached,
            recomputed,
        }))
    }
}

/// Records keyed by model and id, as plain JSON objects.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<String, BTreeMap<DbId, Value>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, model: &str, id: DbId, record: Value) {
        self.records
            .write()
            .await
            .entry(model.to_string())
            .or_default()
            .insert(id, record);
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn fetch_by_id(&self, model: &str, id: DbId) -> Result<Option<Value>, CoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(model)
            .and_then(|rows| rows.get(&id))
            .cloned())
    }

    async fn filter_by_field(
        &self,
        model: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, CoreError> {
        let records = self.records.read().await;
        Ok(records
            .get(model)
            .map(|rows| {
                rows.values()
                    .filter(|row| row.get(field).is_some_and(|v| values_equal(v, value)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn exists(&self, model: &str, id: DbId) -> Result<bool, CoreError> {
        Ok(self
            .records
            .read()
            .await
            .get(model)
            .is_some_and(|rows| rows.contains_key(&id)))
    }
}
