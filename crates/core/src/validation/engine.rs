//! The validation engine: the single entry point callers use.
//!
//! Loads applicable rules, matches conditions, runs validators, records one
//! outcome per selected rule, and returns the accept/block decision. Also
//! exposes overrides, reports, counter reconciliation, and rule CRUD.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::join_all;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::cache::RuleCache;
use super::conditions::conditions_match;
use super::evaluator::{order_rules, select_rules, EvaluatedOutcome, EvaluationResult};
use super::outcome::{NewOutcome, Outcome, OutcomeQuery, OutcomeStatus, Reconciliation};
use super::overrides::OverrideManager;
use super::recorder::ResultRecorder;
use super::report::{summarize, BatchSummary, ReportAggregator, RuleStatistics, ValidationReport};
use super::rule_config::RuleConfig;
use super::rules::{
    Actor, CreateRule, NewRule, Operation, Record, Rule, RuleFilter, RulePatch, Severity,
    UpdateRule,
};
use super::store::{
    Clock, FlagAuthorizer, OverrideAuthorizer, RecordStore, SystemClock, ValidationStore,
};
use super::validators::{ValidatorError, ValidatorRegistry, Verdict};
use crate::config::EngineConfig;
use crate::error::CoreError;
use crate::types::{DbId, ScopeId, Timestamp};

/// An explicit, logged exemption of one rule from blocking a single call.
/// The FAILED outcome is still recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleBypass {
    pub rule_id: DbId,
    pub reason: String,
}

/// Per-call evaluation options.
#[derive(Debug, Clone, Default)]
pub struct EvaluateOptions {
    /// Fallback values for condition keys absent from the record.
    pub context: Map<String, Value>,
    pub bypasses: Vec<RuleBypass>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchItem {
    pub index: usize,
    pub target_id: Option<DbId>,
    pub result: EvaluationResult,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchResult {
    pub total: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub per_instance: Vec<BatchItem>,
    pub summary: BatchSummary,
}

/// Status, message, and details for one rule before it is recorded.
struct RuleVerdict {
    status: OutcomeStatus,
    error_message: String,
    details: Value,
}

pub struct ValidationEngine {
    store: Arc<dyn ValidationStore>,
    records: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    authorizer: Arc<dyn OverrideAuthorizer>,
    registry: ValidatorRegistry,
    config: EngineConfig,
    cache: RuleCache,
}

impl ValidationEngine {
    pub fn new(
        store: Arc<dyn ValidationStore>,
        records: Arc<dyn RecordStore>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            records,
            clock: Arc::new(SystemClock),
            authorizer: Arc::new(FlagAuthorizer),
            registry: ValidatorRegistry::new(),
            cache: RuleCache::new(config.rule_cache_ttl),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_authorizer(mut self, authorizer: Arc<dyn OverrideAuthorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    pub fn with_registry(mut self, registry: ValidatorRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ── Evaluation ───────────────────────────────────────────────────

    /// Evaluate `record` for `operation` against every applicable rule.
    pub async fn evaluate(
        &self,
        record: &Record,
        operation: Operation,
        actor: &Actor,
        scope: ScopeId,
    ) -> Result<EvaluationResult, CoreError> {
        self.evaluate_with(record, operation, actor, scope, &EvaluateOptions::default())
            .await
    }

    /// [`evaluate`](Self::evaluate) with a condition context and bypasses.
    pub async fn evaluate_with(
        &self,
        record: &Record,
        operation: Operation,
        actor: &Actor,
        scope: ScopeId,
        options: &EvaluateOptions,
    ) -> Result<EvaluationResult, CoreError> {
        check_bypasses(&options.bypasses)?;
        let rules = self.applicable_rules(&record.model, scope).await?;
        let selected = select_rules(&rules, record, operation, scope);
        tracing::debug!(
            target_model = %record.model,
            target_id = ?record.id,
            operation = operation.as_str(),
            candidates = rules.len(),
            selected = selected.len(),
            "Selected validation rules",
        );
        self.run(record, &selected, actor, options).await
    }

    /// Validate a single field value against the rules that target it.
    ///
    /// No operation filter applies. Conditions see only this field plus
    /// the context map.
    pub async fn validate_field(
        &self,
        model: &str,
        field: &str,
        value: Value,
        actor: &Actor,
        scope: ScopeId,
    ) -> Result<EvaluationResult, CoreError> {
        let rules = self.applicable_rules(model, scope).await?;
        let mut selected: Vec<Rule> = rules
            .iter()
            .filter(|r| r.is_active && r.target_field == field && r.in_scope(scope))
            .cloned()
            .collect();
        order_rules(&mut selected);

        let mut fields = Map::new();
        fields.insert(field.to_string(), value);
        let record = Record::new(model, fields);
        self.run(&record, &selected, actor, &EvaluateOptions::default())
            .await
    }

    /// Evaluate each record as its own independent call.
    pub async fn validate_batch(
        &self,
        records: &[Record],
        operation: Operation,
        actor: &Actor,
        scope: ScopeId,
    ) -> Result<BatchResult, CoreError> {
        let mut per_instance = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let result = self.evaluate(record, operation, actor, scope).await?;
            per_instance.push(BatchItem {
                index,
                target_id: record.id,
                result,
            });
        }

        let valid_count = per_instance.iter().filter(|i| i.result.accepted).count();
        let summary = summarize(per_instance.iter().flat_map(|i| i.result.outcomes.iter()));
        tracing::info!(
            total = records.len(),
            valid = valid_count,
            invalid = records.len() - valid_count,
            "Batch validation complete",
        );
        Ok(BatchResult {
            total: records.len(),
            valid_count,
            invalid_count: records.len() - valid_count,
            per_instance,
            summary,
        })
    }

    async fn applicable_rules(
        &self,
        model: &str,
        scope: ScopeId,
    ) -> Result<Arc<Vec<Rule>>, CoreError> {
        self.cache
            .get_or_load(model, scope, || async move {
                self.store
                    .list_rules(&RuleFilter::applicable(model, scope))
                    .await
            })
            .await
    }

    /// Evaluate `selected` in full and record one outcome per rule.
    async fn run(
        &self,
        record: &Record,
        selected: &[Rule],
        actor: &Actor,
        options: &EvaluateOptions,
    ) -> Result<EvaluationResult, CoreError> {
        let evaluation_id = Uuid::now_v7();
        if selected.is_empty() {
            return Ok(EvaluationResult::empty(evaluation_id));
        }
        let now = self.clock.now();

        // Every rule runs; a failure never short-circuits the rest.
        let verdicts = join_all(
            selected
                .iter()
                .map(|rule| self.evaluate_rule(rule, record, actor, &options.context)),
        )
        .await;

        let pending: Vec<NewOutcome> = selected
            .iter()
            .zip(verdicts)
            .map(|(rule, verdict)| {
                self.pending_outcome(evaluation_id, rule, record, actor, now, verdict, options)
            })
            .collect();

        let written = ResultRecorder::new(self.store.as_ref())
            .record(pending)
            .await?;

        let outcomes: Vec<EvaluatedOutcome> = selected
            .iter()
            .zip(written)
            .map(|(rule, outcome)| EvaluatedOutcome {
                outcome,
                rule_name: rule.name.clone(),
                severity: rule.severity,
            })
            .collect();
        let accepted = !outcomes.iter().any(|o| o.outcome.was_blocked);

        if !accepted {
            tracing::info!(
                %evaluation_id,
                target_model = %record.model,
                target_id = ?record.id,
                blocked = outcomes.iter().filter(|o| o.outcome.was_blocked).count(),
                "Operation blocked by validation",
            );
        }
        Ok(EvaluationResult {
            evaluation_id,
            accepted,
            outcomes,
        })
    }

    async fn evaluate_rule(
        &self,
        rule: &Rule,
        record: &Record,
        actor: &Actor,
        context: &Map<String, Value>,
    ) -> RuleVerdict {
        let mut details = json!({
            "rule_type": rule.rule_type().as_str(),
            "severity": rule.severity.as_str(),
        });

        if !conditions_match(&rule.conditions, record, context) {
            details["reason"] = json!("conditions not met");
            return RuleVerdict {
                status: OutcomeStatus::Skipped,
                error_message: String::new(),
                details,
            };
        }

        let check = AssertUnwindSafe(self.registry.validate(
            rule,
            record,
            actor,
            self.records.as_ref(),
        ))
        .catch_unwind();
        let timeout = self.config.validator_timeout;
        let result = match tokio::time::timeout(timeout, check).await {
            Err(_) => Err(ValidatorError::Timeout(timeout.as_millis() as u64)),
            Ok(Err(_)) => Err(ValidatorError::Panicked),
            Ok(Ok(result)) => result,
        };

        match result {
            Ok(Verdict::Passed) => {
                tracing::trace!(rule_id = rule.id, "Rule passed");
                RuleVerdict {
                    status: OutcomeStatus::Passed,
                    error_message: String::new(),
                    details,
                }
            }
            Ok(Verdict::Failed(detail)) => {
                tracing::debug!(rule_id = rule.id, %detail, "Rule failed");
                details["detail"] = json!(detail);
                details["rule_config"] = rule.config.config_value().unwrap_or(Value::Null);
                RuleVerdict {
                    status: OutcomeStatus::Failed,
                    error_message: rule.error_message.clone(),
                    details,
                }
            }
            Err(err) => {
                tracing::warn!(
                    rule_id = rule.id,
                    rule = %rule.name,
                    error_kind = err.kind(),
                    error = %err,
                    "Validator could not evaluate input",
                );
                details["error_kind"] = json!(err.kind());
                details["detail"] = json!(err.to_string());
                RuleVerdict {
                    status: OutcomeStatus::Error,
                    error_message: format!("Validation error: {err}"),
                    details,
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn pending_outcome(
        &self,
        evaluation_id: Uuid,
        rule: &Rule,
        record: &Record,
        actor: &Actor,
        now: Timestamp,
        verdict: RuleVerdict,
        options: &EvaluateOptions,
    ) -> NewOutcome {
        let RuleVerdict {
            status,
            error_message,
            mut details,
        } = verdict;

        let blocking = status == OutcomeStatus::Failed && rule.severity.blocks();
        let bypass = options.bypasses.iter().find(|b| b.rule_id == rule.id);
        let was_blocked = match (blocking, bypass) {
            (true, Some(bypass)) => {
                tracing::warn!(
                    %evaluation_id,
                    rule_id = rule.id,
                    actor_id = actor.id,
                    reason = %bypass.reason,
                    "Blocking validation failure bypassed by caller",
                );
                details["bypass_reason"] = json!(bypass.reason);
                false
            }
            (blocking, _) => blocking,
        };

        NewOutcome {
            evaluation_id,
            rule_id: rule.id,
            target_model: record.model.clone(),
            target_id: record.id,
            target_field: rule.target_field.clone(),
            status,
            error_message,
            details,
            validated_by: Some(actor.id),
            validated_at: now,
            was_blocked,
        }
    }

    // ── Overrides, reports, counters ─────────────────────────────────

    /// Acknowledge a FAILED outcome from an earlier call.
    pub async fn override_outcome(
        &self,
        outcome_id: DbId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Outcome, CoreError> {
        OverrideManager::new(
            self.store.as_ref(),
            self.authorizer.as_ref(),
            self.clock.as_ref(),
            self.config.min_override_reason_len,
        )
        .override_outcome(outcome_id, actor, reason)
        .await
    }

    pub async fn report(&self, query: &OutcomeQuery) -> Result<ValidationReport, CoreError> {
        ReportAggregator::new(self.store.as_ref(), self.config.report_top_failing)
            .report(query)
            .await
    }

    pub async fn rule_statistics(&self, rule_id: DbId) -> Result<RuleStatistics, CoreError> {
        ReportAggregator::new(self.store.as_ref(), self.config.report_top_failing)
            .rule_statistics(rule_id)
            .await
    }

    /// Rewrite one rule's cached counters from the outcome log.
    pub async fn reconcile_counters(&self, rule_id: DbId) -> Result<Reconciliation, CoreError> {
        ResultRecorder::new(self.store.as_ref())
            .reconcile(rule_id)
            .await
    }

    /// Reconcile every rule, active or not.
    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>, CoreError> {
        let rules = self.store.list_rules(&RuleFilter::default()).await?;
        let recorder = ResultRecorder::new(self.store.as_ref());
        let mut results = Vec::with_capacity(rules.len());
        for rule in &rules {
            results.push(recorder.reconcile(rule.id).await?);
        }
        let drifted = results.iter().filter(|r| !r.was_consistent()).count();
        tracing::info!(rules = results.len(), drifted, "Counter reconciliation complete");
        Ok(results)
    }

    // ── Rule CRUD ────────────────────────────────────────────────────

    /// Create a rule. The configuration is decoded and checked before
    /// anything is written; a malformed one is a [`CoreError::Configuration`].
    pub async fn create_rule(&self, input: CreateRule, actor: &Actor) -> Result<Rule, CoreError> {
        require_admin(actor)?;
        let name = required_text("name", &input.name)?;
        let target_model = required_text("target_model", &input.target_model)?;
        let error_message = required_text("error_message", &input.error_message)?;
        let target_field = input.target_field.unwrap_or_default().trim().to_string();

        let config = RuleConfig::decode(input.rule_type, input.rule_config)?;
        self.registry.check_config(&config)?;
        config.check_target(&target_field)?;

        if self
            .store
            .find_rule_by_name(&name, input.scope_id)
            .await?
            .is_some()
        {
            return Err(CoreError::Conflict(format!(
                "A rule named '{name}' already exists in this scope"
            )));
        }

        let new_rule = NewRule {
            name,
            description: input.description.unwrap_or_default(),
            target_model,
            target_field,
            config,
            error_message,
            severity: input.severity.unwrap_or(Severity::Error),
            is_active: true,
            apply_on_create: input.apply_on_create.unwrap_or(true),
            apply_on_update: input.apply_on_update.unwrap_or(true),
            conditions: input.conditions.unwrap_or_default(),
            scope_id: input.scope_id,
            created_by: Some(actor.id),
        };
        let rule = self.store.insert_rule(new_rule, self.clock.now()).await?;
        self.cache.invalidate_all().await;
        tracing::info!(
            rule_id = rule.id,
            name = %rule.name,
            rule_type = rule.rule_type().as_str(),
            actor_id = actor.id,
            "Validation rule created",
        );
        Ok(rule)
    }

    /// Update a rule. The rule type is fixed; a new `rule_config` is decoded
    /// against it.
    pub async fn update_rule(
        &self,
        id: DbId,
        input: UpdateRule,
        actor: &Actor,
    ) -> Result<Rule, CoreError> {
        require_admin(actor)?;
        let existing = self.get_rule(id).await?;

        let config = match input.rule_config {
            Some(raw) => {
                let config = RuleConfig::decode(existing.rule_type(), raw)?;
                self.registry.check_config(&config)?;
                config.check_target(&existing.target_field)?;
                Some(config)
            }
            None => None,
        };
        let error_message = match input.error_message {
            Some(message) => Some(required_text("error_message", &message)?),
            None => None,
        };

        let patch = RulePatch {
            description: input.description,
            config,
            error_message,
            severity: input.severity,
            is_active: input.is_active,
            apply_on_create: input.apply_on_create,
            apply_on_update: input.apply_on_update,
            conditions: input.conditions,
        };
        let rule = self
            .store
            .update_rule(id, patch, self.clock.now())
            .await?
            .ok_or(CoreError::NotFound {
                entity: "validation_rule",
                id,
            })?;
        self.cache.invalidate_all().await;
        tracing::info!(rule_id = id, actor_id = actor.id, "Validation rule updated");
        Ok(rule)
    }

    /// Soft-disable a rule. Its outcomes keep their reference.
    pub async fn deactivate_rule(&self, id: DbId, actor: &Actor) -> Result<Rule, CoreError> {
        let patch = UpdateRule {
            is_active: Some(false),
            ..Default::default()
        };
        self.update_rule(id, patch, actor).await
    }

    pub async fn get_rule(&self, id: DbId) -> Result<Rule, CoreError> {
        self.store.find_rule(id).await?.ok_or(CoreError::NotFound {
            entity: "validation_rule",
            id,
        })
    }

    pub async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<Rule>, CoreError> {
        self.store.list_rules(filter).await
    }

    pub async fn get_outcome(&self, id: DbId) -> Result<Outcome, CoreError> {
        self.store.find_outcome(id).await?.ok_or(CoreError::NotFound {
            entity: "validation_outcome",
            id,
        })
    }

    /// Every outcome recorded by one evaluate or validate_field call.
    pub async fn list_evaluation_outcomes(
        &self,
        evaluation_id: Uuid,
    ) -> Result<Vec<Outcome>, CoreError> {
        self.store.list_by_evaluation(evaluation_id).await
    }
}

fn require_admin(actor: &Actor) -> Result<(), CoreError> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied(format!(
            "Actor {} may not manage validation rules",
            actor.id
        )))
    }
}

fn required_text(field: &str, value: &str) -> Result<String, CoreError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::Validation(format!("{field} must not be empty")));
    }
    Ok(trimmed.to_string())
}

fn check_bypasses(bypasses: &[RuleBypass]) -> Result<(), CoreError> {
    match bypasses.iter().find(|b| b.reason.trim().is_empty()) {
        Some(b) => Err(CoreError::Validation(format!(
            "Bypass of rule {} requires a reason",
            b.rule_id
        ))),
        None => Ok(()),
    }
}
