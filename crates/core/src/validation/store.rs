//! Storage and collaborator seams consumed by the engine.
//!
//! Postgres implementations live in `enginel-db`; in-memory ones in
//! [`super::memory`].

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use uuid::Uuid;

use super::outcome::{
    CounterTally, NewOutcome, Outcome, OutcomeQuery, OutcomeWithRule, OverrideStamp, OverrideWrite,
    Reconciliation,
};
use super::rules::{Actor, NewRule, Rule, RuleFilter, RulePatch};
use crate::error::CoreError;
use crate::types::{DbId, ScopeId, Timestamp};

/// Persisted rule definitions. Rules are deactivated, never deleted.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn insert_rule(&self, rule: NewRule, now: Timestamp) -> Result<Rule, CoreError>;

    /// Returns `None` if the rule does not exist.
    async fn update_rule(
        &self,
        id: DbId,
        patch: RulePatch,
        now: Timestamp,
    ) -> Result<Option<Rule>, CoreError>;

    async fn find_rule(&self, id: DbId) -> Result<Option<Rule>, CoreError>;

    async fn find_rule_by_name(&self, name: &str, scope_id: ScopeId)
        -> Result<Option<Rule>, CoreError>;

    async fn list_rules(&self, filter: &RuleFilter) -> Result<Vec<Rule>, CoreError>;
}

/// The append-only outcome log.
#[async_trait]
pub trait OutcomeStore: Send + Sync {
    /// Insert all outcomes of one evaluation call and bump the owning rules'
    /// counters, all in one atomic unit. Either every row and every counter
    /// increment lands, or none does.
    async fn record_outcomes(&self, outcomes: Vec<NewOutcome>) -> Result<Vec<Outcome>, CoreError>;

    async fn find_outcome(&self, id: DbId) -> Result<Option<Outcome>, CoreError>;

    async fn list_by_evaluation(&self, evaluation_id: Uuid) -> Result<Vec<Outcome>, CoreError>;

    /// Conditional write guarded on `status = failed AND was_overridden = false`.
    /// Exactly one concurrent caller observes [`OverrideWrite::Applied`].
    async fn apply_override(
        &self,
        id: DbId,
        stamp: OverrideStamp,
    ) -> Result<OverrideWrite, CoreError>;

    /// Outcomes in the query window joined with their rule's attributes.
    async fn scan_outcomes(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeWithRule>, CoreError>;

    /// Recompute a rule's counters from the outcome log. Read-only.
    async fn tally_rule(&self, rule_id: DbId) -> Result<CounterTally, CoreError>;

    /// Recompute a rule's counters from the outcome log and store them.
    ///
    /// The tally and the write form one atomic unit with respect to
    /// [`Self::record_outcomes`]: an outcome is either counted in the tally
    /// or its increment lands after the write. Returns `None` if the rule
    /// does not exist.
    async fn reconcile_counters(&self, rule_id: DbId) -> Result<Option<Reconciliation>, CoreError>;
}

/// Everything the engine needs from durable storage.
pub trait ValidationStore: RuleStore + OutcomeStore {}

impl<T: RuleStore + OutcomeStore> ValidationStore for T {}

/// Read access to the records being validated, used by UNIQUENESS,
/// RELATIONSHIP, and business-rule validators.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn fetch_by_id(&self, model: &str, id: DbId) -> Result<Option<Value>, CoreError>;

    /// Records of `model` whose `field` equals `value`.
    async fn filter_by_field(
        &self,
        model: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, CoreError>;

    async fn exists(&self, model: &str, id: DbId) -> Result<bool, CoreError>;
}

/// Timestamp source for `validated_at` and `override_at`.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Utc::now()
    }
}

/// Externally supplied authorization check for overrides.
pub trait OverrideAuthorizer: Send + Sync {
    fn can_override(&self, actor: &Actor, outcome: &Outcome) -> bool;
}

/// Grants overrides to admins and actors holding the explicit flag.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagAuthorizer;

impl OverrideAuthorizer for FlagAuthorizer {
    fn can_override(&self, actor: &Actor, _outcome: &Outcome) -> bool {
        actor.is_admin || actor.can_override_validations
    }
}
