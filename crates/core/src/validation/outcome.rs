//! Outcome records: one immutable row per (rule, evaluation call).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::rules::{RuleType, Severity};
use crate::error::CoreError;
use crate::types::{DbId, ScopeId, Timestamp};

/// Result of evaluating one rule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Passed,
    Failed,
    Skipped,
    /// The validator could not evaluate its input. Diagnostic only; never blocks.
    Error,
}

impl OutcomeStatus {
    pub const ALL: [OutcomeStatus; 4] = [
        OutcomeStatus::Passed,
        OutcomeStatus::Failed,
        OutcomeStatus::Skipped,
        OutcomeStatus::Error,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CoreError::Internal(format!("Unknown outcome status '{s}'")))
    }
}

/// A persisted outcome.
///
/// Everything except the `override_*` fields and `was_overridden` is fixed at
/// insert time. `was_overridden` flips from `false` to `true` at most once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Outcome {
    pub id: DbId,
    pub evaluation_id: Uuid,
    pub rule_id: DbId,
    pub target_model: String,
    pub target_id: Option<DbId>,
    pub target_field: String,
    pub status: OutcomeStatus,
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

/// An outcome ready to be recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutcome {
    pub evaluation_id: Uuid,
    pub rule_id: DbId,
    pub target_model: String,
    pub target_id: Option<DbId>,
    pub target_field: String,
    pub status: OutcomeStatus,
    pub error_message: String,
    pub details: Value,
    pub validated_by: Option<DbId>,
    pub validated_at: Timestamp,
    pub was_blocked: bool,
}

impl NewOutcome {
    /// The counter increment this outcome contributes to its rule.
    pub fn counter_delta(&self) -> CounterTally {
        CounterTally::of(self.status)
    }
}

/// A pair of rule counters, either cached on the rule or recomputed from
/// the outcome log.
///
/// `checks` counts every evaluated outcome (SKIPPED excluded);
/// `failures` counts FAILED only.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterTally {
    pub checks: i64,
    pub failures: i64,
}

impl CounterTally {
    pub fn of(status: OutcomeStatus) -> Self {
        Self {
            checks: i64::from(status != OutcomeStatus::Skipped),
            failures: i64::from(status == OutcomeStatus::Failed),
        }
    }

    pub fn add(&mut self, other: CounterTally) {
        self.checks += other.checks;
        self.failures += other.failures;
    }

    pub fn is_zero(&self) -> bool {
        self.checks == 0 && self.failures == 0
    }
}

/// Result of reconciling one rule's counters. `recomputed` is what the
/// counters hold afterwards.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Reconciliation {
    pub rule_id: DbId,
    pub cached: CounterTally,
    pub recomputed: CounterTally,
}

impl Reconciliation {
    pub fn was_consistent(&self) -> bool {
        self.cached == self.recomputed
    }
}

/// The override fields written by a successful override.
#[derive(Debug, Clone)]
pub struct OverrideStamp {
    pub by: DbId,
    pub reason: String,
    pub at: Timestamp,
}

/// Result of a guarded override write.
///
/// Stores decide atomically; the manager maps the variant to an error.
#[derive(Debug, Clone)]
pub enum OverrideWrite {
    Applied(Outcome),
    NotFound,
    NotFailed(OutcomeStatus),
    AlreadyOverridden,
}

/// Time window and filters for a report scan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutcomeQuery {
    pub target_model: Option<String>,
    pub start: Option<Timestamp>,
    /// Exclusive upper bound.
    pub end: Option<Timestamp>,
    /// Restrict to outcomes of rules owned by this scope; global rules are
    /// excluded. `None` reports across every scope.
    pub scope_id: ScopeId,
}

impl OutcomeQuery {
    pub fn contains(&self, at: Timestamp) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at < end)
    }
}

/// An outcome joined with the rule attributes reports group by.
#[derive(Debug, Clone)]
pub struct OutcomeWithRule {
    pub outcome: Outcome,
    pub rule_name: String,
    pub severity: Severity,
    pub rule_type: RuleType,
    pub scope_id: ScopeId,
}
