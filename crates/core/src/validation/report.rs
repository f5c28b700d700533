//! Report aggregator: read-only statistics computed from the outcome log.
//!
//! Reports never read the cached rule counters, so they stay correct even
//! when counters were reset or never initialised.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::evaluator::EvaluatedOutcome;
use super::outcome::{CounterTally, OutcomeQuery, OutcomeStatus, OutcomeWithRule};
use super::store::ValidationStore;
use crate::error::CoreError;
use crate::types::{DbId, ScopeId, Timestamp};

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub blocked: u64,
    pub overridden: u64,
}

impl OutcomeCounts {
    fn add(&mut self, status: OutcomeStatus, was_blocked: bool, was_overridden: bool) {
        self.total += 1;
        match status {
            OutcomeStatus::Passed => self.passed += 1,
            OutcomeStatus::Failed => self.failed += 1,
            OutcomeStatus::Skipped => self.skipped += 1,
            OutcomeStatus::Error => self.errored += 1,
        }
        self.blocked += u64::from(was_blocked);
        self.overridden += u64::from(was_overridden);
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ReportPeriod {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleFailureCount {
    pub rule_id: DbId,
    pub rule_name: String,
    pub failures: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ValidationReport {
    pub period: ReportPeriod,
    pub target_model: Option<String>,
    pub scope_id: ScopeId,
    pub counts: OutcomeCounts,
    /// Outcomes per rule severity, all statuses.
    pub by_severity: BTreeMap<String, u64>,
    /// Outcomes per rule type, all statuses.
    pub by_rule_type: BTreeMap<String, u64>,
    /// Rules with the most FAILED outcomes, descending.
    pub top_failing_rules: Vec<RuleFailureCount>,
    /// `passed / total` as a percentage, two decimals. Zero when empty.
    pub pass_rate: f64,
}

/// Counts for one rule, cached and recomputed side by side.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RuleStatistics {
    pub rule_id: DbId,
    pub name: String,
    pub is_active: bool,
    pub total_checks: i64,
    pub total_failures: i64,
    /// `total_failures / total_checks` as a percentage, two decimals.
    pub failure_rate: f64,
    pub recomputed: CounterTally,
    pub consistent: bool,
}

/// Summary over every outcome of a batch.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct BatchSummary {
    pub total: u64,
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errored: u64,
    pub pass_rate: f64,
    /// FAILED outcomes per severity.
    pub by_severity: BTreeMap<String, u64>,
}

pub(crate) fn percentage(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    let raw = part as f64 / whole as f64 * 100.0;
    (raw * 100.0).round() / 100.0
}

/// Fold scanned rows into a report.
pub fn aggregate(rows: &[OutcomeWithRule], query: &OutcomeQuery, top_n: usize) -> ValidationReport {
    let mut counts = OutcomeCounts::default();
    let mut by_severity = BTreeMap::new();
    let mut by_rule_type = BTreeMap::new();
    let mut failures: HashMap<DbId, RuleFailureCount> = HashMap::new();

    for row in rows {
        let outcome = &row.outcome;
        counts.add(outcome.status, outcome.was_blocked, outcome.was_overridden);
        *by_severity
            .entry(row.severity.as_str().to_string())
            .or_insert(0) += 1;
        *by_rule_type
            .entry(row.rule_type.as_str().to_string())
            .or_insert(0) += 1;

        if outcome.status == OutcomeStatus::Failed {
            failures
                .entry(outcome.rule_id)
                .or_insert_with(|| RuleFailureCount {
                    rule_id: outcome.rule_id,
                    rule_name: row.rule_name.clone(),
                    failures: 0,
                })
                .failures += 1;
        }
    }

    let mut top_failing_rules: Vec<RuleFailureCount> = failures.into_values().collect();
    top_failing_rules.sort_by(|a, b| {
        b.failures
            .cmp(&a.failures)
            .then(a.rule_id.cmp(&b.rule_id))
    });
    top_failing_rules.truncate(top_n);

    ValidationReport {
        period: ReportPeriod {
            start: query.start,
            end: query.end,
        },
        target_model: query.target_model.clone(),
        scope_id: query.scope_id,
        pass_rate: percentage(counts.passed, counts.total),
        counts,
        by_severity,
        by_rule_type,
        top_failing_rules,
    }
}

/// Summarise the outcomes of a batch of evaluations.
pub fn summarize<'a, I>(outcomes: I) -> BatchSummary
where
    I: IntoIterator<Item = &'a EvaluatedOutcome>,
{
    let mut counts = OutcomeCounts::default();
    let mut by_severity = BTreeMap::new();
    for o in outcomes {
        counts.add(o.outcome.status, false, false);
        if o.outcome.status == OutcomeStatus::Failed {
            *by_severity
                .entry(o.severity.as_str().to_string())
                .or_insert(0) += 1;
        }
    }
    BatchSummary {
        total: counts.total,
        passed: counts.passed,
        failed: counts.failed,
        skipped: counts.skipped,
        errored: counts.errored,
        pass_rate: percentage(counts.passed, counts.total),
        by_severity,
    }
}

pub struct ReportAggregator<'a> {
    store: &'a dyn ValidationStore,
    top_n: usize,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(store: &'a dyn ValidationStore, top_n: usize) -> Self {
        Self { store, top_n }
    }

    pub async fn report(&self, query: &OutcomeQuery) -> Result<ValidationReport, CoreError> {
        let rows = self.store.scan_outcomes(query).await?;
        Ok(aggregate(&rows, query, self.top_n))
    }

    pub async fn rule_statistics(&self, rule_id: DbId) -> Result<RuleStatistics, CoreError> {
        let rule = self.store.find_rule(rule_id).await?.ok_or(CoreError::NotFound {
            entity: "validation_rule",
            id: rule_id,
        })?;
        let recomputed = self.store.tally_rule(rule_id).await?;
        let consistent =
            recomputed.checks == rule.total_checks && recomputed.failures == rule.total_failures;
        Ok(RuleStatistics {
            rule_id,
            failure_rate: percentage(
                rule.total_failures.max(0) as u64,
                rule.total_checks.max(0) as u64,
            ),
            name: rule.name,
            is_active: rule.is_active,
            total_checks: rule.total_checks,
            total_failures: rule.total_failures,
            recomputed,
            consistent,
        })
    }
}
