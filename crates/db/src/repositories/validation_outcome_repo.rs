//! Repository for the append-only `validation_outcomes` log.
//!
//! Rows are inserted once per (rule, evaluation) and never deleted. The only
//! update is [`ValidationOutcomeRepo::apply_override`], guarded so that it
//! succeeds at most once per outcome.

use std::collections::BTreeMap;

use enginel_core::types::{DbId, Timestamp};
use enginel_core::validation::outcome::{CounterTally, NewOutcome};
use enginel_core::validation::OutcomeQuery;
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::ValidationRuleRepo;
use crate::models::validation::{OutcomeReportRow, ValidationOutcomeRow};

/// Column list for `validation_outcomes` queries.
const COLUMNS: &str = "id, evaluation_id, rule_id, target_model, target_id, target_field, \
     status, error_message, details, validated_by, validated_at, was_blocked, \
     was_overridden, override_reason, override_by, override_at";

/// Same columns qualified with the `o` alias, for joins.
const JOINED_COLUMNS: &str = "o.id, o.evaluation_id, o.rule_id, o.target_model, o.target_id, \
     o.target_field, o.status, o.error_message, o.details, o.validated_by, o.validated_at, \
     o.was_blocked, o.was_overridden, o.override_reason, o.override_by, o.override_at";

/// Provides insert, lookup, override, and scan operations for outcomes.
pub struct ValidationOutcomeRepo;

impl ValidationOutcomeRepo {
    /// Insert every outcome of one evaluation call and bump the owning
    /// rules' counters in a single transaction.
    ///
    /// Counter updates are applied in rule-ID order so concurrent batches
    /// lock rule rows consistently.
    pub async fn create_batch(
        pool: &PgPool,
        outcomes: &[NewOutcome],
    ) -> Result<Vec<ValidationOutcomeRow>, sqlx::Error> {
        let insert = format!(
            "INSERT INTO validation_outcomes \
                (evaluation_id, rule_id, target_model, target_id, target_field, status, \
                 error_message, details, validated_by, validated_at, was_blocked) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );

        let mut tx = pool.begin().await?;
        let mut rows = Vec::with_capacity(outcomes.len());
        let mut deltas: BTreeMap<DbId, CounterTally> = BTreeMap::new();

        for outcome in outcomes {
            let row = sqlx::query_as::<_, ValidationOutcomeRow>(&insert)
                .bind(outcome.evaluation_id)
                .bind(outcome.rule_id)
                .bind(&outcome.target_model)
                .bind(outcome.target_id)
                .bind(&outcome.target_field)
                .bind(outcome.status.as_str())
                .bind(&outcome.error_message)
                .bind(&outcome.details)
                .bind(outcome.validated_by)
                .bind(outcome.validated_at)
                .bind(outcome.was_blocked)
                .fetch_one(&mut *tx)
                .await?;
            deltas
                .entry(outcome.rule_id)
                .or_default()
                .add(outcome.counter_delta());
            rows.push(row);
        }

        for (rule_id, delta) in deltas {
            if !delta.is_zero() {
                ValidationRuleRepo::increment_counters(&mut *tx, rule_id, delta).await?;
            }
        }

        tx.commit().await?;
        Ok(rows)
    }

    /// Find an outcome by its internal ID.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ValidationOutcomeRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM validation_outcomes WHERE id = $1");
        sqlx::query_as::<_, ValidationOutcomeRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// All outcomes produced by one evaluation call, in insertion order.
    pub async fn list_by_evaluation(
        pool: &PgPool,
        evaluation_id: Uuid,
    ) -> Result<Vec<ValidationOutcomeRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM validation_outcomes WHERE evaluation_id = $1 ORDER BY id"
        );
        sqlx::query_as::<_, ValidationOutcomeRow>(&query)
            .bind(evaluation_id)
            .fetch_all(pool)
            .await
    }

    /// Mark a FAILED, not-yet-overridden outcome as overridden.
    ///
    /// Returns `None` when the guard does not match (missing row, wrong
    /// status, or already overridden); the caller re-reads to tell which.
    pub async fn apply_override(
        pool: &PgPool,
        id: DbId,
        override_by: DbId,
        reason: &str,
        at: Timestamp,
    ) -> Result<Option<ValidationOutcomeRow>, sqlx::Error> {
        let query = format!(
            "UPDATE validation_outcomes SET \
                was_overridden = true, \
                override_by = $2, \
                override_reason = $3, \
                override_at = $4 \
             WHERE id = $1 AND status = 'failed' AND was_overridden = false \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ValidationOutcomeRow>(&query)
            .bind(id)
            .bind(override_by)
            .bind(reason)
            .bind(at)
            .fetch_optional(pool)
            .await
    }

    /// Outcomes inside the query window joined with their rule.
    ///
    /// With a scope, only outcomes of rules owned by that scope are
    /// returned; global rules are left out.
    pub async fn scan(
        pool: &PgPool,
        query: &OutcomeQuery,
    ) -> Result<Vec<OutcomeReportRow>, sqlx::Error> {
        let sql = format!(
            "SELECT {JOINED_COLUMNS}, \
                    r.name AS rule_name, r.severity AS rule_severity, \
                    r.rule_type AS rule_type, r.scope_id AS rule_scope_id \
             FROM validation_outcomes o \
             JOIN validation_rules r ON r.id = o.rule_id \
             WHERE ($1::TEXT IS NULL OR o.target_model = $1) \
               AND ($2::TIMESTAMPTZ IS NULL OR o.validated_at >= $2) \
               AND ($3::TIMESTAMPTZ IS NULL OR o.validated_at < $3) \
               AND ($4::BIGINT IS NULL OR r.scope_id = $4) \
             ORDER BY o.id"
        );
        sqlx::query_as::<_, OutcomeReportRow>(&sql)
            .bind(query.target_model.as_deref())
            .bind(query.start)
            .bind(query.end)
            .bind(query.scope_id)
            .fetch_all(pool)
            .await
    }

    /// Recompute a rule's counters from the log.
    pub async fn tally<'e, E>(executor: E, rule_id: DbId) -> Result<CounterTally, sqlx::Error>
    where
        E: PgExecutor<'e>,
    {
        let (checks, failures): (i64, i64) = sqlx::query_as(
            "SELECT \
                COUNT(*) FILTER (WHERE status <> 'skipped'), \
                COUNT(*) FILTER (WHERE status = 'failed') \
             FROM validation_outcomes WHERE rule_id = $1",
        )
        .bind(rule_id)
        .fetch_one(executor)
        .await?;
        Ok(CounterTally { checks, failures })
    }
}
