//! Repository for validation rules.
//!
//! There is no delete: rules are retired by setting `is_active = false`.

use enginel_core::types::{DbId, Timestamp};
use enginel_core::validation::outcome::CounterTally;
use enginel_core::validation::rules::WILDCARD_MODEL;
use enginel_core::validation::{RuleFilter, ScopeFilter};
use sqlx::{PgConnection, PgPool};

use super::ValidationOutcomeRepo;
use crate::models::validation::{CreateValidationRule, UpdateValidationRule, ValidationRuleRow};

/// Column list for `validation_rules` queries.
const COLUMNS: &str = "id, name, description, rule_type, target_model, target_field, \
     rule_config, error_message, severity, is_active, apply_on_create, apply_on_update, \
     conditions, scope_id, created_by, total_checks, total_failures, created_at, updated_at";

/// Provides CRUD operations for validation rules.
pub struct ValidationRuleRepo;

impl ValidationRuleRepo {
    /// Insert a new rule, returning the created row.
    pub async fn create(
        pool: &PgPool,
        input: &CreateValidationRule,
        now: Timestamp,
    ) -> Result<ValidationRuleRow, sqlx::Error> {
        let query = format!(
            "INSERT INTO validation_rules \
                (name, description, rule_type, target_model, target_field, rule_config, \
                 error_message, severity, is_active, apply_on_create, apply_on_update, \
                 conditions, scope_id, created_by, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $15) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ValidationRuleRow>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(input.rule_type)
            .bind(&input.target_model)
            .bind(&input.target_field)
            .bind(&input.rule_config)
            .bind(&input.error_message)
            .bind(input.severity)
            .bind(input.is_active)
            .bind(input.apply_on_create)
            .bind(input.apply_on_update)
            .bind(&input.conditions)
            .bind(input.scope_id)
            .bind(input.created_by)
            .bind(now)
            .fetch_one(pool)
            .await
    }

    /// Update a rule. Only non-`None` fields in `input` are applied.
    ///
    /// Returns `None` if no row with the given `id` exists.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateValidationRule,
        now: Timestamp,
    ) -> Result<Option<ValidationRuleRow>, sqlx::Error> {
        let query = format!(
            "UPDATE validation_rules SET \
                description = COALESCE($2, description), \
                rule_config = COALESCE($3, rule_config), \
                error_message = COALESCE($4, error_message), \
                severity = COALESCE($5, severity), \
                is_active = COALESCE($6, is_active), \
                apply_on_create = COALESCE($7, apply_on_create), \
                apply_on_update = COALESCE($8, apply_on_update), \
                conditions = COALESCE($9, conditions), \
                updated_at = $10 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, ValidationRuleRow>(&query)
            .bind(id)
            .bind(&input.description)
            .bind(&input.rule_config)
            .bind(&input.error_message)
            .bind(input.severity)
            .bind(input.is_active)
            .bind(input.apply_on_create)
            .bind(input.apply_on_update)
            .bind(&input.conditions)
            .bind(now)
            .fetch_optional(pool)
            .await
    }

    /// Find a rule by its internal ID, active or not.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<ValidationRuleRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM validation_rules WHERE id = $1");
        sqlx::query_as::<_, ValidationRuleRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a rule by name within exactly one scope (`None` = global).
    pub async fn find_by_name(
        pool: &PgPool,
        name: &str,
        scope_id: Option<DbId>,
    ) -> Result<Option<ValidationRuleRow>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM validation_rules \
             WHERE name = $1 AND scope_id IS NOT DISTINCT FROM $2"
        );
        sqlx::query_as::<_, ValidationRuleRow>(&query)
            .bind(name)
            .bind(scope_id)
            .fetch_optional(pool)
            .await
    }

    /// List rules matching `filter`, ordered by ID.
    ///
    /// A model filter also matches wildcard rules. A filter applicable to
    /// scope `s` returns global rules plus rules of `s`; without a scope
    /// every rule qualifies.
    pub async fn list(
        pool: &PgPool,
        filter: &RuleFilter,
    ) -> Result<Vec<ValidationRuleRow>, sqlx::Error> {
        let scope_id = match filter.scope {
            ScopeFilter::Any => None,
            ScopeFilter::Applicable(scope_id) => scope_id,
        };
        let query = format!(
            "SELECT {COLUMNS} FROM validation_rules \
             WHERE ($1::TEXT IS NULL OR target_model = $1 OR target_model = $2) \
               AND ($3 = false OR is_active = true) \
               AND ($4::BIGINT IS NULL OR scope_id IS NULL OR scope_id = $4) \
             ORDER BY id"
        );
        sqlx::query_as::<_, ValidationRuleRow>(&query)
            .bind(filter.target_model.as_deref())
            .bind(WILDCARD_MODEL)
            .bind(filter.active_only)
            .bind(scope_id)
            .fetch_all(pool)
            .await
    }

    /// Add `delta` to a rule's cached counters.
    ///
    /// Takes a connection so the bump can share a transaction with the
    /// outcome inserts that caused it.
    pub async fn increment_counters(
        conn: &mut PgConnection,
        id: DbId,
        delta: CounterTally,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE validation_rules SET \
                total_checks = total_checks + $2, \
                total_failures = total_failures + $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(delta.checks)
        .bind(delta.failures)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Recompute a rule's counters from the outcome log and store them.
    ///
    /// Returns `(cached, recomputed)`, or `None` if the rule does not exist.
    /// The rule row stays locked from the read until commit, so a batch in
    /// [`ValidationOutcomeRepo::create_batch`] either committed before the
    /// tally or applies its increment on top of the rewritten values.
    pub async fn reconcile_counters(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<(CounterTally, CounterTally)>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let cached: Option<(i64, i64)> = sqlx::query_as(
            "SELECT total_checks, total_failures FROM validation_rules WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((checks, failures)) = cached else {
            return Ok(None);
        };
        let cached = CounterTally { checks, failures };

        let recomputed = ValidationOutcomeRepo::tally(&mut *tx, id).await?;
        if recomputed != cached {
            sqlx::query(
                "UPDATE validation_rules SET total_checks = $2, total_failures = $3 WHERE id = $1",
            )
            .bind(id)
            .bind(recomputed.checks)
            .bind(recomputed.failures)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Some((cached, recomputed)))
    }
}
