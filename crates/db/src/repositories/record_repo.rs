//! Read-only lookups against the tables holding validated records.
//!
//! Table names are interpolated into SQL, so callers must pass names that
//! passed [`is_identifier`]. Field names and values are always bound.

use enginel_core::types::DbId;
use serde_json::Value;
use sqlx::PgPool;

/// Whether `name` is a plain lowercase SQL identifier, optionally
/// schema-qualified (`schema.table`).
pub fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').count() <= 2
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|c| c.is_ascii_lowercase() || c == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
        })
}

/// Generic row access returning each row as a JSON object.
pub struct RecordRepo;

impl RecordRepo {
    /// Fetch one row by `id`.
    pub async fn fetch_by_id(
        pool: &PgPool,
        table: &str,
        id: DbId,
    ) -> Result<Option<Value>, sqlx::Error> {
        let query = format!("SELECT to_jsonb(t) FROM {table} t WHERE t.id = $1");
        sqlx::query_scalar::<_, Value>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Rows whose `field` equals `value` (JSONB equality, so `1` matches `1.0`).
    pub async fn filter_by_field(
        pool: &PgPool,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Value>, sqlx::Error> {
        let query = format!(
            "SELECT to_jsonb(t) FROM {table} t WHERE to_jsonb(t) -> $1 = $2::JSONB ORDER BY t.id"
        );
        sqlx::query_scalar::<_, Value>(&query)
            .bind(field)
            .bind(value)
            .fetch_all(pool)
            .await
    }

    /// Whether a row with `id` exists.
    pub async fn exists(pool: &PgPool, table: &str, id: DbId) -> Result<bool, sqlx::Error> {
        let query = format!("SELECT EXISTS (SELECT 1 FROM {table} WHERE id = $1)");
        sqlx::query_scalar::<_, bool>(&query)
            .bind(id)
            .fetch_one(pool)
            .await
    }
}
