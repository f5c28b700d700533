//! Result recorder: persists outcome rows together with counter increments,
//! and reconciles the cached counters against the outcome log.

use super::outcome::{NewOutcome, Outcome, Reconciliation};
use super::store::ValidationStore;
use crate::error::CoreError;
use crate::types::DbId;

pub struct ResultRecorder<'a> {
    store: &'a dyn ValidationStore,
}

impl<'a> ResultRecorder<'a> {
    pub fn new(store: &'a dyn ValidationStore) -> Self {
        Self { store }
    }

    /// Write every outcome of one evaluation call atomically. An empty batch
    /// performs no write.
    pub async fn record(&self, pending: Vec<NewOutcome>) -> Result<Vec<Outcome>, CoreError> {
        if pending.is_empty() {
            return Ok(Vec::new());
        }
        let count = pending.len();
        let written = self.store.record_outcomes(pending).await.map_err(|e| {
            tracing::error!(error = %e, outcomes = count, "Failed to record validation outcomes");
            e
        })?;
        Ok(written)
    }

    /// Rewrite a rule's cached counters from the outcome log.
    ///
    /// The store recomputes and writes in one step that is atomic with
    /// respect to [`Self::record`], so no concurrently recorded outcome is
    /// lost from the counters.
    pub async fn reconcile(&self, rule_id: DbId) -> Result<Reconciliation, CoreError> {
        let result = self
            .store
            .reconcile_counters(rule_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "validation_rule",
                id: rule_id,
            })?;
        if !result.was_consistent() {
            tracing::warn!(
                rule_id,
                cached_checks = result.cached.checks,
                cached_failures = result.cached.failures,
                checks = result.recomputed.checks,
                failures = result.recomputed.failures,
                "Rule counters drifted from outcome log; rewritten",
            );
        }
        Ok(result)
    }
}
