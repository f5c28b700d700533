//! Override manager: authorized, retroactive acknowledgment of a FAILED
//! outcome. The original status is never changed.

use super::outcome::{Outcome, OutcomeStatus, OverrideStamp, OverrideWrite};
use super::rules::Actor;
use super::store::{Clock, OverrideAuthorizer, ValidationStore};
use crate::error::CoreError;
use crate::types::DbId;

pub struct OverrideManager<'a> {
    store: &'a dyn ValidationStore,
    authorizer: &'a dyn OverrideAuthorizer,
    clock: &'a dyn Clock,
    min_reason_len: usize,
}

impl<'a> OverrideManager<'a> {
    pub fn new(
        store: &'a dyn ValidationStore,
        authorizer: &'a dyn OverrideAuthorizer,
        clock: &'a dyn Clock,
        min_reason_len: usize,
    ) -> Self {
        Self {
            store,
            authorizer,
            clock,
            min_reason_len,
        }
    }

    /// Preconditions are checked in order: reason length, existence,
    /// authorization, FAILED status, not yet overridden. The final write is
    /// conditional, so of several concurrent callers exactly one succeeds and
    /// the rest get [`CoreError::AlreadyOverridden`].
    pub async fn override_outcome(
        &self,
        outcome_id: DbId,
        actor: &Actor,
        reason: &str,
    ) -> Result<Outcome, CoreError> {
        let reason = reason.trim();
        if reason.chars().count() < self.min_reason_len {
            return Err(CoreError::Validation(format!(
                "Override reason must be at least {} characters",
                self.min_reason_len
            )));
        }

        let outcome = self
            .store
            .find_outcome(outcome_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "validation_outcome",
                id: outcome_id,
            })?;

        if !self.authorizer.can_override(actor, &outcome) {
            tracing::warn!(outcome_id, actor_id = actor.id, "Override denied");
            return Err(CoreError::PermissionDenied(format!(
                "Actor {} may not override validation outcomes",
                actor.id
            )));
        }
        if outcome.status != OutcomeStatus::Failed {
            return Err(CoreError::NotFailed {
                outcome_id,
                status: outcome.status,
            });
        }
        if outcome.was_overridden {
            return Err(CoreError::AlreadyOverridden { outcome_id });
        }

        let stamp = OverrideStamp {
            by: actor.id,
            reason: reason.to_string(),
            at: self.clock.now(),
        };
        match self.store.apply_override(outcome_id, stamp).await? {
            OverrideWrite::Applied(updated) => {
                tracing::info!(
                    outcome_id,
                    rule_id = updated.rule_id,
                    actor_id = actor.id,
                    "Validation outcome overridden",
                );
                Ok(updated)
            }
            OverrideWrite::AlreadyOverridden => Err(CoreError::AlreadyOverridden { outcome_id }),
            OverrideWrite::NotFailed(status) => Err(CoreError::NotFailed { outcome_id, status }),
            OverrideWrite::NotFound => Err(CoreError::NotFound {
                entity: "validation_outcome",
                id: outcome_id,
            }),
        }
    }
}
