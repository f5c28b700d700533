use crate::types::DbId;
use crate::validation::outcome::OutcomeStatus;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// A rule configuration was rejected at authoring time. The rule was not persisted.
    #[error("Invalid rule configuration: {0}")]
    Configuration(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Outcome {outcome_id} has already been overridden")]
    AlreadyOverridden { outcome_id: DbId },

    #[error("Outcome {outcome_id} has status '{status}'; only failed outcomes can be overridden")]
    NotFailed {
        outcome_id: DbId,
        status: OutcomeStatus,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
