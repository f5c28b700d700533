//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods
//! that accept `&PgPool` as the first argument.

pub mod record_repo;
pub mod validation_outcome_repo;
pub mod validation_rule_repo;

pub use record_repo::RecordRepo;
pub use validation_outcome_repo::ValidationOutcomeRepo;
pub use validation_rule_repo::ValidationRuleRepo;
