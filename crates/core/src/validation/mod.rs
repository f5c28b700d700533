//! Data validation engine.
//!
//! Rule types and typed rule configuration, the validator registry, the
//! condition matcher, and the engine that orchestrates evaluation, outcome
//! recording, overrides, and reporting over the store traits in [`store`].

pub mod business_rules;
pub mod cache;
pub mod conditions;
pub mod engine;
pub mod evaluator;
pub mod memory;
pub mod outcome;
pub mod overrides;
pub mod recorder;
pub mod report;
pub mod rule_config;
pub mod rules;
pub mod store;
pub mod validators;

pub use engine::{BatchResult, EvaluateOptions, RuleBypass, ValidationEngine};
pub use evaluator::{BlockedOperation, EvaluatedOutcome, EvaluationResult, FieldFailure};
pub use outcome::{Outcome, OutcomeQuery, OutcomeStatus};
pub use rule_config::RuleConfig;
pub use rules::{
    Actor, CreateRule, Operation, Record, Rule, RuleFilter, RuleType, ScopeFilter, Severity,
    UpdateRule,
};
