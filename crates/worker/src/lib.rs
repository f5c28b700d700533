//! Background maintenance for the validation engine.
//!
//! The worker periodically recomputes every rule's cached counters from the
//! outcome log and rewrites the ones that drifted.

pub mod config;
pub mod reconcile;
