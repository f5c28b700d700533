//! Enginel validation / policy engine.
//!
//! Checks structured records against stored business rules before they are
//! accepted, producing an append-only outcome trail with tiered severities,
//! conditional scoping, and administrative override. Everything here is free
//! of database dependencies; Postgres persistence lives in `enginel-db`.

pub mod config;
pub mod error;
pub mod types;
pub mod validation;
