//! Row types and DTOs for the validation tables.

pub mod validation;
