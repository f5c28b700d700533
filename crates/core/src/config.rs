use std::str::FromStr;
use std::time::Duration;

use crate::error::CoreError;

/// Default minimum override reason length, in characters.
pub const DEFAULT_MIN_OVERRIDE_REASON_LEN: usize = 10;

/// Default per-validator timeout.
pub const DEFAULT_VALIDATOR_TIMEOUT_MS: u64 = 5_000;

/// Default TTL of the read-through rule cache.
pub const DEFAULT_RULE_CACHE_TTL_SECS: u64 = 30;

/// Default number of entries in a report's `top_failing_rules`.
pub const DEFAULT_REPORT_TOP_FAILING: usize = 10;

/// Validation engine configuration.
///
/// All fields have defaults suitable for local development.
/// In production, override via environment variables.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Minimum length (trimmed, in characters) of an override reason.
    pub min_override_reason_len: usize,
    /// Upper bound on a single validator invocation. Elapsing yields an
    /// ERROR outcome, never FAILED.
    pub validator_timeout: Duration,
    /// TTL of the `(target_model, scope)` rule cache. Zero disables caching.
    pub rule_cache_ttl: Duration,
    /// How many rules `report()` lists under `top_failing_rules`.
    pub report_top_failing: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_override_reason_len: DEFAULT_MIN_OVERRIDE_REASON_LEN,
            validator_timeout: Duration::from_millis(DEFAULT_VALIDATOR_TIMEOUT_MS),
            rule_cache_ttl: Duration::from_secs(DEFAULT_RULE_CACHE_TTL_SECS),
            report_top_failing: DEFAULT_REPORT_TOP_FAILING,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default |
    /// |---------------------------|---------|
    /// | `OVERRIDE_MIN_REASON_LEN` | `10`    |
    /// | `VALIDATOR_TIMEOUT_MS`    | `5000`  |
    /// | `RULE_CACHE_TTL_SECS`     | `30`    |
    /// | `REPORT_TOP_FAILING`      | `10`    |
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let min_override_reason_len = parse_var(
            &lookup,
            "OVERRIDE_MIN_REASON_LEN",
            DEFAULT_MIN_OVERRIDE_REASON_LEN,
        )?;
        let validator_timeout_ms =
            parse_var(&lookup, "VALIDATOR_TIMEOUT_MS", DEFAULT_VALIDATOR_TIMEOUT_MS)?;
        if validator_timeout_ms == 0 {
            return Err(CoreError::Validation(
                "VALIDATOR_TIMEOUT_MS must be greater than zero".to_string(),
            ));
        }
        let rule_cache_ttl_secs =
            parse_var(&lookup, "RULE_CACHE_TTL_SECS", DEFAULT_RULE_CACHE_TTL_SECS)?;
        let report_top_failing =
            parse_var(&lookup, "REPORT_TOP_FAILING", DEFAULT_REPORT_TOP_FAILING)?;

        Ok(Self {
            min_override_reason_len,
            validator_timeout: Duration::from_millis(validator_timeout_ms),
            rule_cache_ttl: Duration::from_secs(rule_cache_ttl_secs),
            report_top_failing,
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, CoreError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            CoreError::Validation(format!("{key} must be a valid number, got '{raw}'"))
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.min_override_reason_len, 10);
        assert_eq!(config.validator_timeout, Duration::from_millis(5_000));
        assert_eq!(config.rule_cache_ttl, Duration::from_secs(30));
        assert_eq!(config.report_top_failing, 10);
    }

    #[test]
    fn overrides_from_lookup() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("OVERRIDE_MIN_REASON_LEN", "20"),
            ("VALIDATOR_TIMEOUT_MS", "250"),
            ("RULE_CACHE_TTL_SECS", "0"),
            ("REPORT_TOP_FAILING", "3"),
        ]))
        .unwrap();
        assert_eq!(config.min_override_reason_len, 20);
        assert_eq!(config.validator_timeout, Duration::from_millis(250));
        assert!(config.rule_cache_ttl.is_zero());
        assert_eq!(config.report_top_failing, 3);
    }

    #[test]
    fn blank_value_falls_back_to_default() {
        let config = EngineConfig::from_lookup(lookup(&[("REPORT_TOP_FAILING", "  ")])).unwrap();
        assert_eq!(config.report_top_failing, 10);
    }

    #[test]
    fn rejects_unparsable_value() {
        let result = EngineConfig::from_lookup(lookup(&[("VALIDATOR_TIMEOUT_MS", "soon")]));
        assert_matches!(result, Err(CoreError::Validation(msg)) if msg.contains("VALIDATOR_TIMEOUT_MS"));
    }

    #[test]
    fn rejects_zero_timeout() {
        let result = EngineConfig::from_lookup(lookup(&[("VALIDATOR_TIMEOUT_MS", "0")]));
        assert!(result.is_err());
    }
}
