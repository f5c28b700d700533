use std::time::Duration;

use enginel_core::config::EngineConfig;
use enginel_core::error::CoreError;

/// Default maximum number of pooled database connections.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;

/// Default pause between reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub reconcile_interval: Duration,
    pub engine: EngineConfig,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                   | Default    |
    /// |---------------------------|------------|
    /// | `DATABASE_URL`            | (required) |
    /// | `DB_MAX_CONNECTIONS`      | `20`       |
    /// | `RECONCILE_INTERVAL_SECS` | `300`      |
    ///
    /// Engine settings are read as documented on [`EngineConfig::from_env`].
    pub fn from_env() -> Result<Self, CoreError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| CoreError::Validation("DATABASE_URL must be set".to_string()))?;

        let max_connections = match lookup("DB_MAX_CONNECTIONS") {
            Some(raw) => raw.trim().parse::<u32>().ok().filter(|n| *n > 0).ok_or_else(|| {
                CoreError::Validation(format!(
                    "DB_MAX_CONNECTIONS must be a positive integer, got '{raw}'"
                ))
            })?,
            None => DEFAULT_DB_MAX_CONNECTIONS,
        };

        let interval_secs = match lookup("RECONCILE_INTERVAL_SECS") {
            Some(raw) => raw.trim().parse::<u64>().ok().filter(|n| *n > 0).ok_or_else(|| {
                CoreError::Validation(format!(
                    "RECONCILE_INTERVAL_SECS must be a positive integer, got '{raw}'"
                ))
            })?,
            None => DEFAULT_RECONCILE_INTERVAL_SECS,
        };

        Ok(Self {
            database_url,
            max_connections,
            reconcile_interval: Duration::from_secs(interval_secs),
            engine: EngineConfig::from_lookup(&lookup)?,
        })
    }
}
