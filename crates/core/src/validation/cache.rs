//! Short-TTL read-through cache of rule lists keyed by `(target_model, scope)`.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;

use super::rules::Rule;
use crate::error::CoreError;
use crate::types::ScopeId;

type CacheKey = (String, ScopeId);

/// Rule edits become visible after at most `ttl`, or immediately when made
/// through the same engine (which invalidates on every write).
#[derive(Debug)]
pub struct RuleCache {
    ttl: Duration,
    entries: RwLock<HashMap<CacheKey, (Instant, Arc<Vec<Rule>>)>>,
}

impl RuleCache {
    /// A zero `ttl` disables caching; every lookup goes to the loader.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero()
    }

    /// Return the cached rules for `(model, scope)`, loading them on a miss
    /// or after expiry.
    pub async fn get_or_load<F, Fut>(
        &self,
        model: &str,
        scope_id: ScopeId,
        load: F,
    ) -> Result<Arc<Vec<Rule>>, CoreError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Rule>, CoreError>>,
    {
        if !self.is_enabled() {
            return load().await.map(Arc::new);
        }

        let key = (model.to_string(), scope_id);
        if let Some((loaded_at, rules)) = self.entries.read().await.get(&key) {
            if loaded_at.elapsed() < self.ttl {
                return Ok(Arc::clone(rules));
            }
        }

        let rules = Arc::new(load().await?);
        self.entries
            .write()
            .await
            .insert(key, (Instant::now(), Arc::clone(&rules)));
        Ok(rules)
    }

    pub async fn invalidate_all(&self) {
        self.entries.write().await.clear();
    }
}
