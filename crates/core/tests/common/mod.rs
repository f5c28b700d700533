#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use enginel_core::config::EngineConfig;
use enginel_core::validation::memory::{MemoryRecordStore, MemoryValidationStore};
use enginel_core::validation::store::RecordStore;
use enginel_core::validation::validators::ValidatorRegistry;
use enginel_core::validation::{Actor, CreateRule, Record, Rule, ValidationEngine};
use serde_json::{Map, Value};

pub struct Harness {
    pub engine: Arc<ValidationEngine>,
    pub store: Arc<MemoryValidationStore>,
    pub records: Arc<MemoryRecordStore>,
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        validator_timeout: Duration::from_millis(200),
        rule_cache_ttl: Duration::ZERO,
        ..EngineConfig::default()
    }
}

pub fn harness() -> Harness {
    harness_with(test_config(), ValidatorRegistry::new())
}

pub fn harness_with(config: EngineConfig, registry: ValidatorRegistry) -> Harness {
    let store = Arc::new(MemoryValidationStore::new());
    let records = Arc::new(MemoryRecordStore::new());
    let engine = ValidationEngine::new(store.clone(), records.clone(), config)
        .with_registry(registry);
    Harness {
        engine: Arc::new(engine),
        store,
        records,
    }
}

/// Engine over a caller-supplied record store.
pub fn harness_with_records(
    config: EngineConfig,
    records: Arc<dyn RecordStore>,
) -> (Arc<ValidationEngine>, Arc<MemoryValidationStore>) {
    let store = Arc::new(MemoryValidationStore::new());
    let engine = ValidationEngine::new(store.clone(), records, config);
    (Arc::new(engine), store)
}

pub fn admin() -> Actor {
    Actor::admin(1)
}

pub fn engineer() -> Actor {
    Actor::new(2)
}

pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

pub fn asset(fields: Value) -> Record {
    Record::new("DesignAsset", object(fields))
}

pub fn rule_input(value: Value) -> CreateRule {
    serde_json::from_value(value).expect("valid CreateRule")
}

pub async fn create_rule(engine: &ValidationEngine, value: Value) -> Rule {
    engine
        .create_rule(rule_input(value), &admin())
        .await
        .expect("rule created")
}
