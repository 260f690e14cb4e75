//! Registry behaviour tests
//!
//! End-to-end checks through the public API: registration ordering,
//! transformation chains, concurrency and persistence.

use std::sync::Arc;

use adaptive_schemas::config::StoreBackend;
use adaptive_schemas::{
    FileStore, MemoryStore, MetadataValue, Record, SchemaConfig, SchemaDelta, SchemaError,
    SchemaMetadata, SchemaRegistry, SchemaStore,
};
use serde_json::{json, Value};
use tempfile::TempDir;

fn record(value: Value) -> Record {
    match value {
        Value::Object(map) => map,
        other => panic!("Expected object, got {:?}", other),
    }
}

fn rename(from: &str, to: &str) -> SchemaDelta {
    SchemaDelta::new()
        .add_field(to, "string")
        .remove_field(from, "string")
        .transform(to, from)
}

/// user: v1 {name} -> v2 {fullName} -> v3 {fullName, email}
fn user_registry() -> SchemaRegistry {
    let registry = SchemaRegistry::new();
    registry
        .register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)
        .unwrap();
    registry.register("user", "v2", rename("name", "fullName"), None).unwrap();
    registry
        .register(
            "user",
            "v3",
            SchemaDelta::new()
                .add_field("email", "string")
                .transform("email", "concat(lower(fullName), '@example.com')"),
            None,
        )
        .unwrap();
    registry
}

// =============================================================================
// Transformation
// =============================================================================

#[test]
fn test_identity_transform() {
    let registry = user_registry();
    let input = record(json!({"fullName": "Ada", "extra": [1, 2]}));
    for version in ["v1", "v2", "v3"] {
        assert!(registry.check_compatibility("user", version, version).unwrap());
        assert_eq!(registry.transform("user", &input, version, version).unwrap(), input);
    }
}

#[test]
fn test_concrete_split_scenario() {
    let registry = SchemaRegistry::new();
    registry
        .register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)
        .unwrap();
    registry
        .register(
            "user",
            "v2",
            SchemaDelta::new()
                .add_field("firstName", "string")
                .add_field("lastName", "string")
                .remove_field("name", "string")
                .transform("firstName", "split(name, ' ')[0]")
                .transform("lastName", "split(name, ' ')[1]"),
            None,
        )
        .unwrap();

    let input = record(json!({"name": "John Doe", "userId": 123}));
    let output = registry.transform("user", &input, "v1", "v2").unwrap();
    assert_eq!(
        Value::Object(output),
        json!({"firstName": "John", "lastName": "Doe", "userId": 123})
    );
}

#[test]
fn test_rename_round_trip() {
    let delta = rename("name", "fullName");
    let input = record(json!({"name": "Ada Lovelace", "id": 7}));

    let forward = delta.apply(&input).unwrap();
    let back = delta.reverse().apply(&forward).unwrap();
    assert_eq!(back, input);
}

#[test]
fn test_chain_composition() {
    let registry = user_registry();
    let input = record(json!({"name": "Ada", "id": 1}));

    let direct = registry.transform("user", &input, "v1", "v3").unwrap();
    let step = registry.transform("user", &input, "v1", "v2").unwrap();
    let stepped = registry.transform("user", &step, "v2", "v3").unwrap();

    assert_eq!(direct, stepped);
    assert_eq!(
        Value::Object(direct),
        json!({"fullName": "Ada", "email": "ada@example.com", "id": 1})
    );
}

#[test]
fn test_backward_transform_through_rename() {
    let registry = SchemaRegistry::new();
    registry
        .register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)
        .unwrap();
    registry.register("user", "v2", rename("name", "fullName"), None).unwrap();
    registry
        .register("user", "v3", SchemaDelta::new().add_field("nickname", "string"), None)
        .unwrap();

    assert!(registry.check_compatibility("user", "v3", "v1").unwrap());
    let input = record(json!({"fullName": "Ada", "nickname": "ada", "id": 1}));
    let output = registry.transform("user", &input, "v3", "v1").unwrap();
    assert_eq!(Value::Object(output), json!({"name": "Ada", "id": 1}));
}

#[test]
fn test_irreversible_chain_is_incompatible() {
    let registry = user_registry();
    // v3 derives email with a function call, so v3 -> v1 has no chain
    assert!(!registry.check_compatibility("user", "v3", "v1").unwrap());
    assert!(matches!(
        registry.transform("user", &record(json!({})), "v3", "v1"),
        Err(SchemaError::IncompatibleVersions { .. })
    ));
    assert!(registry.check_compatibility("user", "v1", "v3").unwrap());
}

#[test]
fn test_transform_failure_leaves_input_untouched() {
    let registry = SchemaRegistry::new();
    registry
        .register("event", "v1", SchemaDelta::new().add_field("at", "string"), None)
        .unwrap();
    registry
        .register(
            "event",
            "v2",
            SchemaDelta::new()
                .add_field("day", "string")
                .transform("day", "date_format(at, '%Y-%m-%d')"),
            None,
        )
        .unwrap();

    let input = record(json!({"at": "not a date"}));
    let result = registry.transform("event", &input, "v1", "v2");
    assert!(matches!(
        result,
        Err(SchemaError::TransformationError { field, .. }) if field == "day"
    ));
    assert_eq!(Value::Object(input), json!({"at": "not a date"}));
}

#[test]
fn test_hyphenated_key_rename_both_directions() {
    let registry = SchemaRegistry::new();
    registry
        .register("user", "v1", SchemaDelta::new().add_field("first-name", "string"), None)
        .unwrap();
    registry
        .register(
            "user",
            "v2",
            SchemaDelta::new()
                .add_field("firstName", "string")
                .remove_field("first-name", "string")
                .transform("firstName", "`first-name`"),
            None,
        )
        .unwrap();

    assert!(registry.check_compatibility("user", "v2", "v1").unwrap());
    let input = record(json!({"first-name": "Ada", "id": 1}));
    let forward = registry.transform("user", &input, "v1", "v2").unwrap();
    assert_eq!(Value::Object(forward.clone()), json!({"firstName": "Ada", "id": 1}));

    let back = registry.transform("user", &forward, "v2", "v1").unwrap();
    assert_eq!(back, input);
}

#[test]
fn test_unknown_function_rejected_at_registration() {
    let registry = SchemaRegistry::new();
    let delta = SchemaDelta::new()
        .add_field("x", "string")
        .transform("x", "__import__('os')");
    assert!(registry.register("user", "v1", delta, None).is_err());

    let delta = SchemaDelta::new().add_field("x", "string").transform("x", "exec(name)");
    assert!(matches!(
        registry.register("user", "v1", delta, None),
        Err(SchemaError::UnknownFunction(name)) if name == "exec"
    ));
    assert!(registry.get_versions("user").unwrap().is_empty());
}

// =============================================================================
// Registration
// =============================================================================

#[test]
fn test_sequence_order_is_not_lexical() {
    let registry = SchemaRegistry::new();
    for label in ["v2", "v10", "v1"] {
        registry.register("user", label, SchemaDelta::new(), None).unwrap();
    }
    assert_eq!(registry.get_versions("user").unwrap(), vec!["v2", "v10", "v1"]);
    assert_eq!(registry.latest_version("user").unwrap().unwrap().label, "v1");
    assert_eq!(registry.get_version("user", "v10").unwrap().unwrap().sequence, 1);
}

#[test]
fn test_duplicate_registration_keeps_first() {
    let registry = SchemaRegistry::new();
    let first = SchemaDelta::new().add_field("name", "string");
    registry
        .register("user", "v1", first.clone(), Some(SchemaMetadata::new("alice", "first")))
        .unwrap();

    let result = registry.register(
        "user",
        "v1",
        SchemaDelta::new().add_field("other", "int"),
        Some(SchemaMetadata::new("bob", "second")),
    );
    assert!(matches!(result, Err(SchemaError::DuplicateVersion { .. })));

    let (delta, meta) = registry.get_schema("user", "v1").unwrap().unwrap();
    assert_eq!(*delta, first);
    assert_eq!(meta.created_by, "alice");
    assert_eq!(registry.get_versions("user").unwrap().len(), 1);
}

#[test]
fn test_non_finite_metadata_rejected_at_registration() {
    let store = Arc::new(MemoryStore::new());
    let config = SchemaConfig::default();
    {
        let registry = SchemaRegistry::open(store.clone(), &config).unwrap();
        registry
            .register(
                "user",
                "v1",
                SchemaDelta::new()
                    .add_field("name", "string")
                    .with_metadata("ratio", MetadataValue::float(0.5).unwrap()),
                Some(SchemaMetadata::new("alice", "first").with_notes("baseline")),
            )
            .unwrap();

        for bad in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let delta = SchemaDelta::new()
                .add_field("age", "int")
                .with_metadata("ratio", MetadataValue::Float(bad));
            assert!(matches!(
                registry.register("user", "v2", delta, None),
                Err(SchemaError::InvalidDelta(_))
            ));
        }
        assert!(store.get("asl:delta:user:v2").unwrap().is_none());
    }

    let registry = SchemaRegistry::open(store, &config).unwrap();
    assert_eq!(registry.get_versions("user").unwrap(), vec!["v1"]);
    let (delta, meta) = registry.get_schema("user", "v1").unwrap().unwrap();
    assert_eq!(delta.metadata["ratio"], MetadataValue::Float(0.5));
    assert_eq!(meta.notes.as_deref(), Some("baseline"));
}

#[test]
fn test_concurrent_duplicate_registration() {
    let registry = SchemaRegistry::new();
    let outcomes: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = &registry;
                scope.spawn(move || {
                    let delta = SchemaDelta::new().add_field(format!("f{}", i), "string");
                    registry.register("user", "v1", delta, None).is_ok()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);
    assert_eq!(registry.get_versions("user").unwrap(), vec!["v1"]);
}

#[test]
fn test_concurrent_reads_and_writes() {
    let registry = Arc::new(user_registry());
    let input = record(json!({"name": "Ada"}));

    std::thread::scope(|scope| {
        for i in 0..4 {
            let registry = Arc::clone(&registry);
            scope.spawn(move || {
                registry
                    .register("other", &format!("v{}", i), SchemaDelta::new(), None)
                    .unwrap();
            });
        }
        for _ in 0..4 {
            let registry = Arc::clone(&registry);
            let input = input.clone();
            scope.spawn(move || {
                let output = registry.transform("user", &input, "v1", "v3").unwrap();
                assert_eq!(output["email"], json!("ada@example.com"));
            });
        }
    });

    let mut sequences: Vec<u64> = registry
        .get_versions("other")
        .unwrap()
        .iter()
        .map(|label| registry.get_version("other", label).unwrap().unwrap().sequence)
        .collect();
    sequences.sort();
    assert_eq!(sequences, vec![0, 1, 2, 3]);
}

// =============================================================================
// Persistence
// =============================================================================

fn file_config(dir: &TempDir) -> SchemaConfig {
    let mut config = SchemaConfig::default();
    config.store.backend = StoreBackend::File;
    config.store.path = dir.path().join("store");
    config
}

#[test]
fn test_file_store_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    {
        let registry = SchemaRegistry::from_config(&config).unwrap();
        registry
            .register("user", "v2", SchemaDelta::new().add_field("name", "string"), None)
            .unwrap();
        registry.register("user", "v10", rename("name", "fullName"), None).unwrap();
    }
    assert!(dir.path().join("store/asl/delta/user/v10.json").exists());

    let registry = SchemaRegistry::from_config(&config).unwrap();
    assert_eq!(registry.get_versions("user").unwrap(), vec!["v2", "v10"]);
    let output = registry
        .transform("user", &record(json!({"fullName": "Ada"})), "v10", "v2")
        .unwrap();
    assert_eq!(Value::Object(output), json!({"name": "Ada"}));

    let meta = registry.get_metadata("user", "v2").unwrap().unwrap();
    assert_eq!(meta.description, "Schema version v2 for user");
}

#[test]
fn test_custom_key_prefix() {
    let store = Arc::new(MemoryStore::new());
    let mut config = SchemaConfig::default();
    config.store.key_prefix = "tenant-a".to_string();

    let registry = SchemaRegistry::open(store.clone(), &config).unwrap();
    registry.register("user", "v1", SchemaDelta::new(), None).unwrap();

    assert!(store.get("tenant-a:seq:user:v1").unwrap().is_some());
    assert!(store.members_of("tenant-a:subjects").unwrap().contains("user"));
    assert!(store.members_of("asl:subjects").unwrap().is_empty());
}

#[test]
fn test_tampered_file_is_detected() {
    let dir = TempDir::new().unwrap();
    let config = file_config(&dir);
    {
        let registry = SchemaRegistry::from_config(&config).unwrap();
        registry
            .register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)
            .unwrap();
    }

    let store = FileStore::open(dir.path().join("store")).unwrap();
    store
        .put(
            "asl:delta:user:v1",
            &serde_json::to_string(&SchemaDelta::new().add_field("name", "int")).unwrap(),
        )
        .unwrap();

    assert!(matches!(
        SchemaRegistry::from_config(&config),
        Err(SchemaError::ChecksumMismatch { .. })
    ));
}
