//! Schema Registry
//!
//! Owns every subject's version history and compatibility matrix. Registration
//! is append-only: a (subject, version) pair is written once and never changes.
//! When a store is attached, each registration is persisted before it becomes
//! visible, and [`SchemaRegistry::open`] rebuilds the registry from the store.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard};

use tracing::{debug, info};

use crate::checksum::Checksum;
use crate::compatibility::{CompatibilityEdge, CompatibilityGraph, CompatibilityMatrix};
use crate::config::{SchemaConfig, StoreBackend};
use crate::delta::SchemaDelta;
use crate::error::{Result, SchemaError};
use crate::expr::{Evaluator, Record};
use crate::metadata::SchemaMetadata;
use crate::names::NameRules;
use crate::resolver::ChainResolver;
use crate::store::{FileStore, SchemaStore, StoreKeys};
use crate::version::{SchemaVersion, VersionEntry, VersionHistory};

/// History plus cached compatibility for one subject
#[derive(Debug)]
struct SubjectState {
    history: VersionHistory,
    matrix: CompatibilityMatrix,
}

impl SubjectState {
    fn new(subject: &str) -> Self {
        Self {
            history: VersionHistory::new(subject),
            matrix: CompatibilityMatrix::new(),
        }
    }

    /// Append an entry and seed compatibility with its predecessor
    fn append(&mut self, entry: VersionEntry) -> Result<()> {
        let previous = self.history.latest().map(|e| e.version.sequence);
        let sequence = entry.version.sequence;
        self.history.push(entry)?;
        if let Some(previous) = previous {
            self.matrix.seed_adjacent(previous, sequence)?;
        }
        Ok(())
    }
}

/// The main schema registry
pub struct SchemaRegistry {
    subjects: RwLock<HashMap<String, SubjectState>>,
    store: Option<Arc<dyn SchemaStore>>,
    keys: StoreKeys,
    evaluator: Evaluator,
    names: NameRules,
    default_creator: String,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// In-memory registry with default settings and no store
    pub fn new() -> Self {
        Self {
            subjects: RwLock::new(HashMap::new()),
            store: None,
            keys: StoreKeys::default(),
            evaluator: Evaluator::new(),
            names: NameRules::default(),
            default_creator: "registry".to_string(),
        }
    }

    /// In-memory registry configured from `[registry]` and `[names]`
    pub fn with_config(config: &SchemaConfig) -> Result<Self> {
        let evaluator = if config.registry.cache_enabled {
            Evaluator::cached(config.registry.cache_capacity)
        } else {
            Evaluator::new()
        };
        Ok(Self {
            subjects: RwLock::new(HashMap::new()),
            store: None,
            keys: StoreKeys::new(&config.store.key_prefix),
            evaluator,
            names: NameRules::from_config(&config.names)?,
            default_creator: config.registry.default_creator.clone(),
        })
    }

    /// Build the registry the config describes, opening the file store if selected
    pub fn from_config(config: &SchemaConfig) -> Result<Self> {
        match config.store.backend {
            StoreBackend::Memory => Self::with_config(config),
            StoreBackend::File => {
                let store = FileStore::open(config.store_path())?;
                Self::open(Arc::new(store), config)
            }
        }
    }

    /// Attach a store and load every subject it holds.
    ///
    /// Histories are rebuilt in stored sequence order; each delta is checked
    /// against its stored checksum.
    pub fn open(store: Arc<dyn SchemaStore>, config: &SchemaConfig) -> Result<Self> {
        let mut registry = Self::with_config(config)?;
        let mut subjects = HashMap::new();

        for subject in store.members_of(&registry.keys.subjects())? {
            let state = registry.load_subject(store.as_ref(), &subject)?;
            debug!(subject = %subject, versions = state.history.len(), "loaded subject");
            subjects.insert(subject, state);
        }

        info!(
            backend = store.backend_type(),
            subjects = subjects.len(),
            "opened schema registry"
        );
        registry.subjects = RwLock::new(subjects);
        registry.store = Some(store);
        Ok(registry)
    }

    fn load_subject(&self, store: &dyn SchemaStore, subject: &str) -> Result<SubjectState> {
        let mut entries = Vec::new();
        for label in store.members_of(&self.keys.versions(subject))? {
            let sequence: u64 = read_json(store, &self.keys.sequence(subject, &label))?;
            let delta: SchemaDelta = read_json(store, &self.keys.delta(subject, &label))?;
            let metadata: SchemaMetadata = read_json(store, &self.keys.metadata(subject, &label))?;
            let checksum_key = self.keys.checksum(subject, &label);
            let expected: Checksum = read_json(store, &checksum_key)?;

            expected.verify(&checksum_key, &delta)?;

            entries.push(VersionEntry {
                version: SchemaVersion::new(label, sequence),
                delta: Arc::new(delta),
                metadata,
                checksum: expected,
            });
        }

        entries.sort_by_key(|e| e.version.sequence);
        let mut state = SubjectState::new(subject);
        for entry in entries {
            state.append(entry)?;
        }
        Ok(state)
    }

    /// Register a new version of a subject.
    ///
    /// Returns the sequence number assigned to the version. Fails with
    /// `DuplicateVersion` if the label is already registered; the existing
    /// version is left untouched.
    pub fn register(
        &self,
        subject: &str,
        version: &str,
        delta: SchemaDelta,
        metadata: Option<SchemaMetadata>,
    ) -> Result<u64> {
        self.names.validate(subject)?;
        self.names.validate(version)?;
        delta.validate()?;

        let metadata = metadata.unwrap_or_else(|| {
            SchemaMetadata::default_for(subject, version, &self.default_creator)
        });
        let checksum = delta.checksum()?;

        let mut subjects = self.subjects.write().map_err(lock_error)?;
        let existing = subjects.get(subject);
        if existing.is_some_and(|s| s.history.contains(version)) {
            return Err(SchemaError::DuplicateVersion {
                subject: subject.to_string(),
                version: version.to_string(),
            });
        }
        let sequence = existing.map(|s| s.history.next_sequence()).unwrap_or(0);

        if let Some(store) = &self.store {
            self.persist(store.as_ref(), subject, version, sequence, &delta, &metadata, &checksum)?;
        }

        let entry = VersionEntry {
            version: SchemaVersion::new(version, sequence),
            delta: Arc::new(delta),
            metadata,
            checksum,
        };
        subjects
            .entry(subject.to_string())
            .or_insert_with(|| SubjectState::new(subject))
            .append(entry)?;

        info!(subject, version, sequence, "registered schema version");
        Ok(sequence)
    }

    #[allow(clippy::too_many_arguments)]
    fn persist(
        &self,
        store: &dyn SchemaStore,
        subject: &str,
        version: &str,
        sequence: u64,
        delta: &SchemaDelta,
        metadata: &SchemaMetadata,
        checksum: &Checksum,
    ) -> Result<()> {
        // Point keys first; a version only becomes discoverable through the
        // sets once everything it references is written.
        store.put(&self.keys.delta(subject, version), &serde_json::to_string(delta)?)?;
        store.put(&self.keys.metadata(subject, version), &serde_json::to_string(metadata)?)?;
        store.put(&self.keys.sequence(subject, version), &serde_json::to_string(&sequence)?)?;
        store.put(&self.keys.checksum(subject, version), &serde_json::to_string(checksum)?)?;
        store.add_to_set(&self.keys.versions(subject), version)?;
        store.add_to_set(&self.keys.subjects(), subject)?;
        Ok(())
    }

    fn read_subjects(&self) -> Result<RwLockReadGuard<'_, HashMap<String, SubjectState>>> {
        self.subjects.read().map_err(lock_error)
    }

    /// Registered subject names, sorted
    pub fn subjects(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.read_subjects()?.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Version labels in sequence order; empty for an unknown subject
    pub fn get_versions(&self, subject: &str) -> Result<Vec<String>> {
        Ok(self
            .read_subjects()?
            .get(subject)
            .map(|s| s.history.labels())
            .unwrap_or_default())
    }

    pub fn get_version(&self, subject: &str, version: &str) -> Result<Option<SchemaVersion>> {
        self.with_entry(subject, version, |e| e.version.clone())
    }

    pub fn latest_version(&self, subject: &str) -> Result<Option<SchemaVersion>> {
        Ok(self
            .read_subjects()?
            .get(subject)
            .and_then(|s| s.history.latest())
            .map(|e| e.version.clone()))
    }

    pub fn get_delta(&self, subject: &str, version: &str) -> Result<Option<Arc<SchemaDelta>>> {
        self.with_entry(subject, version, |e| Arc::clone(&e.delta))
    }

    pub fn get_metadata(&self, subject: &str, version: &str) -> Result<Option<SchemaMetadata>> {
        self.with_entry(subject, version, |e| e.metadata.clone())
    }

    /// Delta and metadata of one version
    pub fn get_schema(
        &self,
        subject: &str,
        version: &str,
    ) -> Result<Option<(Arc<SchemaDelta>, SchemaMetadata)>> {
        self.with_entry(subject, version, |e| (Arc::clone(&e.delta), e.metadata.clone()))
    }

    fn with_entry<T>(
        &self,
        subject: &str,
        version: &str,
        f: impl FnOnce(&VersionEntry) -> T,
    ) -> Result<Option<T>> {
        Ok(self
            .read_subjects()?
            .get(subject)
            .and_then(|s| s.history.get(version))
            .map(f))
    }

    /// Whether a record at `from` can be transformed to `to`.
    ///
    /// Unknown subjects or versions are simply not compatible.
    pub fn check_compatibility(&self, subject: &str, from: &str, to: &str) -> Result<bool> {
        match self.read_subjects()?.get(subject) {
            Some(state) => state.matrix.check(&state.history, from, to),
            None => Ok(false),
        }
    }

    /// Every ordered pair of distinct versions with its compatibility
    pub fn compatibility_matrix(&self, subject: &str) -> Result<Vec<CompatibilityEdge>> {
        let subjects = self.read_subjects()?;
        let state = subjects
            .get(subject)
            .ok_or_else(|| SchemaError::UnknownSubject(subject.to_string()))?;
        state.matrix.full(&state.history)
    }

    /// Compatibility graph for DOT export
    pub fn compatibility_graph(&self, subject: &str) -> Result<CompatibilityGraph> {
        let edges = self.compatibility_matrix(subject)?;
        let labels = self.get_versions(subject)?;
        Ok(CompatibilityGraph::from_edges(subject, &labels, &edges))
    }

    /// Carry a record from version `from` to version `to`.
    ///
    /// The input record is never modified. Errors from the resolver and from
    /// delta application are returned unchanged.
    pub fn transform(
        &self,
        subject: &str,
        record: &Record,
        from: &str,
        to: &str,
    ) -> Result<Record> {
        let chain = {
            let subjects = self.read_subjects()?;
            let state = subjects
                .get(subject)
                .ok_or_else(|| unknown_version(subject, from))?;
            for label in [from, to] {
                if !state.history.contains(label) {
                    return Err(unknown_version(subject, label));
                }
            }
            if !state.matrix.check(&state.history, from, to)? {
                return Err(SchemaError::IncompatibleVersions {
                    subject: subject.to_string(),
                    from: from.to_string(),
                    to: to.to_string(),
                });
            }
            ChainResolver::new(&state.history).resolve(from, to)?
        };

        debug!(subject, from, to, steps = chain.len(), "transforming record");
        chain.apply(record, &self.evaluator)
    }
}

fn read_json<T: serde::de::DeserializeOwned>(store: &dyn SchemaStore, key: &str) -> Result<T> {
    let raw = store
        .get(key)?
        .ok_or_else(|| SchemaError::Storage(format!("missing key {}", key)))?;
    Ok(serde_json::from_str(&raw)?)
}

fn unknown_version(subject: &str, version: &str) -> SchemaError {
    SchemaError::UnknownVersion {
        subject: subject.to_string(),
        version: version.to_string(),
    }
}

fn lock_error<T>(err: std::sync::PoisonError<T>) -> SchemaError {
    SchemaError::LockPoisoned(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use serde_json::{json, Value};

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("Expected object, got {:?}", other),
        }
    }

    fn split_name() -> SchemaDelta {
        SchemaDelta::new()
            .add_field("firstName", "string")
            .add_field("lastName", "string")
            .remove_field("name", "string")
            .transform("firstName", "split(name, ' ')[0]")
            .transform("lastName", "split(name, ' ')[1]")
    }

    #[test]
    fn test_register_assigns_sequences() {
        let registry = SchemaRegistry::new();
        assert_eq!(registry.register("user", "v1", SchemaDelta::new(), None).unwrap(), 0);
        assert_eq!(registry.register("user", "v2", split_name(), None).unwrap(), 1);
        assert_eq!(registry.register("order", "v1", SchemaDelta::new(), None).unwrap(), 0);
        assert_eq!(registry.subjects().unwrap(), vec!["order", "user"]);
        assert_eq!(registry.latest_version("user").unwrap().unwrap().label, "v2");
    }

    #[test]
    fn test_default_metadata() {
        let registry = SchemaRegistry::new();
        registry.register("user", "v1", SchemaDelta::new(), None).unwrap();
        let meta = registry.get_metadata("user", "v1").unwrap().unwrap();
        assert_eq!(meta.created_by, "registry");
        assert_eq!(meta.description, "Schema version v1 for user");

        let custom = SchemaMetadata::new("alice", "Initial schema");
        registry.register("user", "v2", SchemaDelta::new(), Some(custom)).unwrap();
        let meta = registry.get_metadata("user", "v2").unwrap().unwrap();
        assert_eq!(meta.created_by, "alice");
    }

    #[test]
    fn test_lookups_return_none_when_absent() {
        let registry = SchemaRegistry::new();
        registry.register("user", "v1", SchemaDelta::new(), None).unwrap();
        assert!(registry.get_delta("user", "v9").unwrap().is_none());
        assert!(registry.get_schema("nobody", "v1").unwrap().is_none());
        assert!(registry.get_versions("nobody").unwrap().is_empty());
        assert!(registry.latest_version("nobody").unwrap().is_none());
    }

    #[test]
    fn test_invalid_input_is_not_registered() {
        let registry = SchemaRegistry::new();
        assert!(matches!(
            registry.register("user:x", "v1", SchemaDelta::new(), None),
            Err(SchemaError::InvalidName { .. })
        ));
        let bad = SchemaDelta::new().add_field("x", "string").transform("x", "eval(y)");
        assert!(matches!(
            registry.register("user", "v1", bad, None),
            Err(SchemaError::UnknownFunction(_))
        ));
        assert!(registry.subjects().unwrap().is_empty());
    }

    #[test]
    fn test_transform_split_name() {
        let registry = SchemaRegistry::new();
        registry
            .register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)
            .unwrap();
        registry.register("user", "v2", split_name(), None).unwrap();

        let input = record(json!({"name": "John Doe", "userId": 123}));
        let output = registry.transform("user", &input, "v1", "v2").unwrap();
        assert_eq!(
            Value::Object(output),
            json!({"firstName": "John", "lastName": "Doe", "userId": 123})
        );
        assert_eq!(input["name"], json!("John Doe"));
    }

    #[test]
    fn test_transform_error_ordering() {
        let registry = SchemaRegistry::new();
        registry
            .register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)
            .unwrap();
        registry.register("user", "v2", split_name(), None).unwrap();
        registry
            .register("user", "v3", SchemaDelta::new().add_field("email", "string"), None)
            .unwrap();
        let input = record(json!({}));

        assert!(matches!(
            registry.transform("nobody", &input, "v1", "v2"),
            Err(SchemaError::UnknownVersion { .. })
        ));
        assert!(matches!(
            registry.transform("user", &input, "v1", "v7"),
            Err(SchemaError::UnknownVersion { version, .. }) if version == "v7"
        ));
        assert!(matches!(
            registry.transform("user", &input, "v3", "v1"),
            Err(SchemaError::IncompatibleVersions { .. })
        ));
        // Adjacent pairs are seeded compatible; the resolver reports why it cannot go back
        assert!(matches!(
            registry.transform("user", &input, "v2", "v1"),
            Err(SchemaError::IrreversibleTransformation { .. })
        ));
    }

    #[test]
    fn test_compatibility_graph() {
        let registry = SchemaRegistry::new();
        registry
            .register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)
            .unwrap();
        registry.register("user", "v2", split_name(), None).unwrap();
        registry
            .register("user", "v3", SchemaDelta::new().add_field("email", "string"), None)
            .unwrap();

        let graph = registry.compatibility_graph("user").unwrap();
        assert_eq!(graph.edge_count(), 5);
        assert!(graph.has_edge("v1", "v3"));
        assert!(!graph.has_edge("v3", "v1"));
        assert!(matches!(
            registry.compatibility_graph("nobody"),
            Err(SchemaError::UnknownSubject(_))
        ));
    }

    #[test]
    fn test_open_rehydrates_from_store() {
        let store = Arc::new(MemoryStore::new());
        let config = SchemaConfig::default();
        {
            let registry = SchemaRegistry::open(store.clone(), &config).unwrap();
            registry
                .register("user", "v2", SchemaDelta::new().add_field("name", "string"), None)
                .unwrap();
            registry.register("user", "v10", split_name(), None).unwrap();
            registry
                .register("user", "v1", SchemaDelta::new().add_field("email", "string"), None)
                .unwrap();
        }
        assert!(store.get("asl:delta:user:v10").unwrap().is_some());

        let reopened = SchemaRegistry::open(store, &config).unwrap();
        assert_eq!(reopened.get_versions("user").unwrap(), vec!["v2", "v10", "v1"]);
        assert_eq!(reopened.get_version("user", "v1").unwrap().unwrap().sequence, 2);
        assert!(reopened.check_compatibility("user", "v10", "v2").unwrap());
        assert_eq!(reopened.register("user", "v3", SchemaDelta::new(), None).unwrap(), 3);
    }

    #[test]
    fn test_open_detects_tampered_delta() {
        let store = Arc::new(MemoryStore::new());
        let config = SchemaConfig::default();
        {
            let registry = SchemaRegistry::open(store.clone(), &config).unwrap();
            registry
                .register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)
                .unwrap();
        }
        store
            .put("asl:delta:user:v1", &serde_json::to_string(&split_name()).unwrap())
            .unwrap();

        assert!(matches!(
            SchemaRegistry::open(store, &config),
            Err(SchemaError::ChecksumMismatch { key, .. }) if key == "asl:checksum:user:v1"
        ));
    }
}
