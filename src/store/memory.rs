//! In-process store

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use crate::error::{Result, SchemaError};
use crate::store::SchemaStore;

/// In-memory store; clones share the same data
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: Arc<RwLock<HashMap<String, String>>>,
    sets: Arc<RwLock<HashMap<String, BTreeSet<String>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of plain values stored
    pub fn len(&self) -> usize {
        self.values.read().map(|v| v.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SchemaStore for MemoryStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .write()
            .map_err(|e| SchemaError::LockPoisoned(e.to_string()))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .values
            .read()
            .map_err(|e| SchemaError::LockPoisoned(e.to_string()))?
            .get(key)
            .cloned())
    }

    fn add_to_set(&self, key: &str, member: &str) -> Result<()> {
        self.sets
            .write()
            .map_err(|e| SchemaError::LockPoisoned(e.to_string()))?
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string());
        Ok(())
    }

    fn members_of(&self, key: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .sets
            .read()
            .map_err(|e| SchemaError::LockPoisoned(e.to_string()))?
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
