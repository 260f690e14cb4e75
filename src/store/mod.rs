//! Persistence for registered versions
//!
//! The registry writes through a [`SchemaStore`]: a flat key/value space plus
//! string sets, with every value stored as JSON text. [`StoreKeys`] owns the
//! key layout so every backend agrees on it.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::collections::BTreeSet;

use crate::error::Result;

/// Key/value and set storage used by the registry
pub trait SchemaStore: Send + Sync {
    /// Store a value, replacing any previous one
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Fetch a value
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Add a member to a set, creating the set if needed
    fn add_to_set(&self, key: &str, member: &str) -> Result<()>;

    /// Members of a set (empty if the set does not exist)
    fn members_of(&self, key: &str) -> Result<BTreeSet<String>>;

    /// Backend type name
    fn backend_type(&self) -> &'static str;
}

/// Storage key layout, namespaced by a prefix such as `asl:`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreKeys {
    prefix: String,
}

impl Default for StoreKeys {
    fn default() -> Self {
        Self::new("asl")
    }
}

impl StoreKeys {
    /// A prefix without a trailing `:` gets one; an empty prefix stays empty
    pub fn new(prefix: &str) -> Self {
        let prefix = if prefix.is_empty() || prefix.ends_with(':') {
            prefix.to_string()
        } else {
            format!("{}:", prefix)
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Set of every registered subject
    pub fn subjects(&self) -> String {
        format!("{}subjects", self.prefix)
    }

    /// Set of version labels for a subject
    pub fn versions(&self, subject: &str) -> String {
        format!("{}versions:{}", self.prefix, subject)
    }

    pub fn delta(&self, subject: &str, version: &str) -> String {
        format!("{}delta:{}:{}", self.prefix, subject, version)
    }

    pub fn metadata(&self, subject: &str, version: &str) -> String {
        format!("{}meta:{}:{}", self.prefix, subject, version)
    }

    pub fn sequence(&self, subject: &str, version: &str) -> String {
        format!("{}seq:{}:{}", self.prefix, subject, version)
    }

    pub fn checksum(&self, subject: &str, version: &str) -> String {
        format!("{}checksum:{}:{}", self.prefix, subject, version)
    }
}
