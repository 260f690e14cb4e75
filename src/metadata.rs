//! Descriptive metadata attached to each registered version

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for a schema version. Never affects transformation semantics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaMetadata {
    /// When this version was registered
    pub created_at: DateTime<Utc>,
    /// Who registered this version
    pub created_by: String,
    /// Free-text description
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl SchemaMetadata {
    /// Create metadata stamped with the current time
    pub fn new(created_by: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            created_by: created_by.into(),
            description: description.into(),
            tags: BTreeSet::new(),
            last_modified: None,
            modified_by: None,
            notes: None,
        }
    }

    /// Metadata used when a registration supplies none
    pub fn default_for(subject: &str, version: &str, created_by: &str) -> Self {
        Self::new(
            created_by,
            format!("Schema version {} for {}", version, subject),
        )
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}
