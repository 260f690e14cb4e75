//! Schema versioning
//!
//! Version labels are opaque display identifiers. Ordering comes from the
//! sequence number assigned at registration, never from the label text
//! ("v10" sorts before "v2" lexically).

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::delta::SchemaDelta;
use crate::error::{Result, SchemaError};
use crate::metadata::SchemaMetadata;

/// A version label with its authoritative sequence number
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaVersion {
    /// Display label (e.g., "v2")
    pub label: String,
    /// Position in the subject's history, starting at 0
    pub sequence: u64,
}

impl SchemaVersion {
    pub fn new(label: impl Into<String>, sequence: u64) -> Self {
        Self {
            label: label.into(),
            sequence,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

impl PartialEq for SchemaVersion {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for SchemaVersion {}

impl PartialOrd for SchemaVersion {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SchemaVersion {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.sequence.cmp(&other.sequence)
    }
}

/// One registered version: its delta, metadata and delta checksum
#[derive(Debug, Clone)]
pub struct VersionEntry {
    pub version: SchemaVersion,
    pub delta: Arc<SchemaDelta>,
    pub metadata: SchemaMetadata,
    pub checksum: Checksum,
}

/// Append-only, sequence-ordered history of one subject
#[derive(Debug, Clone)]
pub struct VersionHistory {
    subject: String,
    entries: Vec<VersionEntry>,
    positions: HashMap<String, usize>,
}

impl VersionHistory {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            entries: Vec::new(),
            positions: HashMap::new(),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sequence number the next registration receives
    pub fn next_sequence(&self) -> u64 {
        self.latest().map(|e| e.version.sequence + 1).unwrap_or(0)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.positions.contains_key(label)
    }

    /// Index of a label within [`VersionHistory::entries`]
    pub fn position(&self, label: &str) -> Option<usize> {
        self.positions.get(label).copied()
    }

    pub fn get(&self, label: &str) -> Option<&VersionEntry> {
        self.position(label).map(|i| &self.entries[i])
    }

    pub fn entries(&self) -> &[VersionEntry] {
        &self.entries
    }

    pub fn latest(&self) -> Option<&VersionEntry> {
        self.entries.last()
    }

    /// Labels in sequence order
    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.version.label.clone()).collect()
    }

    /// Append an entry; labels must be new and sequence numbers increasing
    pub fn push(&mut self, entry: VersionEntry) -> Result<()> {
        if self.contains(&entry.version.label) {
            return Err(SchemaError::DuplicateVersion {
                subject: self.subject.clone(),
                version: entry.version.label,
            });
        }
        if let Some(latest) = self.latest() {
            if entry.version.sequence <= latest.version.sequence {
                return Err(SchemaError::InvalidDelta(format!(
                    "sequence {} for {} does not follow {}",
                    entry.version.sequence, entry.version.label, latest.version.sequence
                )));
            }
        }

        self.positions
            .insert(entry.version.label.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }
}
