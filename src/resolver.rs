//! Version chain resolution
//!
//! Given a subject's history and two endpoints, produce the ordered list of
//! deltas that carries a record from one shape to the other. Moving forward
//! applies deltas as registered; moving backward applies their reverses in
//! decreasing sequence order.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::delta::SchemaDelta;
use crate::error::{Result, SchemaError};
use crate::expr::{Evaluator, Record};
use crate::version::{SchemaVersion, VersionHistory};

/// Which way a chain walks the history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainDirection {
    Identity,
    Forward,
    Backward,
}

/// One delta in a chain, already reversed when walking backward
#[derive(Debug, Clone)]
pub struct ChainStep {
    /// The version whose delta this step applies (or undoes)
    pub version: SchemaVersion,
    pub delta: Arc<SchemaDelta>,
    pub reversed: bool,
}

/// An ordered list of deltas between two versions
#[derive(Debug, Clone)]
pub struct Chain {
    direction: ChainDirection,
    steps: Vec<ChainStep>,
}

impl Chain {
    fn identity() -> Self {
        Self {
            direction: ChainDirection::Identity,
            steps: Vec::new(),
        }
    }

    pub fn direction(&self) -> ChainDirection {
        self.direction
    }

    pub fn steps(&self) -> &[ChainStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Fold every step over the record, stopping at the first error
    pub fn apply(&self, record: &Record, evaluator: &Evaluator) -> Result<Record> {
        self.steps.iter().try_fold(record.clone(), |current, step| {
            debug!(version = %step.version, reversed = step.reversed, "applying delta");
            step.delta.apply_with(&current, evaluator)
        })
    }
}

/// Resolves chains over one subject's history
pub struct ChainResolver<'a> {
    history: &'a VersionHistory,
}

impl<'a> ChainResolver<'a> {
    pub fn new(history: &'a VersionHistory) -> Self {
        Self { history }
    }

    /// Resolve the chain from `from` to `to`
    pub fn resolve(&self, from: &str, to: &str) -> Result<Chain> {
        let from_idx = self.position(from)?;
        let to_idx = self.position(to)?;
        let entries = self.history.entries();

        match from_idx.cmp(&to_idx) {
            Ordering::Equal => Ok(Chain::identity()),
            Ordering::Less => {
                let steps = entries[from_idx + 1..=to_idx]
                    .iter()
                    .map(|entry| ChainStep {
                        version: entry.version.clone(),
                        delta: Arc::clone(&entry.delta),
                        reversed: false,
                    })
                    .collect();
                Ok(Chain {
                    direction: ChainDirection::Forward,
                    steps,
                })
            }
            Ordering::Greater => {
                let steps = entries[to_idx + 1..=from_idx]
                    .iter()
                    .rev()
                    .map(|entry| {
                        let reversed = entry.delta.try_reverse(&entry.version.label)?;
                        Ok(ChainStep {
                            version: entry.version.clone(),
                            delta: Arc::new(reversed),
                            reversed: true,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Chain {
                    direction: ChainDirection::Backward,
                    steps,
                })
            }
        }
    }

    fn position(&self, label: &str) -> Result<usize> {
        self.history
            .position(label)
            .ok_or_else(|| SchemaError::UnknownVersion {
                subject: self.history.subject().to_string(),
                version: label.to_string(),
            })
    }
}
