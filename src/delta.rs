//! Schema deltas
//!
//! A [`SchemaDelta`] describes how one version's record shape differs from its
//! predecessor's: fields added, fields removed, and expressions that derive
//! output fields from the previous shape.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::checksum::Checksum;
use crate::error::{Result, SchemaError};
use crate::expr::{Evaluator, Expr, Expression, Record};

/// Free-form delta metadata value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        MetadataValue::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        MetadataValue::Int(value)
    }
}

impl MetadataValue {
    /// Float value; JSON has no NaN or infinity, so those are rejected
    pub fn float(value: f64) -> Result<Self> {
        if value.is_finite() {
            Ok(MetadataValue::Float(value))
        } else {
            Err(SchemaError::InvalidDelta(format!(
                "metadata value {} is not a finite number",
                value
            )))
        }
    }

    fn is_persistable(&self) -> bool {
        match self {
            MetadataValue::Float(value) => value.is_finite(),
            _ => true,
        }
    }
}

impl TryFrom<f64> for MetadataValue {
    type Error = SchemaError;

    fn try_from(value: f64) -> Result<Self> {
        MetadataValue::float(value)
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Text(value)
    }
}

/// Changes introduced by one version
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaDelta {
    /// Fields added in this version, with their declared type tag
    #[serde(default)]
    pub added: BTreeMap<String, String>,
    /// Fields removed in this version, with their declared type tag
    #[serde(default)]
    pub removed: BTreeMap<String, String>,
    /// Output field -> expression evaluated against the previous shape
    /// Fields kept under a new type tag
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub modified: BTreeMap<String, String>,
    #[serde(default)]
    pub transformations: BTreeMap<String, String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, MetadataValue>,
}

/// How a single transformation can be undone
#[derive(Debug, Clone, PartialEq, Eq)]
enum Inversion {
    /// `output: source` where `source` was removed; undo with `source: output`
    Rename { source: String },
    /// Reads a field that survives the delta; dropping the output undoes it
    Copy,
    /// Derived value whose inputs cannot be reconstructed
    Irreversible,
}

impl SchemaDelta {
    /// Create an empty delta
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_field(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.added.insert(name.into(), type_tag.into());
        self
    }

    pub fn remove_field(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.removed.insert(name.into(), type_tag.into());
        self
    }

    pub fn modify_field(mut self, name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        self.modified.insert(name.into(), type_tag.into());
        self
    }

    pub fn transform(mut self, field: impl Into<String>, expression: impl Into<String>) -> Self {
        self.transformations.insert(field.into(), expression.into());
        self
    }

    pub fn with_metadata(
        mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Check structural invariants and every expression.
    ///
    /// Expressions are parsed and their function names and arities checked,
    /// so a delta that validates can only fail at apply time on data.
    pub fn validate(&self) -> Result<()> {
        let overlap: Vec<&String> = self
            .added
            .keys()
            .filter(|field| self.removed.contains_key(*field))
            .collect();
        if !overlap.is_empty() {
            return Err(SchemaError::InvalidDelta(format!(
                "fields both added and removed: {:?}",
                overlap
            )));
        }

        if let Some(field) = self
            .modified
            .keys()
            .find(|field| self.added.contains_key(*field) || self.removed.contains_key(*field))
        {
            return Err(SchemaError::InvalidDelta(format!(
                "field {:?} is modified and also added or removed",
                field
            )));
        }

        if let Some((key, value)) = self.metadata.iter().find(|(_, v)| !v.is_persistable()) {
            return Err(SchemaError::InvalidDelta(format!(
                "metadata {:?} is not a finite number: {:?}",
                key, value
            )));
        }

        for expression in self.transformations.values() {
            Expression::parse(expression)?.check()?;
        }
        Ok(())
    }

    /// Every field name this delta writes
    pub fn write_set(&self) -> BTreeSet<&str> {
        self.added
            .keys()
            .chain(self.removed.keys())
            .chain(self.modified.keys())
            .chain(self.transformations.keys())
            .map(String::as_str)
            .collect()
    }

    /// Two deltas are compatible when their write sets are disjoint
    pub fn is_compatible_with(&self, other: &SchemaDelta) -> bool {
        self.write_set().is_disjoint(&other.write_set())
    }

    /// Apply to a record in the previous version's shape
    pub fn apply(&self, record: &Record) -> Result<Record> {
        self.apply_with(record, &Evaluator::new())
    }

    /// Apply using a caller-supplied evaluator.
    ///
    /// All expressions read the original record. Nothing is written until
    /// every expression has succeeded.
    pub fn apply_with(&self, record: &Record, evaluator: &Evaluator) -> Result<Record> {
        let digest = evaluator.digest(record)?;
        let mut computed = Vec::with_capacity(self.transformations.len());
        for (field, expression) in &self.transformations {
            let value = evaluator
                .evaluate_digested(expression, record, digest.as_ref())
                .map_err(|err| transformation_error(field, err))?;
            computed.push((field, value));
        }

        let mut result = record.clone();
        for field in self.removed.keys() {
            result.remove(field);
        }
        for (field, value) in computed {
            result.insert(field.clone(), value);
        }
        for field in self.added.keys() {
            result.entry(field.clone()).or_insert(Value::Null);
        }
        Ok(result)
    }

    /// Delta undoing this one as far as mechanically possible.
    ///
    /// `added` and `removed` swap. Bare renames of a removed field are
    /// inverted; transformations that cannot be inverted are omitted, and so
    /// are type changes, since the previous type tag is not recorded (see
    /// [`SchemaDelta::irreversible_fields`]).
    pub fn reverse(&self) -> SchemaDelta {
        let transformations = self
            .transformations
            .iter()
            .filter_map(|(output, expression)| match self.inversion(output, expression) {
                Inversion::Rename { source } => {
                    Some((source, Expr::Field(vec![output.clone()]).to_string()))
                }
                Inversion::Copy | Inversion::Irreversible => None,
            })
            .collect();

        SchemaDelta {
            added: self.removed.clone(),
            removed: self.added.clone(),
            modified: BTreeMap::new(),
            transformations,
            metadata: self.metadata.clone(),
        }
    }

    /// Reverse, failing if any transformation would be lost
    pub fn try_reverse(&self, version: &str) -> Result<SchemaDelta> {
        let fields = self.irreversible_fields();
        if !fields.is_empty() {
            return Err(SchemaError::IrreversibleTransformation {
                version: version.to_string(),
                fields,
            });
        }
        Ok(self.reverse())
    }

    /// Type-changed fields and outputs whose transformation has no
    /// mechanical inverse, sorted
    pub fn irreversible_fields(&self) -> Vec<String> {
        let derived = self
            .transformations
            .iter()
            .filter(|(output, expression)| {
                self.inversion(output, expression) == Inversion::Irreversible
            })
            .map(|(output, _)| output);
        self.modified
            .keys()
            .chain(derived)
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn is_fully_reversible(&self) -> bool {
        self.irreversible_fields().is_empty()
    }

    /// SHA256 over the canonical JSON form
    pub fn checksum(&self) -> Result<Checksum> {
        Checksum::of(self)
    }

    fn inversion(&self, output: &str, expression: &str) -> Inversion {
        // Overwriting a field that existed before loses its old value
        if !self.added.contains_key(output) {
            return Inversion::Irreversible;
        }

        let Ok(parsed) = Expression::parse(expression) else {
            return Inversion::Irreversible;
        };
        match parsed.field_path() {
            Some([source]) if self.removed.contains_key(source) => Inversion::Rename {
                source: source.clone(),
            },
            Some(path) if path.first().is_some_and(|root| !self.removed.contains_key(root)) => {
                Inversion::Copy
            }
            _ => Inversion::Irreversible,
        }
    }
}

fn transformation_error(field: &str, err: SchemaError) -> SchemaError {
    match err {
        SchemaError::UnknownFunction(_)
        | SchemaError::ArityMismatch { .. }
        | SchemaError::LockPoisoned(_) => err,
        other => SchemaError::TransformationError {
            field: field.to_string(),
            reason: other.to_string(),
        },
    }
}
