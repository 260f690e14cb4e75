//! Adaptive Schema Registry
//!
//! A versioned, append-only registry of schema deltas that can carry data
//! records between any two compatible versions of a subject.
//!
//! ## Features
//!
//! - **Schema Deltas**: each version records fields added, fields removed and
//!   expressions deriving new fields from the previous shape
//! - **Sequence Ordering**: versions are ordered by registration, not by label
//! - **Chain Resolution**: forward chains apply deltas, backward chains apply
//!   their reverses where the transformations are invertible
//! - **Safe Expressions**: a small parsed language over a closed set of
//!   builtin functions; nothing else can be called
//! - **Checksum Validation**: SHA256 checksums guard persisted deltas
//!
//! ## Example
//!
//! ```
//! use adaptive_schemas::{SchemaDelta, SchemaRegistry};
//! use serde_json::json;
//!
//! let registry = SchemaRegistry::new();
//! registry.register("user", "v1", SchemaDelta::new().add_field("name", "string"), None)?;
//! registry.register(
//!     "user",
//!     "v2",
//!     SchemaDelta::new()
//!         .add_field("firstName", "string")
//!         .remove_field("name", "string")
//!         .transform("firstName", "split(name, ' ')[0]"),
//!     None,
//! )?;
//!
//! let record = json!({"name": "John Doe"}).as_object().cloned().unwrap_or_default();
//! let upgraded = registry.transform("user", &record, "v1", "v2")?;
//! assert_eq!(upgraded["firstName"], json!("John"));
//! # Ok::<(), adaptive_schemas::SchemaError>(())
//! ```
//!
//! ## Storage layout
//!
//! ```text
//! asl:subjects                 set of subject names
//! asl:versions:{subject}       set of version labels
//! asl:delta:{subject}:{ver}    SchemaDelta (JSON)
//! asl:meta:{subject}:{ver}     SchemaMetadata (JSON)
//! asl:seq:{subject}:{ver}      sequence number
//! asl:checksum:{subject}:{ver} sha256 of the delta
//! ```

pub mod checksum;
pub mod compatibility;
pub mod config;
pub mod delta;
pub mod error;
pub mod expr;
pub mod metadata;
pub mod names;
pub mod registry;
pub mod resolver;
pub mod store;
pub mod version;

pub use checksum::Checksum;
pub use compatibility::{CompatibilityEdge, CompatibilityGraph, CompatibilityMatrix};
pub use config::SchemaConfig;
pub use delta::{MetadataValue, SchemaDelta};
pub use error::{Result, SchemaError};
pub use expr::{Evaluator, Expression, Record};
pub use metadata::SchemaMetadata;
pub use registry::SchemaRegistry;
pub use resolver::{Chain, ChainDirection, ChainResolver};
pub use store::{FileStore, MemoryStore, SchemaStore, StoreKeys};
pub use version::{SchemaVersion, VersionHistory};
