//! Error types for the schema registry

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Schema registry errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Version already exists: {subject} version {version}")]
    DuplicateVersion { subject: String, version: String },

    #[error("Unknown version: {subject} version {version}")]
    UnknownVersion { subject: String, version: String },

    #[error("Unknown subject: {0}")]
    UnknownSubject(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Arity mismatch: {function}() expects {expected} arguments, got {found}")]
    ArityMismatch {
        function: String,
        expected: String,
        found: usize,
    },

    #[error("Expression syntax error at {position} in '{expression}': {message}")]
    ExpressionSyntax {
        expression: String,
        position: usize,
        message: String,
    },

    #[error("Invalid argument to {function}(): {message}")]
    InvalidArgument { function: String, message: String },

    #[error("Transformation failed for field '{field}': {reason}")]
    TransformationError { field: String, reason: String },

    #[error("Irreversible transformation in {version}: cannot derive {fields:?} backwards")]
    IrreversibleTransformation { version: String, fields: Vec<String> },

    #[error("Incompatible versions: {subject} {from} -> {to}")]
    IncompatibleVersions {
        subject: String,
        from: String,
        to: String,
    },

    #[error("Invalid delta: {0}")]
    InvalidDelta(String),

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Checksum mismatch for {key}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        key: String,
        expected: String,
        actual: String,
    },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SchemaError {
    /// Errors caused by the caller's input rather than the registry's own state.
    ///
    /// An API layer maps these to 4xx responses.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            SchemaError::Storage(_)
                | SchemaError::LockPoisoned(_)
                | SchemaError::Io(_)
                | SchemaError::ChecksumMismatch { .. }
        )
    }
}
