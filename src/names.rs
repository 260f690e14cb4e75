//! Subject and version label validation
//!
//! Names become segments of storage keys (`delta:{subject}:{version}`), so
//! `:` and `/` are always rejected regardless of the configured pattern.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::NameConfig;
use crate::error::{Result, SchemaError};

static DEFAULT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.\-]*$").expect("default name pattern is valid")
});

pub const DEFAULT_MAX_LENGTH: usize = 128;

/// Rules applied to subject names and version labels
#[derive(Debug, Clone)]
pub struct NameRules {
    pattern: Regex,
    max_length: usize,
}

impl Default for NameRules {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_PATTERN.clone(),
            max_length: DEFAULT_MAX_LENGTH,
        }
    }
}

impl NameRules {
    /// Build rules from the `[names]` config section
    pub fn from_config(config: &NameConfig) -> Result<Self> {
        let pattern = match &config.pattern {
            Some(source) => Regex::new(source).map_err(|e| SchemaError::InvalidName {
                name: source.clone(),
                reason: format!("invalid name pattern: {}", e),
            })?,
            None => DEFAULT_PATTERN.clone(),
        };
        Ok(Self {
            pattern,
            max_length: config.max_length,
        })
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        let reason = if name.is_empty() {
            "must not be empty".to_string()
        } else if name.len() > self.max_length {
            format!("longer than {} bytes", self.max_length)
        } else if name.contains([':', '/']) {
            "must not contain ':' or '/'".to_string()
        } else if !self.pattern.is_match(name) {
            format!("does not match {}", self.pattern.as_str())
        } else {
            return Ok(());
        };

        Err(SchemaError::InvalidName {
            name: name.to_string(),
            reason,
        })
    }
}
