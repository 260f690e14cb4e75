//! Content digests for stored deltas and evaluator cache keys

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{Result, SchemaError};

/// SHA256 hex digest over the canonical JSON form of a value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum(String);

impl Checksum {
    /// Digest of any serializable value.
    ///
    /// Objects go through `serde_json::Value`, whose maps keep keys sorted,
    /// so equal values share a digest whatever their field order.
    pub fn of<T: Serialize>(value: &T) -> Result<Self> {
        let canonical = serde_json::to_vec(&serde_json::to_value(value)?)?;
        Ok(Self(format!("{:x}", Sha256::digest(&canonical))))
    }

    /// Recompute the digest of `value` and compare it with this stored one.
    ///
    /// `key` names where the stored digest came from and is reported on a
    /// mismatch.
    pub fn verify<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let actual = Self::of(value)?;
        if actual == *self {
            return Ok(());
        }
        Err(SchemaError::ChecksumMismatch {
            key: key.to_string(),
            expected: self.to_string(),
            actual: actual.to_string(),
        })
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
