//! Filesystem store
//!
//! Each `:`-separated key segment becomes a directory level, so
//! `asl:delta:user:v2` lives at `<root>/asl/delta/user/v2.json`. Sets are
//! JSON arrays in `<name>.set.json`. Writes go to a temporary sibling and are
//! renamed into place.

use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::trace;

use crate::error::{Result, SchemaError};
use crate::store::SchemaStore;

/// One JSON file per key under a root directory
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    // Serializes set read-modify-write cycles
    set_lock: Mutex<()>,
}

impl FileStore {
    /// Open a store rooted at `root`, creating the directory if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            set_lock: Mutex::new(()),
        })
    }

    fn path_for(&self, key: &str, extension: &str) -> Result<PathBuf> {
        let segments: Vec<&str> = key.split(':').collect();
        let mut path = self.root.clone();
        for segment in &segments {
            if segment.is_empty()
                || *segment == "."
                || *segment == ".."
                || segment.contains(['/', '\\'])
            {
                return Err(SchemaError::Storage(format!(
                    "key {:?} cannot be mapped to a file path",
                    key
                )));
            }
            path.push(segment);
        }
        let file_name = format!(
            "{}.{}",
            segments.last().copied().unwrap_or_default(),
            extension
        );
        path.set_file_name(file_name);
        Ok(path)
    }

    fn read(path: &Path) -> Result<Option<String>> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, content)?;
        fs::rename(&tmp, path)?;
        trace!(path = %path.display(), "wrote store file");
        Ok(())
    }
}

impl SchemaStore for FileStore {
    fn put(&self, key: &str, value: &str) -> Result<()> {
        Self::write(&self.path_for(key, "json")?, value)
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Self::read(&self.path_for(key, "json")?)
    }

    fn add_to_set(&self, key: &str, member: &str) -> Result<()> {
        let path = self.path_for(key, "set.json")?;
        let _guard = self
            .set_lock
            .lock()
            .map_err(|e| SchemaError::LockPoisoned(e.to_string()))?;

        let mut members: BTreeSet<String> = match Self::read(&path)? {
            Some(content) => serde_json::from_str(&content)?,
            None => BTreeSet::new(),
        };
        if members.insert(member.to_string()) {
            Self::write(&path, &serde_json::to_string(&members)?)?;
        }
        Ok(())
    }

    fn members_of(&self, key: &str) -> Result<BTreeSet<String>> {
        match Self::read(&self.path_for(key, "set.json")?)? {
            Some(content) => Ok(serde_json::from_str(&content)?),
            None => Ok(BTreeSet::new()),
        }
    }

    fn backend_type(&self) -> &'static str {
        "file"
    }
}
