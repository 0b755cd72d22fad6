use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

/// The persisted active-listing snapshot: one JSON array of listing keys.
///
/// The snapshot is an immutable value: `replace` writes the whole new set
/// to a temporary file in the same directory and renames it into place, so
/// readers only ever observe a complete snapshot and a failed sync run
/// leaves the previous one untouched. It is never opened and appended.
pub struct ActiveSetStore {
    path: PathBuf,
}

impl ActiveSetStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the current snapshot. A missing file is an empty set (first run).
    pub fn load(&self) -> Result<BTreeSet<String>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        let data = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading active set {:?}", self.path))?;
        let keys: Vec<String> = serde_json::from_str(&data)
            .with_context(|| format!("parsing active set {:?}", self.path))?;
        Ok(keys.into_iter().collect())
    }

    /// Atomically replace the snapshot with `keys`.
    pub fn replace(&self, keys: &BTreeSet<String>) -> Result<()> {
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        let mut tmp = tempfile::NamedTempFile::new_in(dir)
            .with_context(|| format!("creating temp snapshot in {:?}", dir))?;
        let ordered: Vec<&String> = keys.iter().collect();
        serde_json::to_writer(&mut tmp, &ordered).context("serializing active set")?;
        tmp.flush().context("flushing active set")?;
        tmp.persist(&self.path)
            .with_context(|| format!("replacing active set {:?}", self.path))?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.load()?.len())
    }
}
