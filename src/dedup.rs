use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::error::Result;

/// Ids of posts already relayed for one feed, oldest first.
pub struct DedupTracker {
    path: PathBuf,
    ids: Vec<i64>,
}

impl DedupTracker {
    /// Create an empty state file if there is none yet.
    pub fn ensure(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, "[]")?;

        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let ids = serde_json::from_slice(&bytes)?;

        Ok(Self { path: path.to_path_buf(), ids })
    }

    pub fn contains(&self, id: i64) -> bool {
        self.ids.contains(&id)
    }

    pub fn append(&mut self, id: i64) {
        self.ids.push(id);
    }

    /// Keep the `cap` most recently appended ids. Numeric order plays no part.
    pub fn trim(&mut self, cap: usize) {
        if self.ids.len() > cap {
            self.ids.drain(..self.ids.len() - cap);
        }
    }

    pub fn persist(&self) -> Result<()> {
        let ids_export = serde_json::to_string(&self.ids)?;
        fs::write(&self.path, ids_export)?;

        Ok(())
    }

    pub fn ids(&self) -> &[i64] {
        &self.ids
    }
}
