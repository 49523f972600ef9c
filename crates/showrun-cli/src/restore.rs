//! Restore point persistence.
//!
//! The runtime's restore point is written to a JSON file so a restarted
//! process can pick up where the show was. Writes go to a sibling temp file
//! first and are renamed into place.

use anyhow::{Context, Result};
use showrun_core::RestorePoint;
use std::fs;
use std::path::{Path, PathBuf};

pub struct RestoreStore {
    path: PathBuf,
    last_saved: Option<RestorePoint>,
}

impl RestoreStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            last_saved: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored point. A missing file is not an error.
    pub fn load(&self) -> Result<Option<RestorePoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read restore file: {}", self.path.display()))?;
        let point = serde_json::from_str(&content)
            .with_context(|| format!("Invalid restore file: {}", self.path.display()))?;
        Ok(Some(point))
    }

    /// Write the point unless it only differs from the last saved one by
    /// its epoch. Returns whether a write happened.
    pub fn save_if_changed(&mut self, point: &RestorePoint) -> Result<bool> {
        let unchanged = self.last_saved.as_ref().is_some_and(|last| {
            let mut candidate = point.clone();
            candidate.epoch = last.epoch;
            candidate == *last
        });
        if unchanged {
            return Ok(false);
        }
        self.save(point)?;
        Ok(true)
    }

    pub fn save(&mut self, point: &RestorePoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(point)?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        self.last_saved = Some(point.clone());
        Ok(())
    }
}
