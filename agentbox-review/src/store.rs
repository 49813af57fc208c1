//! Pending review state persisted between CLI invocations.

use std::fs;
use std::path::{Path, PathBuf};

use agentbox::core::review::ReviewState;
use anyhow::{Context, Result};

/// `<state_dir>/pending.json`, written atomically.
#[derive(Debug, Clone)]
pub struct ReviewStore {
    path: PathBuf,
}

impl ReviewStore {
    pub fn new(state_dir: &Path) -> Self {
        Self {
            path: state_dir.join("pending.json"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state; a missing file means nothing is pending.
    pub fn load(&self) -> Result<ReviewState> {
        if !self.path.exists() {
            return Ok(ReviewState::Empty);
        }
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("read {}", self.path.display()))?;
        serde_json::from_str(&contents).with_context(|| format!("parse {}", self.path.display()))
    }

    pub fn save(&self, state: &ReviewState) -> Result<()> {
        let parent = self
            .path
            .parent()
            .with_context(|| format!("state path missing parent {}", self.path.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
        let mut buf = serde_json::to_string_pretty(state).context("serialize review state")?;
        buf.push('\n');
        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("replace {}", self.path.display()))?;
        Ok(())
    }
}
