//! Per-invocation scratch directories.
//!
//! Every invocation gets its own directory under the workspace root, named
//! after the time, the snapshot's content hash, and a random suffix. Concurrent
//! invocations therefore never share or wipe each other's files.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use tracing::{debug, info, instrument, warn};

use crate::core::path::join_under;
use crate::core::snapshot::Snapshot;
use crate::error::WorkspaceError;

/// A populated scratch directory owned by one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Absolute path to the workspace root.
    root: PathBuf,
    /// Directory name (timestamp, snapshot hash prefix, random suffix).
    name: String,
}

impl Workspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Delete the workspace directory.
    #[instrument(skip_all, fields(workspace = %self.name))]
    pub fn teardown(self) -> Result<(), WorkspaceError> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root).map_err(|source| WorkspaceError::Io {
                path: self.root.clone(),
                source,
            })?;
        }
        debug!("workspace removed");
        Ok(())
    }
}

/// Factory for invocation workspaces under a common root.
#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Materialize `snapshot` into a fresh workspace.
    ///
    /// Contents are written verbatim. On any failure the partially written
    /// directory is removed and the error returned; a half-built workspace is
    /// never handed out.
    #[instrument(skip_all, fields(files = snapshot.len()))]
    pub fn prepare(&self, snapshot: &Snapshot) -> Result<Workspace, WorkspaceError> {
        fs::create_dir_all(&self.root).map_err(|source| WorkspaceError::Io {
            path: self.root.clone(),
            source,
        })?;

        let name = build_workspace_name(
            &generate_timestamp(),
            &snapshot.content_hash(),
            &generate_short_id(),
        );
        let root = self.root.join(&name);
        if root.exists() {
            warn!(workspace = %name, "workspace directory already exists, wiping");
            fs::remove_dir_all(&root).map_err(|source| WorkspaceError::Io {
                path: root.clone(),
                source,
            })?;
        }
        fs::create_dir(&root).map_err(|source| WorkspaceError::Io {
            path: root.clone(),
            source,
        })?;

        if let Err(err) = populate(&root, snapshot) {
            warn!(workspace = %name, err = %err, "populating workspace failed, removing it");
            if let Err(cleanup) = fs::remove_dir_all(&root) {
                warn!(err = %cleanup, "failed to remove partial workspace");
            }
            return Err(err);
        }

        info!(workspace = %name, "workspace prepared");
        Ok(Workspace { root, name })
    }
}

fn populate(root: &Path, snapshot: &Snapshot) -> Result<(), WorkspaceError> {
    for (path, content) in snapshot.iter() {
        let target = join_under(root, path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|source| WorkspaceError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&target, content).map_err(|source| WorkspaceError::Io {
            path: target.clone(),
            source,
        })?;
    }
    Ok(())
}

pub fn build_workspace_name(timestamp: &str, content_hash: &str, short_id: &str) -> String {
    let hash = content_hash.get(..12).unwrap_or(content_hash);
    format!("{timestamp}_{hash}_{short_id}")
}

fn generate_timestamp() -> String {
    Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

pub(crate) fn generate_short_id() -> String {
    let mut rng = rand::thread_rng();
    std::iter::repeat_with(|| rng.sample(Alphanumeric))
        .map(char::from)
        .take(6)
        .collect::<String>()
        .to_lowercase()
}
