//! Read a workspace back and diff it against its snapshot.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use tracing::{debug, instrument, warn};
use walkdir::WalkDir;

use crate::core::detect::reconcile;
use crate::core::path::relative_to;
use crate::core::snapshot::Snapshot;
use crate::core::types::ChangeSet;
use crate::error::DetectionError;

/// Walk every regular file under `root` and report what differs from `snapshot`.
///
/// Symlinks are not followed. Files missing from the snapshot are reported as
/// modified; snapshot paths missing from the workspace as deleted.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn diff(snapshot: &Snapshot, root: &Path) -> Result<ChangeSet, DetectionError> {
    if !root.is_dir() {
        return Err(DetectionError::RootMissing {
            path: root.to_path_buf(),
        });
    }

    let mut observed = BTreeMap::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.map_err(|source| DetectionError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = relative_to(root, entry.path())?;
        let bytes = fs::read(entry.path()).map_err(|source| DetectionError::Read {
            path: entry.path().to_path_buf(),
            source,
        })?;
        if std::str::from_utf8(&bytes).is_err() {
            warn!(path = %rel, "workspace file is not UTF-8, content will be reported lossily");
        }
        observed.insert(rel, bytes);
    }

    let changes = reconcile(snapshot, &observed);
    debug!(
        scanned = observed.len(),
        modified = changes.modified_files.len(),
        deleted = changes.deleted_files.len(),
        "workspace diffed"
    );
    Ok(changes)
}
