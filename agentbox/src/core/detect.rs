//! Byte-level classification of workspace files against a snapshot.
//!
//! The directory walk lives in [`crate::io::detect`]; this module only decides
//! what counts as a change, so it can be tested without a filesystem.

use std::collections::BTreeMap;

use crate::core::snapshot::Snapshot;
use crate::core::types::{ChangeSet, ModifiedFile};

/// How a workspace file relates to its snapshot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    Unchanged,
    Modified,
    /// Not present in the snapshot; always reported.
    Added,
}

/// Compare raw bytes. No line-ending or whitespace normalization.
pub fn classify(original: Option<&[u8]>, current: &[u8]) -> FileStatus {
    match original {
        None => FileStatus::Added,
        Some(original) if original == current => FileStatus::Unchanged,
        Some(_) => FileStatus::Modified,
    }
}

/// Build the change set from the files observed in a workspace.
///
/// `observed` maps normalized relative paths to current bytes. Snapshot paths
/// missing from `observed` are reported as deleted. Output is path-ordered.
pub fn reconcile(snapshot: &Snapshot, observed: &BTreeMap<String, Vec<u8>>) -> ChangeSet {
    let modified_files = observed
        .iter()
        .filter(|(path, current)| classify(snapshot.get(path), current) != FileStatus::Unchanged)
        .map(|(path, current)| ModifiedFile {
            path: path.clone(),
            modified_content: String::from_utf8_lossy(current).into_owned(),
        })
        .collect();

    let deleted_files = snapshot
        .paths()
        .filter(|path| !observed.contains_key(*path))
        .map(str::to_string)
        .collect();

    ChangeSet {
        modified_files,
        deleted_files,
    }
}
