//! Apply an approved change set to the true store.
//!
//! Each path is applied on its own: writes go to a sibling temp file that is
//! renamed over the target, so a single file is never left half-written. There
//! is no transaction across paths; a failure is recorded for that path and the
//! remaining paths are still applied.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::core::path::join_under;
use crate::core::types::ChangeSet;
use crate::error::CommitError;
use crate::io::workspace::generate_short_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommitAction {
    Write,
    Delete,
}

/// Outcome for one path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathResult {
    pub path: String,
    pub action: CommitAction,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Per-path results of one commit, in application order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
    pub results: Vec<PathResult>,
    pub applied: usize,
    pub failed: usize,
}

impl CommitReport {
    fn record(&mut self, path: &str, action: CommitAction, result: Result<(), CommitError>) {
        let error = match result {
            Ok(()) => {
                self.applied += 1;
                None
            }
            Err(err) => {
                warn!(path, err = %err, "commit failed for path");
                self.failed += 1;
                Some(err.to_string())
            }
        };
        self.results.push(PathResult {
            path: path.to_string(),
            action,
            ok: error.is_none(),
            error,
        });
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// Write every modified file, then remove every deleted one, under `store_root`.
#[instrument(skip_all, fields(store_root = %store_root.display(), paths = changes.len()))]
pub fn commit(store_root: &Path, changes: &ChangeSet) -> CommitReport {
    let mut report = CommitReport::default();
    for file in &changes.modified_files {
        let result = write_one(store_root, &file.path, file.modified_content.as_bytes());
        report.record(&file.path, CommitAction::Write, result);
    }
    for path in &changes.deleted_files {
        let result = delete_one(store_root, path);
        report.record(path, CommitAction::Delete, result);
    }
    info!(
        applied = report.applied,
        failed = report.failed,
        "commit finished"
    );
    report
}

fn write_one(store_root: &Path, path: &str, contents: &[u8]) -> Result<(), CommitError> {
    let target = join_under(store_root, path)?;
    write_atomic(&target, contents)
}

fn delete_one(store_root: &Path, path: &str) -> Result<(), CommitError> {
    let target = join_under(store_root, path)?;
    match fs::remove_file(&target) {
        Ok(()) => Ok(()),
        // Already gone is the desired end state.
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CommitError::Io {
            path: target,
            source,
        }),
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), CommitError> {
    let parent = path.parent().ok_or_else(|| CommitError::Io {
        path: path.to_path_buf(),
        source: std::io::Error::other("path has no parent"),
    })?;
    fs::create_dir_all(parent).map_err(|source| CommitError::Io {
        path: parent.to_path_buf(),
        source,
    })?;

    let tmp_path = temp_sibling(path);
    fs::write(&tmp_path, contents).map_err(|source| CommitError::Io {
        path: tmp_path.clone(),
        source,
    })?;
    if let Err(source) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(CommitError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

/// Unique per call, so concurrent commits of one path never share a temp file.
fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.{}.agentbox.tmp", generate_short_id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ModifiedFile;

    fn write(path: &str, content: &str) -> ModifiedFile {
        ModifiedFile {
            path: path.to_string(),
            modified_content: content.to_string(),
        }
    }

    #[test]
    fn concurrent_commits_of_one_path_all_succeed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path();

        std::thread::scope(|scope| {
            for worker in 0..8 {
                scope.spawn(move || {
                    for round in 0..20 {
                        let changes = ChangeSet {
                            modified_files: vec![write("shared.txt", &format!("{worker}-{round}"))],
                            deleted_files: Vec::new(),
                        };
                        let report = commit(root, &changes);
                        assert!(report.is_complete(), "{report:?}");
                    }
                });
            }
        });

        let leftovers: Vec<_> = fs::read_dir(root)
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name())
            .filter(|name| name != "shared.txt")
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
        assert!(fs::read_to_string(root.join("shared.txt")).expect("read").contains('-'));
    }

    #[test]
    fn creates_missing_parent_directories() {
        let temp = tempfile::tempdir().expect("tempdir");
        let changes = ChangeSet {
            modified_files: vec![write("deep/new/dir/file.txt", "content")],
            deleted_files: Vec::new(),
        };

        let report = commit(temp.path(), &changes);
        assert!(report.is_complete());
        assert_eq!(
            fs::read_to_string(temp.path().join("deep/new/dir/file.txt")).expect("read"),
            "content"
        );
        let names: Vec<_> = fs::read_dir(temp.path().join("deep/new/dir"))
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, vec!["file.txt"]);
    }

    #[test]
    fn applying_twice_is_idempotent() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("a.txt"), "hello").expect("seed");
        fs::write(temp.path().join("old.txt"), "bye").expect("seed");
        let changes = ChangeSet {
            modified_files: vec![write("a.txt", "hello world"), write("b/c.txt", "c")],
            deleted_files: vec!["old.txt".to_string()],
        };

        let first = commit(temp.path(), &changes);
        let after_first = (
            fs::read_to_string(temp.path().join("a.txt")).expect("a"),
            fs::read_to_string(temp.path().join("b/c.txt")).expect("c"),
            temp.path().join("old.txt").exists(),
        );
        let second = commit(temp.path(), &changes);
        let after_second = (
            fs::read_to_string(temp.path().join("a.txt")).expect("a"),
            fs::read_to_string(temp.path().join("b/c.txt")).expect("c"),
            temp.path().join("old.txt").exists(),
        );

        assert!(first.is_complete());
        assert!(second.is_complete());
        assert_eq!(after_first, after_second);
        assert_eq!(after_first.0, "hello world");
        assert!(!after_first.2);
    }

    #[test]
    fn failed_path_does_not_block_others() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("blocker"), "a file, not a dir").expect("seed");
        let changes = ChangeSet {
            modified_files: vec![
                write("blocker/inner.txt", "x"),
                write("../escape.txt", "x"),
                write("fine.txt", "ok"),
            ],
            deleted_files: Vec::new(),
        };

        let report = commit(temp.path(), &changes);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 2);
        assert!(!report.results[0].ok);
        assert!(
            report.results[1]
                .error
                .as_deref()
                .unwrap_or_default()
                .contains("escapes")
        );
        assert!(report.results[2].ok);
        assert_eq!(
            fs::read_to_string(temp.path().join("fine.txt")).expect("read"),
            "ok"
        );
    }

    #[test]
    fn report_serializes_compactly() {
        let mut report = CommitReport::default();
        report.record("a.txt", CommitAction::Write, Ok(()));
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(
            json,
            serde_json::json!({
                "results": [{"path": "a.txt", "action": "write", "ok": true}],
                "applied": 1,
                "failed": 0,
            })
        );
    }
}
