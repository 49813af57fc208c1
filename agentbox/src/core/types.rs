//! Wire and domain types shared by the server and the review client.
//!
//! JSON field names are camelCase; these shapes are the stable contract of
//! the `run-agent` stream and the `commit-changes` request.

use serde::{Deserialize, Serialize};

/// One input file: a relative path plus its text content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content: String,
}

impl FileRecord {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// A file whose workspace content differs from its snapshot (or is new).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedFile {
    pub path: String,
    pub modified_content: String,
}

/// Result of one run: modified or added files plus snapshot paths the agent removed.
///
/// Ordered by path. Held by the caller as the pending change set until it is
/// committed or discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSet {
    pub modified_files: Vec<ModifiedFile>,
    #[serde(default)]
    pub deleted_files: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.modified_files.is_empty() && self.deleted_files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.modified_files.len() + self.deleted_files.len()
    }

    /// All touched paths: modified first, then deleted.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.modified_files
            .iter()
            .map(|file| file.path.as_str())
            .chain(self.deleted_files.iter().map(String::as_str))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.paths().any(|candidate| candidate == path)
    }

    pub fn modified(&self, path: &str) -> Option<&ModifiedFile> {
        self.modified_files.iter().find(|file| file.path == path)
    }
}

/// Category of a failure reported in a terminal stream record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    Validation,
    Workspace,
    Spawn,
    AgentExit,
    Timeout,
    Detection,
    Internal,
}

/// Failure payload of a terminal stream record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureDetail {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl FailureDetail {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            exit_code: None,
            stderr: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub stdout: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub error: FailureDetail,
}

/// One line of the `run-agent` response stream.
///
/// Zero or more `Progress` records are followed by exactly one terminal
/// record: `Completed` on success, `Failed` otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StreamRecord {
    Progress(ProgressRecord),
    Completed(ChangeSet),
    Failed(FailureRecord),
}

impl StreamRecord {
    pub fn progress(line: impl Into<String>) -> Self {
        StreamRecord::Progress(ProgressRecord {
            stdout: line.into(),
        })
    }

    pub fn failed(detail: FailureDetail) -> Self {
        StreamRecord::Failed(FailureRecord { error: detail })
    }
}
