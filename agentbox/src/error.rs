//! Error types for the invocation pipeline.
//!
//! Each stage owns one error type so callers can tell a bad request apart from
//! a broken workspace or a failed agent. [`PipelineError`] aggregates them for
//! the server, which decides between an HTTP status (before streaming) and a
//! terminal failure record (after streaming started).

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::core::types::{FailureDetail, FailureKind};

/// A relative path that cannot be used as a key inside a workspace or store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path '{path}' is absolute")]
    Absolute { path: String },
    #[error("path '{path}' escapes its root")]
    Traversal { path: String },
    #[error("path '{path}' is not valid UTF-8")]
    NonUtf8 { path: String },
}

/// Bad or missing request fields. No process is spawned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("files must not be empty")]
    NoFiles,
    #[error("instruction must not be empty")]
    EmptyInstruction,
    #[error("command must not be empty")]
    EmptyCommand,
    #[error("invalid file path: {0}")]
    InvalidPath(#[from] PathError),
    #[error("duplicate path '{path}'")]
    DuplicatePath { path: String },
    #[error("unknown agent kind '{kind}'")]
    UnknownAgent { kind: String },
}

/// I/O failure while materializing or removing a workspace.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("workspace path rejected: {0}")]
    Path(#[from] PathError),
}

/// The agent executable could not be launched.
#[derive(Debug, Error)]
#[error("failed to launch '{program}': {source}")]
pub struct SpawnError {
    pub program: String,
    #[source]
    pub source: std::io::Error,
}

/// The agent ran but did not succeed.
///
/// Everything it printed before failing has already been streamed; the
/// workspace is kept for inspection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentFailure {
    #[error("agent exited with status {code:?}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("agent timed out after {}s", after.as_secs())]
    Timeout { after: Duration, stderr: String },
}

impl AgentFailure {
    pub fn stderr(&self) -> &str {
        match self {
            AgentFailure::Exit { stderr, .. } | AgentFailure::Timeout { stderr, .. } => stderr,
        }
    }
}

/// Reading back the workspace failed (for example it vanished mid-walk).
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("workspace root {path} is missing")]
    RootMissing { path: PathBuf },
    #[error("walk {path}: {source}")]
    Walk {
        path: PathBuf,
        source: walkdir::Error,
    },
    #[error("read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("workspace entry rejected: {0}")]
    Path(#[from] PathError),
}

/// A single path failed to apply to the true store. Other paths are unaffected.
#[derive(Debug, Error)]
pub enum CommitError {
    #[error("rejected path: {0}")]
    Path(#[from] PathError),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Any failure of a run, from request validation to change detection.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
    #[error(transparent)]
    Spawn(#[from] SpawnError),
    #[error("render arguments for agent '{kind}': {source}")]
    Profile {
        kind: String,
        source: minijinja::Error,
    },
    #[error(transparent)]
    Agent(#[from] AgentFailure),
    #[error(transparent)]
    Detection(#[from] DetectionError),
    #[error("agent output: {0}")]
    Io(#[from] std::io::Error),
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("pipeline is shutting down")]
    Closed,
}

impl PipelineError {
    /// Whether the caller caused this error (maps to a 4xx response).
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }

    /// Terminal record payload for errors raised after streaming began.
    pub fn failure_detail(&self) -> FailureDetail {
        let message = self.to_string();
        match self {
            PipelineError::Agent(failure) => {
                let (kind, exit_code) = match failure {
                    AgentFailure::Exit { code, .. } => (FailureKind::AgentExit, *code),
                    AgentFailure::Timeout { .. } => (FailureKind::Timeout, None),
                };
                FailureDetail {
                    kind,
                    message,
                    exit_code,
                    stderr: Some(failure.stderr().to_string()).filter(|s| !s.is_empty()),
                }
            }
            PipelineError::Detection(_) => FailureDetail::new(FailureKind::Detection, message),
            PipelineError::Validation(_) => FailureDetail::new(FailureKind::Validation, message),
            PipelineError::Workspace(_) => FailureDetail::new(FailureKind::Workspace, message),
            PipelineError::Spawn(_) | PipelineError::Profile { .. } => {
                FailureDetail::new(FailureKind::Spawn, message)
            }
            PipelineError::Io(_) | PipelineError::Task(_) | PipelineError::Closed => {
                FailureDetail::new(FailureKind::Internal, message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_exit_detail_carries_code_and_stderr() {
        let err = PipelineError::Agent(AgentFailure::Exit {
            code: Some(1),
            stderr: "boom".to_string(),
        });
        let detail = err.failure_detail();
        assert_eq!(detail.kind, FailureKind::AgentExit);
        assert_eq!(detail.exit_code, Some(1));
        assert_eq!(detail.stderr.as_deref(), Some("boom"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn timeout_detail_omits_empty_stderr() {
        let err = PipelineError::Agent(AgentFailure::Timeout {
            after: Duration::from_secs(5),
            stderr: String::new(),
        });
        let detail = err.failure_detail();
        assert_eq!(detail.kind, FailureKind::Timeout);
        assert_eq!(detail.stderr, None);
        assert!(detail.message.contains("5s"));
    }

    #[test]
    fn validation_is_client_error() {
        let err = PipelineError::from(ValidationError::NoFiles);
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "files must not be empty");
    }
}
