//! One agent invocation from request to change set.
//!
//! [`Pipeline::start`] does everything that can fail before a response is
//! streamed (validation, snapshot, workspace, spawn). [`RunningInvocation::drive`]
//! then forwards progress and reconciles the workspace once the agent exits.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc};
use tracing::{info, instrument, warn};

use crate::core::snapshot::Snapshot;
use crate::core::types::{ChangeSet, FileRecord};
use crate::error::{PipelineError, ValidationError};
use crate::io::agent::{AgentInvoker, AgentRegistry, AgentRun, InvocationOutcome};
use crate::io::config::AgentboxConfig;
use crate::io::detect::diff;
use crate::io::process::{ProcessRunner, RunLimits, RunningProcess, TokioProcessRunner};
use crate::io::workspace::{Workspace, WorkspaceManager};

/// Body of a `run-agent` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    pub instruction: String,
    pub files: Vec<FileRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_kind: Option<String>,
    /// Strip surrounding whitespace from each file before snapshotting.
    #[serde(default)]
    pub trim: bool,
}

impl RunRequest {
    pub fn new(instruction: impl Into<String>, files: Vec<FileRecord>) -> Self {
        Self {
            instruction: instruction.into(),
            files,
            agent_kind: None,
            trim: false,
        }
    }
}

/// Shared entry point for agent runs. Cheap to clone.
#[derive(Debug)]
pub struct Pipeline<R: ProcessRunner = TokioProcessRunner> {
    inner: Arc<Inner<R>>,
}

impl<R: ProcessRunner> Clone for Pipeline<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct Inner<R> {
    invoker: AgentInvoker<R>,
    workspaces: WorkspaceManager,
    agents: AgentRegistry,
    keep_workspaces: bool,
    permits: Arc<Semaphore>,
}

impl<R: ProcessRunner> Pipeline<R> {
    pub fn new(config: &AgentboxConfig, runner: R) -> Self {
        let limits = RunLimits {
            timeout: std::time::Duration::from_secs(config.agent_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        };
        Self {
            inner: Arc::new(Inner {
                invoker: AgentInvoker::new(runner, limits),
                workspaces: WorkspaceManager::new(&config.workspace_root),
                agents: AgentRegistry::from_config(config),
                keep_workspaces: config.keep_workspaces,
                permits: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
            }),
        }
    }

    pub fn runner(&self) -> &R {
        self.inner.invoker.runner()
    }

    pub fn limits(&self) -> RunLimits {
        self.inner.invoker.limits()
    }

    /// Validate, snapshot, prepare a workspace, and launch the agent.
    ///
    /// Waits for a free run slot when `max_concurrent_runs` agents are
    /// already running. On error nothing is left behind.
    #[instrument(skip_all, fields(files = request.files.len(), agent = ?request.agent_kind))]
    pub async fn start(
        &self,
        request: RunRequest,
    ) -> Result<RunningInvocation<R::Running>, PipelineError> {
        let instruction = request.instruction.trim();
        if instruction.is_empty() {
            return Err(ValidationError::EmptyInstruction.into());
        }
        let profile = self
            .inner
            .agents
            .resolve(request.agent_kind.as_deref())?
            .clone();
        let snapshot = Snapshot::capture(&request.files, request.trim)?;

        let permit = Arc::clone(&self.inner.permits)
            .acquire_owned()
            .await
            .map_err(|_| PipelineError::Closed)?;

        let manager = self.inner.workspaces.clone();
        let (workspace, snapshot) = tokio::task::spawn_blocking(move || {
            manager.prepare(&snapshot).map(|workspace| (workspace, snapshot))
        })
        .await??;

        let run = match self.inner.invoker.launch(&workspace, instruction, &profile) {
            Ok(run) => run,
            Err(err) => {
                let name = workspace.name().to_string();
                if let Err(cleanup) = tokio::task::spawn_blocking(move || workspace.teardown()).await? {
                    warn!(workspace = %name, err = %cleanup, "failed to remove workspace after launch error");
                }
                return Err(err);
            }
        };

        info!(workspace = %workspace.name(), agent = %profile.kind(), "invocation started");
        Ok(RunningInvocation {
            run,
            workspace,
            snapshot,
            keep_workspace: self.inner.keep_workspaces,
            permit,
        })
    }

    /// Start and drive in one step.
    pub async fn run(
        &self,
        request: RunRequest,
        progress: mpsc::Sender<String>,
    ) -> Result<ChangeSet, PipelineError> {
        self.start(request).await?.drive(progress).await
    }
}

/// A launched agent bound to its workspace and snapshot.
///
/// Dropping it before [`RunningInvocation::drive`] completes kills the agent
/// and leaves the workspace on disk.
#[derive(Debug)]
pub struct RunningInvocation<P> {
    run: AgentRun<P>,
    workspace: Workspace,
    snapshot: Snapshot,
    keep_workspace: bool,
    permit: OwnedSemaphorePermit,
}

impl<P: RunningProcess> RunningInvocation<P> {
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Forward progress lines until the agent exits, then report its changes.
    ///
    /// A failed agent leaves its workspace for inspection. A successful one is
    /// diffed and torn down unless workspaces are kept.
    #[instrument(skip_all, fields(invocation = %self.workspace.name()))]
    pub async fn drive(self, progress: mpsc::Sender<String>) -> Result<ChangeSet, PipelineError> {
        let RunningInvocation {
            run,
            workspace,
            snapshot,
            keep_workspace,
            permit,
        } = self;

        let outcome = run.wait(progress).await?;
        drop(permit);
        if let InvocationOutcome::Failed(failure) = outcome {
            warn!(workspace = %workspace.root().display(), "agent failed, workspace kept");
            return Err(failure.into());
        }

        let changes = tokio::task::spawn_blocking(move || -> Result<ChangeSet, PipelineError> {
            let changes = diff(&snapshot, workspace.root())?;
            if keep_workspace {
                info!(workspace = %workspace.root().display(), "workspace kept");
            } else if let Err(err) = workspace.teardown() {
                warn!(err = %err, "failed to remove workspace");
            }
            Ok(changes)
        })
        .await??;

        info!(
            modified = changes.modified_files.len(),
            deleted = changes.deleted_files.len(),
            "invocation finished"
        );
        Ok(changes)
    }
}
