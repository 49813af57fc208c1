//! Agent profiles and invocation.
//!
//! An [`AgentProfile`] is the only thing that differs between agent kinds: the
//! executable and how the instruction is placed on its command line. The
//! [`AgentInvoker`] runs any profile inside a workspace through a
//! [`ProcessRunner`], so tests can swap in a scripted runner.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use minijinja::{Environment, context};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use crate::error::{AgentFailure, PipelineError, ValidationError};
use crate::io::config::{AgentConfig, AgentboxConfig};
use crate::io::process::{CommandSpec, OutputSinks, ProcessRunner, RunLimits, RunningProcess};
use crate::io::workspace::Workspace;

/// Launch recipe for one agent kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentProfile {
    kind: String,
    executable: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
}

impl AgentProfile {
    pub fn from_config(kind: &str, config: &AgentConfig) -> Self {
        Self {
            kind: kind.to_string(),
            executable: config.executable.clone(),
            args: config.args.clone(),
            env: config.env.clone(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    /// Render the argument templates for one invocation.
    ///
    /// Each template yields exactly one argument, so an instruction with
    /// spaces or quotes is never re-split.
    pub fn build_args(
        &self,
        instruction: &str,
        workspace: &Path,
    ) -> Result<Vec<String>, minijinja::Error> {
        let env = Environment::new();
        let ctx = context! {
            instruction => instruction,
            workspace => workspace.display().to_string(),
        };
        self.args
            .iter()
            .map(|template| env.render_str(template, &ctx))
            .collect()
    }

    pub fn command(&self, instruction: &str, workspace: &Path) -> Result<CommandSpec, PipelineError> {
        let args = self
            .build_args(instruction, workspace)
            .map_err(|source| PipelineError::Profile {
                kind: self.kind.clone(),
                source,
            })?;
        let mut spec = CommandSpec::new(&self.executable, workspace).args(args);
        spec.env = self.env.clone();
        Ok(spec)
    }
}

/// Configured agent kinds plus the default.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    profiles: BTreeMap<String, AgentProfile>,
    default_kind: String,
}

impl AgentRegistry {
    pub fn from_config(config: &AgentboxConfig) -> Self {
        let profiles = config
            .agents
            .iter()
            .map(|(kind, agent)| (kind.clone(), AgentProfile::from_config(kind, agent)))
            .collect();
        Self {
            profiles,
            default_kind: config.default_agent.clone(),
        }
    }

    /// Look up a kind; `None` or blank selects the default.
    pub fn resolve(&self, kind: Option<&str>) -> Result<&AgentProfile, ValidationError> {
        let kind = kind
            .map(str::trim)
            .filter(|kind| !kind.is_empty())
            .unwrap_or(&self.default_kind);
        self.profiles
            .get(kind)
            .ok_or_else(|| ValidationError::UnknownAgent {
                kind: kind.to_string(),
            })
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

/// How an agent run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationOutcome {
    Succeeded { progress_lines: usize },
    Failed(AgentFailure),
}

/// Launches agents inside workspaces.
#[derive(Debug, Clone)]
pub struct AgentInvoker<R> {
    runner: R,
    limits: RunLimits,
}

impl<R: ProcessRunner> AgentInvoker<R> {
    pub fn new(runner: R, limits: RunLimits) -> Self {
        Self { runner, limits }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn limits(&self) -> RunLimits {
        self.limits
    }

    /// Start the agent with the workspace as its working directory.
    #[instrument(skip_all, fields(agent = %profile.kind(), workspace = %workspace.name()))]
    pub fn launch(
        &self,
        workspace: &Workspace,
        instruction: &str,
        profile: &AgentProfile,
    ) -> Result<AgentRun<R::Running>, PipelineError> {
        let spec = profile.command(instruction, workspace.root())?;
        info!(program = %spec.program, "launching agent");
        let process = self.runner.spawn(&spec)?;
        Ok(AgentRun {
            process,
            limits: self.limits,
            kind: profile.kind().to_string(),
        })
    }

    /// Launch and wait in one step.
    pub async fn run(
        &self,
        workspace: &Workspace,
        instruction: &str,
        profile: &AgentProfile,
        progress: mpsc::Sender<String>,
    ) -> Result<InvocationOutcome, PipelineError> {
        let run = self.launch(workspace, instruction, profile)?;
        Ok(run.wait(progress).await?)
    }
}

/// A launched agent. Dropping it before [`AgentRun::wait`] completes kills it.
#[derive(Debug)]
pub struct AgentRun<P> {
    process: P,
    limits: RunLimits,
    kind: String,
}

impl<P: RunningProcess> AgentRun<P> {
    /// Forward stdout lines to `progress` until the agent exits.
    ///
    /// Stderr is kept for diagnostics and only surfaces in a failure.
    #[instrument(skip_all, fields(agent = %self.kind))]
    pub async fn wait(self, progress: mpsc::Sender<String>) -> io::Result<InvocationOutcome> {
        let sinks = OutputSinks {
            stdout: Some(progress),
            stderr: None,
        };
        let outcome = self.process.drive(self.limits, sinks).await?;

        if outcome.timed_out {
            warn!(
                timeout_secs = self.limits.timeout.as_secs(),
                "agent timed out"
            );
            return Ok(InvocationOutcome::Failed(AgentFailure::Timeout {
                after: self.limits.timeout,
                stderr: outcome.stderr_text(),
            }));
        }
        if !outcome.success() {
            warn!(exit_code = ?outcome.exit_code, "agent failed");
            return Ok(InvocationOutcome::Failed(AgentFailure::Exit {
                code: outcome.exit_code,
                stderr: outcome.stderr_text(),
            }));
        }

        info!(progress_lines = outcome.stdout_lines, "agent succeeded");
        Ok(InvocationOutcome::Succeeded {
            progress_lines: outcome.stdout_lines,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn registry() -> AgentRegistry {
        AgentRegistry::from_config(&AgentboxConfig::default())
    }

    #[test]
    fn default_profiles_place_instruction_as_single_argument() {
        let registry = registry();
        let claude = registry.resolve(Some("claude")).expect("claude");
        let args = claude
            .build_args("add a \"hello\" test", Path::new("/ws"))
            .expect("args");
        assert_eq!(
            args,
            vec!["-p", "add a \"hello\" test", "--dangerously-skip-permissions"]
        );

        let codex = registry.resolve(Some("codex")).expect("codex");
        let spec = codex.command("fix it", Path::new("/ws")).expect("spec");
        assert_eq!(spec.program, "codex");
        assert_eq!(spec.workdir, PathBuf::from("/ws"));
        assert_eq!(spec.args.last().map(String::as_str), Some("fix it"));
    }

    #[test]
    fn template_syntax_in_instruction_is_not_evaluated() {
        let profile = registry().resolve(None).expect("default").clone();
        let args = profile
            .build_args("{{ workspace }}", Path::new("/ws"))
            .expect("args");
        assert_eq!(args[1], "{{ workspace }}");
    }

    #[test]
    fn workspace_placeholder_is_rendered() {
        let config = AgentConfig {
            executable: "agent".to_string(),
            args: vec!["--root={{ workspace }}".to_string()],
            env: BTreeMap::new(),
        };
        let profile = AgentProfile::from_config("custom", &config);
        let args = profile.build_args("x", Path::new("/tmp/ws")).expect("args");
        assert_eq!(args, vec!["--root=/tmp/ws"]);
    }

    #[tokio::test]
    async fn run_maps_exit_status_to_outcome() {
        use crate::core::snapshot::Snapshot;
        use crate::core::types::FileRecord;
        use crate::io::workspace::WorkspaceManager;
        use crate::test_support::ScriptedRunner;

        let temp = tempfile::tempdir().expect("tempdir");
        let snapshot =
            Snapshot::capture(&[FileRecord::new("a.txt", "x")], false).expect("snapshot");
        let workspace = WorkspaceManager::new(temp.path())
            .prepare(&snapshot)
            .expect("prepare");
        let profile = registry().resolve(None).expect("default").clone();
        let limits = RunLimits {
            timeout: std::time::Duration::from_secs(5),
            output_limit_bytes: 1000,
        };

        let ok = AgentInvoker::new(ScriptedRunner::succeed().lines(["hi"]), limits);
        let (tx, _rx) = mpsc::channel(4);
        let outcome = ok.run(&workspace, "go", &profile, tx).await.expect("run");
        assert_eq!(outcome, InvocationOutcome::Succeeded { progress_lines: 1 });

        let failing = AgentInvoker::new(ScriptedRunner::succeed().exit(2, "nope"), limits);
        let (tx, _rx) = mpsc::channel(4);
        let outcome = failing
            .run(&workspace, "go", &profile, tx)
            .await
            .expect("run");
        assert_eq!(
            outcome,
            InvocationOutcome::Failed(AgentFailure::Exit {
                code: Some(2),
                stderr: "nope".to_string(),
            })
        );
    }

    #[test]
    fn resolve_defaults_and_rejects_unknown() {
        let registry = registry();
        assert_eq!(registry.resolve(None).expect("default").kind(), "claude");
        assert_eq!(registry.resolve(Some("  ")).expect("blank").kind(), "claude");
        assert_eq!(
            registry.resolve(Some("gpt")).unwrap_err(),
            ValidationError::UnknownAgent {
                kind: "gpt".to_string()
            }
        );
        assert_eq!(registry.kinds().collect::<Vec<_>>(), vec!["claude", "codex"]);
    }
}
