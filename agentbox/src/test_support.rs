//! Test-only helpers: a scripted process runner and config builders.
//!
//! [`ScriptedRunner`] stands in for a real agent. Instead of spawning a child it
//! edits the workspace directly, emits canned stdout lines, and reports a
//! chosen exit status.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::types::FileRecord;
use crate::error::SpawnError;
use crate::io::config::AgentboxConfig;
use crate::io::process::{
    CommandSpec, OutputSinks, ProcessOutcome, ProcessRunner, RunLimits, RunningProcess,
};

type Edit = Arc<dyn Fn(&Path) -> io::Result<()> + Send + Sync>;

#[derive(Clone)]
struct Script {
    lines: Vec<String>,
    stderr: String,
    exit_code: i32,
    hang: bool,
    spawn_fails: bool,
    delay: Duration,
    edits: Vec<Edit>,
}

/// Process runner whose "agent" is a closure over the workspace directory.
#[derive(Clone)]
pub struct ScriptedRunner {
    script: Script,
    spawned: Arc<Mutex<Vec<CommandSpec>>>,
}

impl fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("lines", &self.script.lines)
            .field("exit_code", &self.script.exit_code)
            .field("edits", &self.script.edits.len())
            .finish()
    }
}

impl ScriptedRunner {
    /// An agent that changes nothing and exits 0.
    pub fn succeed() -> Self {
        Self {
            script: Script {
                lines: Vec::new(),
                stderr: String::new(),
                exit_code: 0,
                hang: false,
                spawn_fails: false,
                delay: Duration::ZERO,
                edits: Vec::new(),
            },
            spawned: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// An agent whose executable cannot be launched.
    pub fn spawn_failure() -> Self {
        let mut runner = Self::succeed();
        runner.script.spawn_fails = true;
        runner
    }

    /// An agent that never exits on its own; only the timeout ends it.
    pub fn hang() -> Self {
        let mut runner = Self::succeed();
        runner.script.hang = true;
        runner
    }

    pub fn lines<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script.lines = lines.into_iter().map(Into::into).collect();
        self
    }

    /// Pause between emitted lines.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.script.delay = delay;
        self
    }

    pub fn exit(mut self, code: i32, stderr: impl Into<String>) -> Self {
        self.script.exit_code = code;
        self.script.stderr = stderr.into();
        self
    }

    /// Run `edit` against the workspace root before exiting.
    pub fn edit(mut self, edit: impl Fn(&Path) -> io::Result<()> + Send + Sync + 'static) -> Self {
        self.script.edits.push(Arc::new(edit));
        self
    }

    /// Write `content` to `path` inside the workspace.
    pub fn write(self, path: &str, content: &str) -> Self {
        let path = path.to_string();
        let content = content.to_string();
        self.edit(move |root| {
            let target = root.join(&path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(target, &content)
        })
    }

    /// Remove `path` from the workspace.
    pub fn remove(self, path: &str) -> Self {
        let path = path.to_string();
        self.edit(move |root| fs::remove_file(root.join(&path)))
    }

    /// Every command this runner was asked to spawn, in order.
    pub fn spawned(&self) -> Vec<CommandSpec> {
        self.spawned
            .lock()
            .map(|specs| specs.clone())
            .unwrap_or_default()
    }
}

impl ProcessRunner for ScriptedRunner {
    type Running = ScriptedProcess;

    fn spawn(&self, spec: &CommandSpec) -> Result<ScriptedProcess, SpawnError> {
        if let Ok(mut spawned) = self.spawned.lock() {
            spawned.push(spec.clone());
        }
        if self.script.spawn_fails {
            return Err(SpawnError {
                program: spec.program.clone(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted spawn failure"),
            });
        }
        Ok(ScriptedProcess {
            script: self.script.clone(),
            workdir: spec.workdir.clone(),
        })
    }
}

/// A "running" scripted agent.
pub struct ScriptedProcess {
    script: Script,
    workdir: PathBuf,
}

impl fmt::Debug for ScriptedProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedProcess")
            .field("workdir", &self.workdir)
            .finish()
    }
}

impl RunningProcess for ScriptedProcess {
    async fn drive(self, limits: RunLimits, sinks: OutputSinks) -> io::Result<ProcessOutcome> {
        let mut outcome = ProcessOutcome::default();
        for line in &self.script.lines {
            if !self.script.delay.is_zero() {
                tokio::time::sleep(self.script.delay).await;
            }
            outcome.stdout_lines += 1;
            if let Some(tx) = &sinks.stdout {
                let _ = tx.send(line.clone()).await;
            }
        }

        for edit in &self.script.edits {
            edit(&self.workdir)?;
        }

        if self.script.hang {
            tokio::time::sleep(limits.timeout).await;
            outcome.timed_out = true;
            outcome.stderr = self.script.stderr.into_bytes();
            return Ok(outcome);
        }

        outcome.exit_code = Some(self.script.exit_code);
        outcome.stderr = self.script.stderr.into_bytes();
        Ok(outcome)
    }
}

/// Config rooted in a test directory: workspaces under `root/workspaces`,
/// the true store under `root/store`.
pub fn config_in(root: &Path) -> AgentboxConfig {
    AgentboxConfig {
        workspace_root: root.join("workspaces"),
        store_root: root.join("store"),
        ..AgentboxConfig::default()
    }
}

/// Build request files from `(path, content)` pairs.
pub fn files(entries: &[(&str, &str)]) -> Vec<FileRecord> {
    entries
        .iter()
        .map(|(path, content)| FileRecord::new(*path, *content))
        .collect()
}

/// Names of the directories currently under `root` (empty when it is missing).
pub fn list_dirs(root: &Path) -> Vec<String> {
    let Ok(entries) = fs::read_dir(root) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
