//! Server configuration stored as TOML (`agentbox.toml` by default).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Agentbox configuration (TOML).
///
/// Missing fields default to values suitable for a local single-user setup.
/// Declaring any `[agents.*]` table replaces the built-in agent list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentboxConfig {
    /// Parent directory of per-invocation workspaces.
    pub workspace_root: PathBuf,

    /// Root of the true store that `commit-changes` writes into.
    pub store_root: PathBuf,

    /// Hard wall-clock ceiling for one agent run, in seconds.
    pub agent_timeout_secs: u64,

    /// Keep at most this many bytes of agent stderr (and raw stdout) in memory.
    pub output_limit_bytes: usize,

    /// Agent processes allowed to run at once; further runs wait.
    pub max_concurrent_runs: usize,

    /// Keep successful workspaces instead of deleting them after diffing.
    pub keep_workspaces: bool,

    /// Serve the `run-raw-command` escape hatch.
    pub raw_command_enabled: bool,

    /// Agent used when a request does not name one.
    pub default_agent: String,

    pub agents: BTreeMap<String, AgentConfig>,
}

/// How to launch one kind of agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentConfig {
    /// Executable name or path.
    pub executable: String,
    /// Argument templates; `{{ instruction }}` and `{{ workspace }}` are substituted.
    pub args: Vec<String>,
    /// Extra environment on top of the inherited one.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl AgentConfig {
    fn new(executable: &str, args: &[&str]) -> Self {
        Self {
            executable: executable.to_string(),
            args: args.iter().map(|arg| arg.to_string()).collect(),
            env: BTreeMap::new(),
        }
    }
}

pub fn default_agents() -> BTreeMap<String, AgentConfig> {
    let mut agents = BTreeMap::new();
    agents.insert(
        "claude".to_string(),
        AgentConfig::new(
            "claude",
            &[
                "-p",
                "{{ instruction }}",
                "--dangerously-skip-permissions",
            ],
        ),
    );
    agents.insert(
        "codex".to_string(),
        AgentConfig::new(
            "codex",
            &[
                "exec",
                "--sandbox",
                "danger-full-access",
                // Workspaces are plain directories, not git checkouts.
                "--skip-git-repo-check",
                "{{ instruction }}",
            ],
        ),
    );
    agents
}

impl Default for AgentboxConfig {
    fn default() -> Self {
        Self {
            workspace_root: std::env::temp_dir().join("agentbox-workspaces"),
            store_root: PathBuf::from("."),
            agent_timeout_secs: 30 * 60,
            output_limit_bytes: 100_000,
            max_concurrent_runs: 4,
            keep_workspaces: false,
            raw_command_enabled: true,
            default_agent: "claude".to_string(),
            agents: default_agents(),
        }
    }
}

impl AgentboxConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.max_concurrent_runs == 0 {
            return Err(anyhow!("max_concurrent_runs must be > 0"));
        }
        if self.workspace_root.as_os_str().is_empty() {
            return Err(anyhow!("workspace_root must not be empty"));
        }
        if self.agents.is_empty() {
            return Err(anyhow!("at least one agent must be configured"));
        }
        if !self.agents.contains_key(&self.default_agent) {
            return Err(anyhow!(
                "default_agent '{}' is not configured",
                self.default_agent
            ));
        }
        let env = minijinja::Environment::new();
        for (kind, agent) in &self.agents {
            if agent.executable.trim().is_empty() {
                return Err(anyhow!("agents.{kind}.executable must not be empty"));
            }
            for arg in &agent.args {
                env.template_from_str(arg)
                    .with_context(|| format!("agents.{kind}.args: invalid template {arg:?}"))?;
            }
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentboxConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentboxConfig> {
    if !path.exists() {
        let cfg = AgentboxConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentboxConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentboxConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentboxConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agentbox.toml");
        let cfg = AgentboxConfig::default();
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agentbox.toml");
        fs::write(&path, "agent_timeout_secs = 60\nkeep_workspaces = true\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agent_timeout_secs, 60);
        assert!(cfg.keep_workspaces);
        assert!(cfg.agents.contains_key("codex"));
    }

    #[test]
    fn custom_agents_replace_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("agentbox.toml");
        fs::write(
            &path,
            "default_agent = \"local\"\n\n[agents.local]\nexecutable = \"my-agent\"\nargs = [\"--task\", \"{{ instruction }}\"]\n",
        )
        .expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.agents.len(), 1);
        assert_eq!(cfg.agents["local"].executable, "my-agent");
    }

    #[test]
    fn rejects_unknown_default_agent() {
        let cfg = AgentboxConfig {
            default_agent: "missing".to_string(),
            ..AgentboxConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("default_agent"));
    }

    #[test]
    fn rejects_broken_arg_template() {
        let mut cfg = AgentboxConfig::default();
        cfg.agents
            .get_mut("claude")
            .expect("claude")
            .args
            .push("{{ instruction".to_string());
        assert!(cfg.validate().is_err());
    }
}
