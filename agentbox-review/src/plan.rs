//! Run plans: an instruction plus the files to hand to the agent.
//!
//! A plan file holds `{instruction, files, agentKind?, trim?}` as JSON, bare or
//! inside a Markdown code fence (the usual shape of an LLM answer). Each file
//! entry is either a path read from the local root or an inline
//! `{path, content}` record.

use std::fs;
use std::path::Path;

use agentbox::core::extract::extract_json;
use agentbox::core::types::FileRecord;
use agentbox::io::pipeline::RunRequest;
use anyhow::{Context, Result, bail};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum PlanFile {
    Path(String),
    Inline(FileRecord),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub files: Vec<PlanFile>,
    #[serde(default)]
    pub agent_kind: Option<String>,
    #[serde(default)]
    pub trim: bool,
}

impl Plan {
    pub fn parse(text: &str) -> Result<Self> {
        let value = extract_json(text).context("extract plan JSON")?;
        serde_json::from_value(value).context("parse plan")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text =
            fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
        Self::parse(&text)
    }

    /// Resolve path entries against `root` and build the request.
    pub fn into_request(self, root: &Path) -> Result<RunRequest> {
        if self.instruction.trim().is_empty() {
            bail!("plan has no instruction");
        }
        let mut files = Vec::with_capacity(self.files.len());
        for file in self.files {
            files.push(match file {
                PlanFile::Inline(record) => record,
                PlanFile::Path(path) => read_file(root, &path)?,
            });
        }
        Ok(RunRequest {
            instruction: self.instruction,
            files,
            agent_kind: self.agent_kind,
            trim: self.trim,
        })
    }
}

/// Read `path` under `root` as a request file.
pub fn read_file(root: &Path, path: &str) -> Result<FileRecord> {
    let full = root.join(path);
    let content =
        fs::read_to_string(&full).with_context(|| format!("read {}", full.display()))?;
    Ok(FileRecord::new(path, content))
}
